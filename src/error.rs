use thiserror::Error;

use crate::scene::NodeId;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown scene node {0:?}")]
    UnknownNode(NodeId),

    #[error("unknown subtree node index {0}")]
    UnknownLocalNode(usize),

    #[error(transparent)]
    Color(#[from] ColorParseError),
}

/// A load that did not produce a subtree. Recovered locally: the asset is
/// simply absent from the scene.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("glTF decode failed: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("document has no scene")]
    EmptyDocument,

    #[error("buffer {0} is missing or shorter than declared")]
    MissingBuffer(usize),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("malformed color literal {0:?}, expected #rgb or #rrggbb")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewportError {
    #[error("host offers no fullscreen accessor")]
    FullscreenUnsupported,

    #[error("host rejected fullscreen request: {0}")]
    FullscreenRejected(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable adapter: {0}")]
    RequestAdapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("surface lost, reconfigured for next frame")]
    SurfaceLost,

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}
