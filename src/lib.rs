use winit::event_loop::{ControlFlow, EventLoop};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod animation;
pub mod app;
pub mod camera;
pub mod clock;
pub mod color;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod gltf_loader;
pub mod gpu;
pub mod lights;
pub mod loader;
pub mod manifest;
pub mod mesh;
pub mod renderer;
pub mod scene;
pub mod viewport;

pub use animation::{AnimationClip, AnimationPlayer, AnimationRegistry, PlayerId};
pub use app::{AppEvent, SceneApp};
pub use camera::{CameraController, CameraRig, OrbitController, PerspectiveCamera};
pub use clock::{ClockSource, FrameClock, ManualClock, MonotonicClock};
pub use context::SceneContext;
pub use error::{ColorParseError, LoadError, RenderError, SceneError, ViewportError};
pub use frame::{FrameLoop, FrameReport, FrameState};
pub use loader::{AssetLoader, CompletionSender, LoadCompletion, LoadQueue, LoadRequest, LoadedAsset};
pub use renderer::{Renderer, ShadowFilter};
pub use scene::{NodeId, Placement, SceneGraph, Subtree, SubtreeHandle, Transform};
pub use viewport::{ViewportState, on_resize, toggle_fullscreen};

use config::{LOGGING_ENABLED, MINIMAL_LOGGING};

fn init_logging() {
    if !(MINIMAL_LOGGING || LOGGING_ENABLED) {
        return;
    }

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            let level = if LOGGING_ENABLED { log::Level::Debug } else { log::Level::Info };
            if let Err(err) = console_log::init_with_level(level) {
                web_sys::console::error_1(&format!("Couldn't initialize logger: {err}").into());
            }
        } else {
            let filter = if LOGGING_ENABLED { "debug" } else { "info" };
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
        }
    }
}

// ======================================
// === MAIN ENTRY POINT ===
// ======================================

#[cfg_attr(target_arch = "wasm32", wasm_bindgen(start))]
pub fn run() {
    init_logging();
    log::info!("Started wscene v{}", env!("CARGO_PKG_VERSION"));

    let event_loop = match EventLoop::<AppEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("Couldn't create event loop: {}", err);
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let app = match SceneApp::new(event_loop.create_proxy()) {
        Ok(app) => app,
        Err(err) => {
            log::error!("Couldn't build the scene: {}", err);
            return;
        }
    };

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            use winit::platform::web::EventLoopExtWebSys;
            event_loop.spawn_app(app);
        } else {
            let mut app = app;
            if let Err(err) = event_loop.run_app(&mut app) {
                log::error!("Event loop exited with error: {}", err);
            }
        }
    }
}
