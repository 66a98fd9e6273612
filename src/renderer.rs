use crate::camera::PerspectiveCamera;
use crate::color::Color;
use crate::error::RenderError;
use crate::scene::SceneGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowFilter {
    Basic,
    Pcf,
    PcfSoft,
}

/// Rasterizes the scene graph from a camera. Output size is in logical
/// pixels; the backing surface is `size * pixel_ratio`.
pub trait Renderer {
    fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64);
    fn set_clear_color(&mut self, color: Color);
    fn configure_shadows(&mut self, enabled: bool, filter: ShadowFilter);
    fn render(&mut self, scene: &SceneGraph, camera: &PerspectiveCamera) -> Result<(), RenderError>;
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum RenderCall {
        Resize { width: u32, height: u32, pixel_ratio: f64 },
        ClearColor(Color),
        Shadows(bool, ShadowFilter),
        Render { aspect: f32, meshes: usize, size: (u32, u32) },
    }

    #[derive(Debug, Default)]
    pub struct RecordingRenderer {
        pub calls: Vec<RenderCall>,
        pub size: (u32, u32),
        pub fail_renders: bool,
    }

    impl RecordingRenderer {
        pub fn renders(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, RenderCall::Render { .. }))
                .count()
        }
    }

    impl Renderer for RecordingRenderer {
        fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64) {
            self.size = (width, height);
            self.calls.push(RenderCall::Resize { width, height, pixel_ratio });
        }

        fn set_clear_color(&mut self, color: Color) {
            self.calls.push(RenderCall::ClearColor(color));
        }

        fn configure_shadows(&mut self, enabled: bool, filter: ShadowFilter) {
            self.calls.push(RenderCall::Shadows(enabled, filter));
        }

        fn render(&mut self, scene: &SceneGraph, camera: &PerspectiveCamera) -> Result<(), RenderError> {
            self.calls.push(RenderCall::Render {
                aspect: camera.aspect(),
                meshes: scene.meshes().len(),
                size: self.size,
            });
            if self.fail_renders {
                return Err(RenderError::SurfaceLost);
            }
            Ok(())
        }
    }
}
