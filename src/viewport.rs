use glam::Vec2;
use winit::window::{Fullscreen, Window};

use crate::camera::PerspectiveCamera;
use crate::config::{DIMX, DIMY, DOUBLE_CLICK_INTERVAL, DOUBLE_CLICK_SLOP, MAX_PIXEL_RATIO};
use crate::error::ViewportError;
use crate::renderer::Renderer;

// ======================================
// === VIEWPORT ===
// ======================================

// Output surface size in logical pixels plus the capped device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    width: u32,
    height: u32,
    pixel_ratio: f64,
    aspect: f32,
}

impl ViewportState {
    pub fn new(width: u32, height: u32, device_pixel_ratio: f64) -> Self {
        let mut viewport = Self {
            width: DIMX,
            height: DIMY,
            pixel_ratio: 1.0,
            aspect: DIMX as f32 / DIMY as f32,
        };
        viewport.update(width, height, device_pixel_ratio);
        viewport
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    /// Width over height of the last non-empty size.
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn is_zero_sized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Backing buffer size in physical pixels.
    pub fn buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| (f64::from(v) * self.pixel_ratio).round() as u32;
        (scale(self.width), scale(self.height))
    }

    pub fn update(&mut self, width: u32, height: u32, device_pixel_ratio: f64) {
        self.width = width;
        self.height = height;
        self.pixel_ratio = clamp_pixel_ratio(device_pixel_ratio);
        if !self.is_zero_sized() {
            self.aspect = width as f32 / height as f32;
        }
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(DIMX, DIMY, 1.0)
    }
}

pub fn clamp_pixel_ratio(device_pixel_ratio: f64) -> f64 {
    if !device_pixel_ratio.is_finite() || device_pixel_ratio <= 0.0 {
        return 1.0;
    }
    device_pixel_ratio.min(MAX_PIXEL_RATIO)
}

/// Applies a host resize to the viewport, the camera projection and the
/// renderer output in one step. Repeating it with the same input changes
/// nothing further.
pub fn on_resize(
    viewport: &mut ViewportState,
    camera: &mut PerspectiveCamera,
    renderer: Option<&mut dyn Renderer>,
    width: u32,
    height: u32,
    device_pixel_ratio: f64,
) {
    viewport.update(width, height, device_pixel_ratio);
    camera.set_aspect(viewport.aspect());

    if viewport.is_zero_sized() {
        log::debug!("Viewport is {}x{}, renderer left as is", width, height);
        return;
    }

    if let Some(renderer) = renderer {
        renderer.resize(viewport.width(), viewport.height(), viewport.pixel_ratio());
    }
}

// ======================================
// === FULLSCREEN ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiNaming {
    Standard,
    Webkit,
}

impl ApiNaming {
    pub fn element_property(self) -> &'static str {
        match self {
            ApiNaming::Standard => "fullscreenElement",
            ApiNaming::Webkit => "webkitFullscreenElement",
        }
    }

    pub fn request_method(self) -> &'static str {
        match self {
            ApiNaming::Standard => "requestFullscreen",
            ApiNaming::Webkit => "webkitRequestFullscreen",
        }
    }

    pub fn exit_method(self) -> &'static str {
        match self {
            ApiNaming::Standard => "exitFullscreen",
            ApiNaming::Webkit => "webkitExitFullscreen",
        }
    }
}

pub const FULLSCREEN_PROBE_ORDER: [ApiNaming; 2] = [ApiNaming::Standard, ApiNaming::Webkit];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenAction {
    Entered,
    Exited,
}

/// Host side of fullscreen. State is read at every toggle, never cached.
pub trait FullscreenHost {
    /// `None` when the host has no accessor under this naming.
    fn fullscreen_active(&self, naming: ApiNaming) -> Option<bool>;
    fn request_fullscreen(&self, naming: ApiNaming) -> Result<(), String>;
    fn exit_fullscreen(&self, naming: ApiNaming) -> Result<(), String>;
}

/// Enters fullscreen if nothing is fullscreen, otherwise exits, using the
/// first naming in [`FULLSCREEN_PROBE_ORDER`] the host answers to.
pub fn toggle_fullscreen(host: &dyn FullscreenHost) -> Result<FullscreenAction, ViewportError> {
    for naming in FULLSCREEN_PROBE_ORDER {
        let Some(active) = host.fullscreen_active(naming) else {
            continue;
        };

        let (result, action) = if active {
            (host.exit_fullscreen(naming), FullscreenAction::Exited)
        } else {
            (host.request_fullscreen(naming), FullscreenAction::Entered)
        };
        return result
            .map(|()| action)
            .map_err(ViewportError::FullscreenRejected);
    }

    Err(ViewportError::FullscreenUnsupported)
}

/// Native window fullscreen. Only the standard naming is answered.
pub struct WindowFullscreenHost<'a> {
    window: &'a Window,
}

impl<'a> WindowFullscreenHost<'a> {
    pub fn new(window: &'a Window) -> Self {
        Self { window }
    }
}

impl FullscreenHost for WindowFullscreenHost<'_> {
    fn fullscreen_active(&self, naming: ApiNaming) -> Option<bool> {
        match naming {
            ApiNaming::Standard => Some(self.window.fullscreen().is_some()),
            ApiNaming::Webkit => None,
        }
    }

    fn request_fullscreen(&self, _naming: ApiNaming) -> Result<(), String> {
        self.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
        Ok(())
    }

    fn exit_fullscreen(&self, _naming: ApiNaming) -> Result<(), String> {
        self.window.set_fullscreen(None);
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::WebFullscreenHost;

#[cfg(target_arch = "wasm32")]
mod web {
    use js_sys::{Function, Reflect};
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::{Document, Element};

    use super::{ApiNaming, FullscreenHost};

    /// Probes the document and canvas through property lookups so prefixed
    /// accessors are found without typed bindings.
    pub struct WebFullscreenHost {
        document: Document,
        element: Element,
    }

    impl WebFullscreenHost {
        pub fn new(document: Document, element: Element) -> Self {
            Self { document, element }
        }

        fn call(target: &JsValue, method: &str) -> Result<(), String> {
            let function = Reflect::get(target, &JsValue::from_str(method))
                .map_err(|e| format!("{e:?}"))?
                .dyn_into::<Function>()
                .map_err(|_| format!("{method} is not callable"))?;
            function.call0(target).map(|_| ()).map_err(|e| format!("{e:?}"))
        }
    }

    impl FullscreenHost for WebFullscreenHost {
        fn fullscreen_active(&self, naming: ApiNaming) -> Option<bool> {
            let key = JsValue::from_str(naming.element_property());
            if !Reflect::has(&self.document, &key).unwrap_or(false) {
                return None;
            }
            let element = Reflect::get(&self.document, &key).ok()?;
            Some(!element.is_null() && !element.is_undefined())
        }

        fn request_fullscreen(&self, naming: ApiNaming) -> Result<(), String> {
            Self::call(&self.element, naming.request_method())
        }

        fn exit_fullscreen(&self, naming: ApiNaming) -> Result<(), String> {
            Self::call(&self.document, naming.exit_method())
        }
    }
}

// ======================================
// === DOUBLE CLICK ===
// ======================================

/// Pairs presses into double clicks. Works for mouse buttons and touch taps.
#[derive(Debug, Clone)]
pub struct DoubleClickDetector {
    interval: f64,
    slop: f32,
    last: Option<(f64, Vec2)>,
}

impl DoubleClickDetector {
    pub fn new(interval: f64, slop: f32) -> Self {
        Self {
            interval,
            slop,
            last: None,
        }
    }

    /// Records a press at `time` seconds. Returns true when it completes a
    /// double click; the pair is then consumed.
    pub fn press(&mut self, time: f64, position: Vec2) -> bool {
        if let Some((at, where_)) = self.last {
            let elapsed = time - at;
            if (0.0..=self.interval).contains(&elapsed) && where_.distance(position) <= self.slop {
                self.last = None;
                return true;
            }
        }
        self.last = Some((time, position));
        false
    }
}

impl Default for DoubleClickDetector {
    fn default() -> Self {
        Self::new(DOUBLE_CLICK_INTERVAL, DOUBLE_CLICK_SLOP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{RecordingRenderer, RenderCall};
    use approx::assert_relative_eq;
    use std::cell::{Cell, RefCell};

    #[test]
    fn pixel_ratio_is_capped() {
        assert_eq!(clamp_pixel_ratio(3.0), 2.0);
        assert_eq!(clamp_pixel_ratio(1.5), 1.5);
        assert_eq!(clamp_pixel_ratio(f64::NAN), 1.0);
        assert_eq!(clamp_pixel_ratio(-1.0), 1.0);
    }

    #[test]
    fn resize_updates_camera_and_renderer() {
        let mut viewport = ViewportState::default();
        let mut camera = PerspectiveCamera::scene_default();
        let mut renderer = RecordingRenderer::default();

        on_resize(&mut viewport, &mut camera, Some(&mut renderer), 800, 600, 3.0);

        assert_relative_eq!(camera.aspect(), 800.0 / 600.0);
        assert_eq!(viewport.buffer_size(), (1600, 1200));
        assert_eq!(
            renderer.calls,
            vec![RenderCall::Resize { width: 800, height: 600, pixel_ratio: 2.0 }]
        );
    }

    #[test]
    fn resize_is_idempotent() {
        let mut viewport = ViewportState::default();
        let mut camera = PerspectiveCamera::scene_default();
        let mut renderer = RecordingRenderer::default();

        on_resize(&mut viewport, &mut camera, Some(&mut renderer), 1280, 640, 1.25);
        let (v1, c1, s1) = (viewport, camera, renderer.size);
        on_resize(&mut viewport, &mut camera, Some(&mut renderer), 1280, 640, 1.25);

        assert_eq!(viewport, v1);
        assert_eq!(camera, c1);
        assert_eq!(renderer.size, s1);
    }

    #[test]
    fn zero_size_keeps_last_aspect_and_skips_renderer() {
        let mut viewport = ViewportState::default();
        let mut camera = PerspectiveCamera::scene_default();
        let mut renderer = RecordingRenderer::default();

        on_resize(&mut viewport, &mut camera, Some(&mut renderer), 800, 600, 1.0);
        on_resize(&mut viewport, &mut camera, Some(&mut renderer), 0, 600, 1.0);

        assert!(viewport.is_zero_sized());
        assert_relative_eq!(camera.aspect(), 800.0 / 600.0);
        assert_eq!(renderer.calls.len(), 1);
    }

    struct FakeHost {
        webkit_only: bool,
        active: Cell<bool>,
        log: RefCell<Vec<String>>,
    }

    impl FakeHost {
        fn new(webkit_only: bool) -> Self {
            Self {
                webkit_only,
                active: Cell::new(false),
                log: RefCell::new(Vec::new()),
            }
        }
    }

    impl FullscreenHost for FakeHost {
        fn fullscreen_active(&self, naming: ApiNaming) -> Option<bool> {
            match (naming, self.webkit_only) {
                (ApiNaming::Standard, true) => None,
                _ => Some(self.active.get()),
            }
        }

        fn request_fullscreen(&self, naming: ApiNaming) -> Result<(), String> {
            self.log.borrow_mut().push(naming.request_method().to_string());
            self.active.set(true);
            Ok(())
        }

        fn exit_fullscreen(&self, naming: ApiNaming) -> Result<(), String> {
            self.log.borrow_mut().push(naming.exit_method().to_string());
            self.active.set(false);
            Ok(())
        }
    }

    struct NoFullscreen;

    impl FullscreenHost for NoFullscreen {
        fn fullscreen_active(&self, _: ApiNaming) -> Option<bool> {
            None
        }
        fn request_fullscreen(&self, _: ApiNaming) -> Result<(), String> {
            Err("unreachable".into())
        }
        fn exit_fullscreen(&self, _: ApiNaming) -> Result<(), String> {
            Err("unreachable".into())
        }
    }

    #[test]
    fn toggle_enters_then_exits_with_standard_naming() {
        let host = FakeHost::new(false);
        assert_eq!(toggle_fullscreen(&host), Ok(FullscreenAction::Entered));
        assert_eq!(toggle_fullscreen(&host), Ok(FullscreenAction::Exited));
        assert_eq!(*host.log.borrow(), vec!["requestFullscreen", "exitFullscreen"]);
    }

    #[test]
    fn toggle_falls_back_to_webkit_naming() {
        let host = FakeHost::new(true);
        assert_eq!(toggle_fullscreen(&host), Ok(FullscreenAction::Entered));
        assert_eq!(*host.log.borrow(), vec!["webkitRequestFullscreen"]);
    }

    #[test]
    fn toggle_without_accessors_is_unsupported() {
        assert_eq!(
            toggle_fullscreen(&NoFullscreen),
            Err(ViewportError::FullscreenUnsupported)
        );
    }

    #[test]
    fn double_click_needs_two_close_presses() {
        let mut detector = DoubleClickDetector::default();
        assert!(!detector.press(1.0, Vec2::new(10.0, 10.0)));
        assert!(detector.press(1.2, Vec2::new(12.0, 11.0)));
        // Third press starts a new pair.
        assert!(!detector.press(1.3, Vec2::new(12.0, 11.0)));

        assert!(!detector.press(2.0, Vec2::ZERO));
        assert!(!detector.press(2.5, Vec2::ZERO));
        assert!(!detector.press(2.6, Vec2::new(50.0, 0.0)));
    }
}
