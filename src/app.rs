use std::sync::Arc;

use glam::Vec2;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, Touch, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use crate::camera::PointerButtons;
use crate::clock::MonotonicClock;
use crate::config::{DIMX, DIMY, LOGGING_ENABLED, WINDOW_TITLE};
use crate::context::SceneContext;
use crate::error::{RenderError, SceneError};
use crate::frame::FrameLoop;
use crate::gltf_loader::GltfLoader;
use crate::gpu::WgpuRenderer;
use crate::manifest::SCENE_MANIFEST;
use crate::renderer::Renderer;
use crate::viewport::{DoubleClickDetector, ViewportState, toggle_fullscreen};

pub enum AppEvent {
    RendererReady(WgpuRenderer),
    RendererFailed(RenderError),
}

// ======================================
// === APPLICATION ===
// ======================================

pub struct SceneApp {
    context: SceneContext,
    frames: FrameLoop,
    loader: GltfLoader,
    window: Option<Arc<Window>>,
    renderer: Option<WgpuRenderer>,
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    proxy: EventLoopProxy<AppEvent>,
    double_click: DoubleClickDetector,
    cursor: Vec2,
    loads_issued: bool,
}

impl SceneApp {
    pub fn new(proxy: EventLoopProxy<AppEvent>) -> Result<Self, SceneError> {
        Ok(Self {
            context: SceneContext::new(ViewportState::default())?,
            frames: FrameLoop::new(Box::new(MonotonicClock::new())),
            loader: GltfLoader::from_env(),
            window: None,
            renderer: None,
            proxy,
            double_click: DoubleClickDetector::default(),
            cursor: Vec2::ZERO,
            loads_issued: false,
        })
    }

    fn install_renderer(&mut self, mut renderer: WgpuRenderer) {
        self.context.configure_renderer(&mut renderer);
        self.renderer = Some(renderer);
        self.request_next_frame();
    }

    fn resize_to_window(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        let scale_factor = window.scale_factor();
        let logical = window.inner_size().to_logical::<f64>(scale_factor);
        let (width, height) = (logical.width.round() as u32, logical.height.round() as u32);

        let renderer = self.renderer.as_mut().map(|r| r as &mut dyn Renderer);
        self.context.resize(renderer, width, height, scale_factor);
    }

    fn pointer_down(&mut self, button: PointerButtons) {
        self.context
            .camera
            .controller
            .pointer_down(button, self.cursor);

        if button == PointerButtons::PRIMARY && self.double_click.press(self.frames.now(), self.cursor) {
            self.toggle_fullscreen();
        }
    }

    fn pointer_moved(&mut self, position: Vec2) {
        self.cursor = position;
        let viewport = Vec2::new(
            self.context.viewport.width() as f32,
            self.context.viewport.height() as f32,
        );
        self.context
            .camera
            .controller
            .pointer_move(position, viewport);
    }

    fn touch(&mut self, touch: Touch) {
        let Some(window) = &self.window else {
            return;
        };
        let position = touch.location.to_logical::<f32>(window.scale_factor());
        let position = Vec2::new(position.x, position.y);

        match touch.phase {
            TouchPhase::Started => {
                self.pointer_moved(position);
                self.pointer_down(PointerButtons::PRIMARY);
            }
            TouchPhase::Moved => self.pointer_moved(position),
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.context.camera.controller.pointer_up(PointerButtons::PRIMARY);
            }
        }
    }

    fn toggle_fullscreen(&self) {
        let Some(window) = &self.window else {
            return;
        };

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let Some(host) = web_fullscreen_host(window) else {
                    log::warn!("No document or canvas to take fullscreen");
                    return;
                };
            } else {
                let host = crate::viewport::WindowFullscreenHost::new(window);
            }
        }

        match toggle_fullscreen(&host) {
            Ok(action) => log::info!("Fullscreen {:?}", action),
            Err(err) => log::warn!("Fullscreen toggle ignored: {}", err),
        }
    }

    fn update(&mut self) {
        let renderer = self.renderer.as_mut().map(|r| r as &mut dyn Renderer);
        let report = self.frames.tick(&mut self.context, renderer);
        if LOGGING_ENABLED && report.completions > 0 {
            log::debug!("Frame {} applied {} load(s)", report.frame, report.completions);
        }

        #[cfg(target_arch = "wasm32")]
        self.update_stats_display(&report);

        self.request_next_frame();
    }

    fn request_next_frame(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn start_renderer(&mut self, window: Arc<Window>) {
        let viewport = self.context.viewport;
        let (width, height, pixel_ratio) = (viewport.width(), viewport.height(), viewport.pixel_ratio());

        cfg_if::cfg_if! {
            if #[cfg(target_arch = "wasm32")] {
                let proxy = self.proxy.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    let event = match WgpuRenderer::new(window, width, height, pixel_ratio).await {
                        Ok(renderer) => AppEvent::RendererReady(renderer),
                        Err(err) => AppEvent::RendererFailed(err),
                    };
                    if proxy.send_event(event).is_err() {
                        log::warn!("Event loop closed before the renderer was ready");
                    }
                });
            } else {
                match pollster::block_on(WgpuRenderer::new(window, width, height, pixel_ratio)) {
                    Ok(renderer) => self.install_renderer(renderer),
                    Err(err) => log::error!("Renderer unavailable: {}", err),
                }
            }
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn initialize_stats_display(&self) {
        use wasm_bindgen::JsCast;

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let Some(container) = document
            .get_element_by_id("app")
            .or_else(|| document.body().map(Into::into))
        else {
            return;
        };
        let Ok(stats_div) = document.create_element("div") else {
            return;
        };
        stats_div.set_id("stats");

        if let Some(element) = stats_div.dyn_ref::<web_sys::HtmlElement>() {
            let style = element.style();
            for (property, value) in [
                ("position", "absolute"),
                ("top", "10px"),
                ("left", "10px"),
                ("z-index", "1000"),
                ("background", "rgba(0,0,0,0.8)"),
                ("color", "white"),
                ("padding", "10px"),
                ("font-family", "monospace"),
                ("font-size", "12px"),
                ("border-radius", "4px"),
            ] {
                let _ = style.set_property(property, value);
            }
        }

        let _ = container.append_child(&stats_div);
    }

    #[cfg(target_arch = "wasm32")]
    fn update_stats_display(&self, report: &crate::frame::FrameReport) {
        let Some(sample) = report.stats else {
            return;
        };
        if !crate::config::MINIMAL_LOGGING {
            return;
        }

        let html = format!(
            "<div>FPS: {:.1}</div><div>Frame: {:.2}ms</div><div>Players: {}</div><div>Nodes: {}</div>",
            sample.fps,
            sample.frame_ms,
            self.frames.players().len(),
            self.context.graph.len()
        );
        if let Some(stats) = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id("stats"))
        {
            stats.set_inner_html(&html);
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn web_fullscreen_host(window: &Window) -> Option<crate::viewport::WebFullscreenHost> {
    use winit::platform::web::WindowExtWebSys;

    let document = web_sys::window()?.document()?;
    let canvas = window.canvas()?;
    Some(crate::viewport::WebFullscreenHost::new(
        document,
        web_sys::Element::from(canvas),
    ))
}

#[cfg(target_arch = "wasm32")]
fn attach_canvas(window: &Window) {
    use winit::platform::web::WindowExtWebSys;

    let Some(canvas) = window.canvas() else {
        return;
    };
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let Some(container) = document
        .get_element_by_id("app")
        .or_else(|| document.body().map(Into::into))
    else {
        return;
    };

    let style = canvas.style();
    let _ = style.set_property("width", "100%");
    let _ = style.set_property("height", "100%");
    let _ = style.set_property("display", "block");

    if let Err(err) = container.append_child(&web_sys::Element::from(canvas)) {
        log::error!("Couldn't append canvas to document: {:?}", err);
    }
}

impl ApplicationHandler<AppEvent> for SceneApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(DIMX, DIMY));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Couldn't create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        #[cfg(target_arch = "wasm32")]
        {
            attach_canvas(&window);
            if crate::config::MINIMAL_LOGGING || LOGGING_ENABLED {
                self.initialize_stats_display();
            }
        }

        self.window = Some(window.clone());
        self.resize_to_window();

        if !self.loads_issued {
            self.loads_issued = true;
            let ids = self.context.issue_loads(&SCENE_MANIFEST, &self.loader);
            log::info!("Issued {} asset load(s)", ids.len());
        }

        self.start_renderer(window);
        self.request_next_frame();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::RendererReady(renderer) => {
                self.install_renderer(renderer);
                // The canvas may have been laid out while the device was pending.
                self.resize_to_window();
            }
            AppEvent::RendererFailed(err) => log::error!("Renderer unavailable: {}", err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match &self.window {
            Some(window) if window.id() == id => {}
            _ => return,
        }

        match event {
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.resize_to_window();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = match button {
                    MouseButton::Left => PointerButtons::PRIMARY,
                    MouseButton::Right => PointerButtons::SECONDARY,
                    MouseButton::Middle => PointerButtons::MIDDLE,
                    _ => return,
                };
                match state {
                    ElementState::Pressed => self.pointer_down(button),
                    ElementState::Released => self.context.camera.controller.pointer_up(button),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let scale_factor = self.window.as_ref().map_or(1.0, |w| w.scale_factor());
                let logical = position.to_logical::<f32>(scale_factor);
                self.pointer_moved(Vec2::new(logical.x, logical.y));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                // winit reports scroll-up as positive, the controller takes DOM sign.
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y,
                    MouseScrollDelta::PixelDelta(p) => -(p.y as f32),
                };
                self.context.camera.controller.wheel(delta_y);
            }
            WindowEvent::Touch(touch) => self.touch(touch),
            WindowEvent::CloseRequested => {
                log::info!("Close requested after {} frame(s)", self.frames.frame_count());
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.update(),
            _ => {}
        }
    }
}
