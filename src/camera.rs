use std::f32::consts::{PI, TAU};

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3};

use crate::config::{
    CAMERA_FAR, CAMERA_FOV, CAMERA_NEAR, CAMERA_POSITION, CAMERA_TARGET, DIMX, DIMY,
    ORBIT_DAMPING_FACTOR, ORBIT_PAN_SPEED, ORBIT_ROTATE_SPEED, ORBIT_ZOOM_SPEED,
};

const POLE_EPSILON: f32 = 1e-6;
const MIN_RADIUS: f32 = 1e-3;
// Remaining motion below this is dropped so the camera settles exactly.
const REST_THRESHOLD: f32 = 1e-6;

// ====================
// === POINTER INPUT ===
// ====================

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PointerButtons: u8 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

// ======================================
// === PERSPECTIVE CAMERA ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    aspect: f32,
    projection: Mat4,
}

impl PerspectiveCamera {
    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov_y_degrees,
            near,
            far,
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            up: Vec3::Y,
            aspect: 1.0,
            projection: Mat4::IDENTITY,
        };
        camera.set_aspect(aspect);
        camera.update_projection();
        camera
    }

    pub fn scene_default() -> Self {
        let mut camera = Self::new(CAMERA_FOV, DIMX as f32 / DIMY as f32, CAMERA_NEAR, CAMERA_FAR);
        camera.position = CAMERA_POSITION;
        camera.target = CAMERA_TARGET;
        camera
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Ignores non-positive and non-finite ratios.
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
            self.update_projection();
        }
    }

    pub fn update_projection(&mut self) {
        self.projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view()
    }
}

// ======================================
// === CONTROLLERS ===
// ======================================

/// Interactive camera control, updated once per frame.
pub trait CameraController {
    /// Applies pending input to the camera. Returns whether the camera moved.
    fn update(&mut self, camera: &mut PerspectiveCamera) -> bool;

    fn pointer_down(&mut self, _button: PointerButtons, _position: Vec2) {}
    fn pointer_up(&mut self, _button: PointerButtons) {}
    fn pointer_move(&mut self, _position: Vec2, _viewport: Vec2) {}
    fn wheel(&mut self, _delta_y: f32) {}
}

/// Orbits around `camera.target`: primary drag rotates, secondary or middle
/// drag pans, the wheel dollies. Motion decays by the damping factor each
/// update.
#[derive(Debug, Clone)]
pub struct OrbitController {
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vec3,
    pending_pan: Vec2,
    buttons: PointerButtons,
    cursor: Option<Vec2>,
    viewport_height: f32,
}

impl OrbitController {
    pub fn new() -> Self {
        Self {
            damping_factor: ORBIT_DAMPING_FACTOR,
            rotate_speed: ORBIT_ROTATE_SPEED,
            zoom_speed: ORBIT_ZOOM_SPEED,
            pan_speed: ORBIT_PAN_SPEED,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            pending_pan: Vec2::ZERO,
            buttons: PointerButtons::empty(),
            cursor: None,
            viewport_height: DIMY as f32,
        }
    }

    fn zoom_scale(&self) -> f32 {
        0.95_f32.powf(self.zoom_speed)
    }

    fn resolve_pan(&mut self, camera: &PerspectiveCamera) {
        if self.pending_pan == Vec2::ZERO {
            return;
        }

        let offset = camera.position - camera.target;
        let half_fov = (camera.fov_y_degrees.to_radians() * 0.5).tan();
        let scale = 2.0 * offset.length() * half_fov / self.viewport_height.max(1.0);

        let view = camera.view().inverse();
        let right = view.x_axis.truncate();
        let up = view.y_axis.truncate();

        let pan = self.pending_pan * self.pan_speed * scale;
        self.pan_offset += -right * pan.x + up * pan.y;
        self.pending_pan = Vec2::ZERO;
    }

    fn is_at_rest(&self) -> bool {
        self.theta_delta.abs() < REST_THRESHOLD
            && self.phi_delta.abs() < REST_THRESHOLD
            && self.pan_offset.length_squared() < REST_THRESHOLD * REST_THRESHOLD
            && self.scale == 1.0
    }
}

impl Default for OrbitController {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraController for OrbitController {
    fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        self.resolve_pan(camera);
        if self.is_at_rest() {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vec3::ZERO;
            return false;
        }

        let offset = camera.position - camera.target;
        let mut radius = offset.length().max(MIN_RADIUS);
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        let damping = self.damping_factor;
        theta += self.theta_delta * damping;
        phi = (phi + self.phi_delta * damping).clamp(POLE_EPSILON, PI - POLE_EPSILON);
        radius = (radius * self.scale).max(MIN_RADIUS);

        camera.target += self.pan_offset * damping;
        camera.position = camera.target
            + Vec3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );

        self.theta_delta *= 1.0 - damping;
        self.phi_delta *= 1.0 - damping;
        self.pan_offset *= 1.0 - damping;
        self.scale = 1.0;
        true
    }

    fn pointer_down(&mut self, button: PointerButtons, position: Vec2) {
        self.buttons.insert(button);
        self.cursor = Some(position);
    }

    fn pointer_up(&mut self, button: PointerButtons) {
        self.buttons.remove(button);
        if self.buttons.is_empty() {
            self.cursor = None;
        }
    }

    fn pointer_move(&mut self, position: Vec2, viewport: Vec2) {
        if viewport.y > 0.0 {
            self.viewport_height = viewport.y;
        }

        let Some(previous) = self.cursor.replace(position) else {
            return;
        };
        if self.buttons.is_empty() {
            return;
        }
        let delta = position - previous;

        if self.buttons.contains(PointerButtons::PRIMARY) {
            let height = self.viewport_height.max(1.0);
            self.theta_delta -= TAU * delta.x / height * self.rotate_speed;
            self.phi_delta -= TAU * delta.y / height * self.rotate_speed;
        } else if self
            .buttons
            .intersects(PointerButtons::SECONDARY | PointerButtons::MIDDLE)
        {
            self.pending_pan += delta;
        }
    }

    fn wheel(&mut self, delta_y: f32) {
        if delta_y < 0.0 {
            self.scale *= self.zoom_scale();
        } else if delta_y > 0.0 {
            self.scale /= self.zoom_scale();
        }
    }
}

pub struct CameraRig {
    pub camera: PerspectiveCamera,
    pub controller: Box<dyn CameraController>,
}

impl CameraRig {
    pub fn new(camera: PerspectiveCamera, controller: Box<dyn CameraController>) -> Self {
        Self { camera, controller }
    }

    pub fn orbit(camera: PerspectiveCamera) -> Self {
        Self::new(camera, Box::new(OrbitController::new()))
    }

    pub fn update(&mut self) -> bool {
        self.controller.update(&mut self.camera)
    }
}
