use glam::Vec3;

// === CONSTANTS ===
pub const DIMX: u32 = 1080;
pub const DIMY: u32 = 720;
pub const WINDOW_TITLE: &str = "wscene";

// Device pixel ratios above this are clamped.
pub const MAX_PIXEL_RATIO: f64 = 2.0;

// PICK ONE LOGGING OPTION ONLY. DOUBLE FALSE SHOWS NOTHING.
pub const MINIMAL_LOGGING: bool = true; // Show only FPS
pub const LOGGING_ENABLED: bool = false; // Per-frame detail
pub const LOGGING_TIMESTEP: u64 = 240; // Frame Count Modulus for detailed frame logs.
pub const STATS_UPDATE_INTERVAL: f32 = 0.75; // Seconds between FPS reports

// Atmosphere
pub const CLEAR_COLOR: &str = "#262837";
pub const FOG_COLOR: &str = "#262837";
pub const FOG_NEAR: f32 = 1.0;
pub const FOG_FAR: f32 = 15.0;

// Camera
pub const CAMERA_FOV: f32 = 75.0;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 100.0;
pub const CAMERA_POSITION: Vec3 = Vec3::new(4.0, 2.0, 5.0);
pub const CAMERA_TARGET: Vec3 = Vec3::ZERO;

// Orbit controller
pub const ORBIT_DAMPING_FACTOR: f32 = 0.05;
pub const ORBIT_ROTATE_SPEED: f32 = 1.0;
pub const ORBIT_ZOOM_SPEED: f32 = 1.0;
pub const ORBIT_PAN_SPEED: f32 = 1.0;

// Fullscreen trigger
pub const DOUBLE_CLICK_INTERVAL: f64 = 0.3;
pub const DOUBLE_CLICK_SLOP: f32 = 6.0;

// Renderer
pub const MAX_POINT_LIGHTS: usize = 4;
pub const INITIAL_INSTANCE_CAPACITY: usize = 256;

// Native asset lookup. Web builds fetch relative to the page origin.
pub const ASSET_ROOT_ENV: &str = "WSCENE_ASSET_ROOT";
pub const DEFAULT_ASSET_ROOT: &str = "static";
