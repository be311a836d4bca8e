/// Centralized default values for viewer configuration, page markup and external globals
/// This prevents string duplication and ensures consistency across the codebase

/// Default splat asset loaded when nothing else is configured
pub const MODEL_URL: &str = "assets/model.splat";

/// Default model position, `x,y,z`
pub const MODEL_POSITION: &str = "0,0,0";

/// Default model orientation as a quaternion, `x,y,z,w`
pub const MODEL_ORIENTATION: &str = "0,0,0,1";

pub const CAMERA_POSITION: [f32; 3] = [0.0, 0.0, 5.0];
pub const CAMERA_FOV_DEG: f32 = 75.0;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 1000.0;

/// Radians added to the model's y-rotation every frame
pub const ROTATION_SPEED: f32 = 0.005;

pub const BACKGROUND_COLOR: &str = "#000000";

/// Returned by the hex color parser for anything it cannot read
pub const FALLBACK_COLOR: u32 = 0xffffff;

/// Radius of the inward-facing sphere drawn behind the model
pub const BACKGROUND_SPHERE_RADIUS: f32 = 500.0;

/// Viewport width (px) at and above which the desktop minimum height applies
pub const BREAKPOINT: u32 = 768;
pub const DESKTOP_MIN_HEIGHT: u32 = 500;
pub const MOBILE_MIN_HEIGHT: u32 = 300;

/// Marker attribute selected by bulk initialization
pub const VIEWER_SELECTOR: &str = "[data-splat-viewer]";

/// Child element the renderer draws into
pub const SURFACE_SELECTOR: &str = "canvas";

/// Attribute holding a JSON object of configuration keys
pub const CONFIG_ATTRIBUTE: &str = "data-splat-config";

/// Property set on an initialized DOM element pointing back at its handle
pub const HANDLE_PROPERTY: &str = "splatViewer";

/// Globals that must exist before the web engine can build scenes
pub const THREE_GLOBAL: &str = "THREE";
pub const SPLAT_GLOBAL: &str = "SPARK";
pub const SPLAT_CONSTRUCTOR: &str = "SplatMesh";

/// How long auto-initialization waits for the external libraries
pub const READINESS_TIMEOUT_MS: u32 = 10_000;

/// Frames between two frame-rate log lines on debug viewers
pub const FRAME_STATS_INTERVAL: u32 = 300;
