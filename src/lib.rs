mod backend;
mod config;
mod defaults;
#[cfg(not(target_arch = "wasm32"))]
pub mod engine_headless;
#[cfg(target_arch = "wasm32")]
mod engine_web;
mod error;
mod layout;
mod lifecycle;
mod page;
pub mod parse;
mod readiness;
mod viewer;

pub use backend::{
    FrameCallback, FrameRenderer, GraphicsFactory, ModelLoader, PerspectiveCamera, SceneGraph,
    SplatModel,
};
pub use config::{Lens, Overrides, ViewerConfig, resolve_config};
pub use error::{InitError, ReadinessError};
pub use layout::{Dimensions, ElementBox, min_height_for, resolve_dimensions};
pub use lifecycle::{LifecycleState, SceneHandle, mount};
pub use page::{AttributeSource, ListenerId, Page, PageElement, ResizeListener};
pub use readiness::DependencyGate;
pub use viewer::SplatViewer;

pub use defaults::{READINESS_TIMEOUT_MS, VIEWER_SELECTOR};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Set up logging for the current platform.
pub fn init_logging() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
    #[cfg(target_arch = "wasm32")]
    {
        let _ = console_log::init_with_level(log::Level::Info);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    init_logging();

    Ok(())
}
