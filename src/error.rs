/// Why a viewer could not be mounted on an element.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("no <{}> surface inside element", crate::defaults::SURFACE_SELECTOR)]
    MissingSurface,

    #[error("element is not displayed")]
    NotDisplayed,

    #[error("scene construction failed: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Why auto-initialization gave up waiting for the external libraries.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("dependencies not ready after {timeout_ms} ms")]
    TimedOut { timeout_ms: u32 },

    #[error("dependencies failed to load")]
    Abandoned,
}
