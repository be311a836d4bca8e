use crate::config::ViewerConfig;

/// Sizes an element reports about itself, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElementBox {
    pub rect_width: f64,
    pub rect_height: f64,
    pub client_width: f64,
    pub client_height: f64,
    pub offset_width: f64,
    pub offset_height: f64,
}

impl ElementBox {
    /// A box whose every measurement agrees.
    pub fn uniform(width: f64, height: f64) -> Self {
        Self {
            rect_width: width,
            rect_height: height,
            client_width: width,
            client_height: height,
            offset_width: width,
            offset_height: height,
        }
    }
}

/// Resolved drawing size for a viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    /// Both measurements were zero; the size must be written back onto the element
    pub fallback: bool,
}

impl Dimensions {
    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            (self.width / self.height) as f32
        } else {
            1.0
        }
    }
}

fn first_nonzero(candidates: [f64; 3]) -> f64 {
    candidates
        .into_iter()
        .find(|v| *v > 0.0)
        .unwrap_or(0.0)
}

/// Desktop minimum height at or above the breakpoint, mobile below it.
pub fn min_height_for(viewport_width: f64, config: &ViewerConfig) -> f64 {
    if viewport_width >= f64::from(config.breakpoint) {
        f64::from(config.desktop_min_height)
    } else {
        f64::from(config.mobile_min_height)
    }
}

pub fn resolve_dimensions(
    measured: &ElementBox,
    viewport_width: f64,
    config: &ViewerConfig,
) -> Dimensions {
    let width = first_nonzero([
        measured.rect_width,
        measured.client_width,
        measured.offset_width,
    ]);
    let height = first_nonzero([
        measured.rect_height,
        measured.client_height,
        measured.offset_height,
    ]);
    let min_height = min_height_for(viewport_width, config);

    if width == 0.0 && height == 0.0 {
        return Dimensions {
            width: viewport_width,
            height: min_height,
            fallback: true,
        };
    }

    Dimensions {
        width: if width == 0.0 { viewport_width } else { width },
        height: if height == 0.0 { min_height } else { height },
        fallback: false,
    }
}
