//! What the viewer needs from the page hosting it.

use crate::layout::{Dimensions, ElementBox};
use futures::future::LocalBoxFuture;

pub trait AttributeSource {
    fn attribute(&self, name: &str) -> Option<String>;
}

/// An element a viewer can be mounted on.
///
/// Clones refer to the same element, and equality is identity.
pub trait PageElement: AttributeSource + Clone + PartialEq + 'static {
    /// The drawing target the renderer is created for
    type Surface;

    fn surface(&self) -> Option<Self::Surface>;

    /// False when computed `display` is `none` or `visibility` is `hidden`
    fn is_displayed(&self) -> bool;

    fn measure(&self) -> ElementBox;

    fn set_inline_size(&self, dimensions: &Dimensions);

    /// Short human-readable name for log lines
    fn describe(&self) -> String;
}

/// Called with the new viewport width.
pub type ResizeListener = Box<dyn FnMut(f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u32);

pub trait Page: 'static {
    type Element: PageElement;

    fn viewport_width(&self) -> f64;

    fn select_all(&self, selector: &str) -> Vec<Self::Element>;

    fn add_resize_listener(&self, listener: ResizeListener) -> anyhow::Result<ListenerId>;

    fn remove_resize_listener(&self, id: ListenerId);

    /// Resolves after roughly `ms` milliseconds.
    fn delay(&self, ms: u32) -> LocalBoxFuture<'static, ()>;
}
