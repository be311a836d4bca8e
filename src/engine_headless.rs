//! In-memory page and graphics backend for native builds.
//!
//! Every call is recorded instead of drawn, which makes it the backend of the
//! test-suite and of the `headless` demo. Elements do no layout: an inline
//! size written onto an element is recorded but does not change what the
//! element measures.

use crate::backend::{
    FrameCallback, FrameRenderer, GraphicsFactory, ModelLoader, PerspectiveCamera, SceneGraph,
    SplatModel,
};
use crate::config::Lens;
use crate::layout::{Dimensions, ElementBox};
use crate::page::{AttributeSource, ListenerId, Page, PageElement, ResizeListener};
use cgmath::{Quaternion, Rad, Vector3};
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

// ============================================================================
// PAGE
// ============================================================================

struct ElementData {
    tag: String,
    attributes: RefCell<HashMap<String, String>>,
    has_surface: Cell<bool>,
    displayed: Cell<bool>,
    measured: Cell<ElementBox>,
    inline_size: Cell<Option<(f64, f64)>>,
}

/// A page element. Clones share state.
#[derive(Clone)]
pub struct HeadlessElement(Rc<ElementData>);

impl PartialEq for HeadlessElement {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl HeadlessElement {
    /// A displayed, zero-sized element without a surface.
    pub fn new(tag: &str) -> Self {
        Self(Rc::new(ElementData {
            tag: tag.to_string(),
            attributes: RefCell::new(HashMap::new()),
            has_surface: Cell::new(false),
            displayed: Cell::new(true),
            measured: Cell::new(ElementBox::default()),
            inline_size: Cell::new(None),
        }))
    }

    pub fn with_attribute(self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_surface(self) -> Self {
        self.0.has_surface.set(true);
        self
    }

    pub fn with_box(self, measured: ElementBox) -> Self {
        self.set_box(measured);
        self
    }

    pub fn hidden(self) -> Self {
        self.set_displayed(false);
        self
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_box(&self, measured: ElementBox) {
        self.0.measured.set(measured);
    }

    pub fn set_displayed(&self, displayed: bool) {
        self.0.displayed.set(displayed);
    }

    /// Last inline `(width, height)` written by a viewer
    pub fn inline_size(&self) -> Option<(f64, f64)> {
        self.0.inline_size.get()
    }

    /// Minimal selector support: `[attr]`, `[attr=value]`, `#id` or a tag name.
    fn matches(&self, selector: &str) -> bool {
        let attributes = self.0.attributes.borrow();
        if let Some(inner) = selector.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return match inner.split_once('=') {
                Some((name, value)) => {
                    let value = value.trim_matches(|c| c == '"' || c == '\'');
                    attributes.get(name).is_some_and(|v| v == value)
                }
                None => attributes.contains_key(inner),
            };
        }
        if let Some(id) = selector.strip_prefix('#') {
            return attributes.get("id").is_some_and(|v| v == id);
        }
        self.0.tag.eq_ignore_ascii_case(selector)
    }
}

impl AttributeSource for HeadlessElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }
}

/// Stand-in for a canvas; remembers which element it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSurface {
    pub owner: String,
}

impl PageElement for HeadlessElement {
    type Surface = HeadlessSurface;

    fn surface(&self) -> Option<HeadlessSurface> {
        self.0.has_surface.get().then(|| HeadlessSurface {
            owner: self.describe(),
        })
    }

    fn is_displayed(&self) -> bool {
        self.0.displayed.get()
    }

    fn measure(&self) -> ElementBox {
        self.0.measured.get()
    }

    fn set_inline_size(&self, dimensions: &Dimensions) {
        self.0
            .inline_size
            .set(Some((dimensions.width, dimensions.height)));
    }

    fn describe(&self) -> String {
        match self.attribute("id") {
            Some(id) => format!("{}#{}", self.0.tag, id),
            None => self.0.tag.clone(),
        }
    }
}

/// A page with a resizable viewport.
pub struct HeadlessPage {
    viewport_width: Cell<f64>,
    elements: RefCell<Vec<HeadlessElement>>,
    listeners: RefCell<Vec<(ListenerId, ResizeListener)>>,
    next_listener: Cell<u32>,
}

impl HeadlessPage {
    pub fn new(viewport_width: f64) -> Self {
        Self {
            viewport_width: Cell::new(viewport_width),
            elements: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }
    }

    pub fn add_element(&self, element: HeadlessElement) -> HeadlessElement {
        self.elements.borrow_mut().push(element.clone());
        element
    }

    /// Change the viewport width and fire every resize listener.
    pub fn resize_to(&self, viewport_width: f64) {
        self.viewport_width.set(viewport_width);
        for (_, listener) in self.listeners.borrow_mut().iter_mut() {
            listener(viewport_width);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl Page for HeadlessPage {
    type Element = HeadlessElement;

    fn viewport_width(&self) -> f64 {
        self.viewport_width.get()
    }

    fn select_all(&self, selector: &str) -> Vec<HeadlessElement> {
        self.elements
            .borrow()
            .iter()
            .filter(|e| e.matches(selector))
            .cloned()
            .collect()
    }

    fn add_resize_listener(&self, listener: ResizeListener) -> anyhow::Result<ListenerId> {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        Ok(id)
    }

    fn remove_resize_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
    }

    /// There is no clock; every delay has already elapsed.
    fn delay(&self, _ms: u32) -> LocalBoxFuture<'static, ()> {
        futures::future::ready(()).boxed_local()
    }
}

// ============================================================================
// GRAPHICS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SceneObject {
    Background { radius: f32, color: u32 },
    Splat { id: u32, url: String },
}

#[derive(Debug, Default)]
pub struct HeadlessScene {
    objects: Vec<SceneObject>,
}

impl HeadlessScene {
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn contains_model(&self, id: u32) -> bool {
        self.objects
            .iter()
            .any(|o| matches!(o, SceneObject::Splat { id: other, .. } if *other == id))
    }
}

impl SceneGraph<HeadlessModel> for HeadlessScene {
    fn add_background_sphere(&mut self, radius: f32, color: u32) -> anyhow::Result<()> {
        self.objects.push(SceneObject::Background { radius, color });
        Ok(())
    }

    fn add_model(&mut self, model: &HeadlessModel) -> anyhow::Result<()> {
        self.objects.push(SceneObject::Splat {
            id: model.id,
            url: model.url.clone(),
        });
        Ok(())
    }

    fn remove_model(&mut self, model: &HeadlessModel) -> anyhow::Result<()> {
        self.objects
            .retain(|o| !matches!(o, SceneObject::Splat { id, .. } if *id == model.id));
        Ok(())
    }
}

#[derive(Debug)]
pub struct HeadlessCamera {
    lens: Lens,
    aspect: f32,
    position: [f32; 3],
    projection_updates: u32,
}

impl HeadlessCamera {
    pub fn lens(&self) -> Lens {
        self.lens
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }

    /// Aspect changes since construction
    pub fn projection_updates(&self) -> u32 {
        self.projection_updates
    }
}

impl PerspectiveCamera for HeadlessCamera {
    fn set_position(&mut self, position: [f32; 3]) -> anyhow::Result<()> {
        self.position = position;
        Ok(())
    }

    fn set_aspect(&mut self, aspect: f32) -> anyhow::Result<()> {
        self.aspect = aspect;
        self.projection_updates += 1;
        Ok(())
    }
}

type FrameSlot = Rc<RefCell<Option<FrameCallback>>>;

pub struct HeadlessRenderer {
    surface: HeadlessSurface,
    size: (f64, f64),
    renders: u32,
    animation: FrameSlot,
}

impl HeadlessRenderer {
    pub fn surface(&self) -> &HeadlessSurface {
        &self.surface
    }

    pub fn size(&self) -> (f64, f64) {
        self.size
    }

    pub fn renders(&self) -> u32 {
        self.renders
    }

    pub fn has_animation_loop(&self) -> bool {
        self.animation.borrow().is_some()
    }
}

impl FrameRenderer<HeadlessScene, HeadlessCamera> for HeadlessRenderer {
    fn set_size(&mut self, width: f64, height: f64) -> anyhow::Result<()> {
        self.size = (width, height);
        Ok(())
    }

    fn render(&mut self, _scene: &HeadlessScene, _camera: &HeadlessCamera) -> anyhow::Result<()> {
        self.renders += 1;
        Ok(())
    }

    fn set_animation_loop(&mut self, callback: Option<FrameCallback>) -> anyhow::Result<()> {
        *self.animation.borrow_mut() = callback;
        Ok(())
    }
}

/// Creates recording scene objects and drives their frame loops by hand.
#[derive(Default)]
pub struct HeadlessGraphics {
    frame_slots: RefCell<Vec<Weak<RefCell<Option<FrameCallback>>>>>,
    scenes_created: Cell<u32>,
}

impl HeadlessGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scenes_created(&self) -> u32 {
        self.scenes_created.get()
    }

    /// Run every installed frame callback `count` times.
    pub fn advance_frames(&self, count: usize) {
        for _ in 0..count {
            let slots: Vec<FrameSlot> = self
                .frame_slots
                .borrow()
                .iter()
                .filter_map(Weak::upgrade)
                .collect();
            for slot in slots {
                // taken out so the callback may borrow its renderer
                let callback = slot.borrow_mut().take();
                if let Some(mut callback) = callback {
                    callback();
                    slot.borrow_mut().get_or_insert(callback);
                }
            }
        }
    }

    pub fn active_loops(&self) -> usize {
        self.frame_slots
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|slot| slot.borrow().is_some())
            .count()
    }
}

impl GraphicsFactory for HeadlessGraphics {
    type Surface = HeadlessSurface;
    type Model = HeadlessModel;
    type Scene = HeadlessScene;
    type Camera = HeadlessCamera;
    type Renderer = HeadlessRenderer;

    fn create_scene(&self) -> anyhow::Result<HeadlessScene> {
        self.scenes_created.set(self.scenes_created.get() + 1);
        Ok(HeadlessScene::default())
    }

    fn create_camera(&self, lens: &Lens, aspect: f32) -> anyhow::Result<HeadlessCamera> {
        Ok(HeadlessCamera {
            lens: *lens,
            aspect,
            position: [0.0; 3],
            projection_updates: 0,
        })
    }

    fn create_renderer(
        &self,
        surface: &HeadlessSurface,
        dimensions: &Dimensions,
    ) -> anyhow::Result<HeadlessRenderer> {
        let animation: FrameSlot = Rc::new(RefCell::new(None));
        self.frame_slots
            .borrow_mut()
            .push(Rc::downgrade(&animation));
        Ok(HeadlessRenderer {
            surface: surface.clone(),
            size: (dimensions.width, dimensions.height),
            renders: 0,
            animation,
        })
    }
}

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug)]
pub struct HeadlessModel {
    id: u32,
    url: String,
    position: Vector3<f32>,
    orientation: Quaternion<f32>,
    spin: Rad<f32>,
}

impl HeadlessModel {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn orientation(&self) -> Quaternion<f32> {
        self.orientation
    }

    /// Total y-rotation added by the frame loop
    pub fn spin(&self) -> Rad<f32> {
        self.spin
    }
}

impl SplatModel for HeadlessModel {
    fn set_position(&mut self, position: [f32; 3]) -> anyhow::Result<()> {
        self.position = position.into();
        Ok(())
    }

    fn set_orientation(&mut self, [x, y, z, w]: [f32; 4]) -> anyhow::Result<()> {
        self.orientation = Quaternion::new(w, x, y, z);
        Ok(())
    }

    fn rotate_y(&mut self, radians: f32) -> anyhow::Result<()> {
        self.spin += Rad(radians);
        Ok(())
    }
}

/// Hands out models immediately; URLs registered with
/// [`fail_on`](Self::fail_on) fail instead.
#[derive(Default)]
pub struct HeadlessLoader {
    loaded: RefCell<Vec<String>>,
    failing: RefCell<Vec<String>>,
    next_id: Cell<u32>,
}

impl HeadlessLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, url: &str) {
        self.failing.borrow_mut().push(url.to_string());
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.borrow().clone()
    }
}

impl ModelLoader for HeadlessLoader {
    type Model = HeadlessModel;

    fn load(&self, url: &str) -> anyhow::Result<HeadlessModel> {
        if self.failing.borrow().iter().any(|u| u == url) {
            anyhow::bail!("cannot load splat '{}'", url);
        }
        self.loaded.borrow_mut().push(url.to_string());

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Ok(HeadlessModel {
            id,
            url: url.to_string(),
            position: Vector3::new(0.0, 0.0, 0.0),
            orientation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            spin: Rad(0.0),
        })
    }
}
