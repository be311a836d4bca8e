//! Browser backend: the DOM through `web-sys`, `THREE` and `SPARK` through
//! `js_sys::Reflect`, and the `WebViewer` class exported to JavaScript.

use crate::backend::{
    FrameCallback, FrameRenderer, GraphicsFactory, ModelLoader, PerspectiveCamera, SceneGraph,
    SplatModel,
};
use crate::config::{Lens, Overrides};
use crate::defaults;
use crate::layout::{Dimensions, ElementBox};
use crate::lifecycle::SceneHandle;
use crate::page::{AttributeSource, ListenerId, Page, PageElement, ResizeListener};
use crate::readiness::DependencyGate;
use crate::viewer::SplatViewer;
use anyhow::Context;
use futures::future::LocalBoxFuture;
use js_sys::{Array, Function, Object, Reflect};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlCanvasElement, HtmlElement, Window};

fn js_error(value: JsValue) -> anyhow::Error {
    let message = value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{:?}", value));
    anyhow::anyhow!(message)
}

fn global(name: &str) -> anyhow::Result<JsValue> {
    let value = Reflect::get(&js_sys::global(), &name.into()).map_err(js_error)?;
    if value.is_undefined() || value.is_null() {
        anyhow::bail!("global '{}' is not loaded", name);
    }
    Ok(value)
}

fn get(target: &JsValue, key: &str) -> anyhow::Result<JsValue> {
    Reflect::get(target, &key.into()).map_err(js_error)
}

fn set(target: &JsValue, key: &str, value: &JsValue) -> anyhow::Result<()> {
    Reflect::set(target, &key.into(), value).map_err(js_error)?;
    Ok(())
}

fn construct(namespace: &JsValue, class: &str, args: &[JsValue]) -> anyhow::Result<JsValue> {
    let constructor: Function = get(namespace, class)?
        .dyn_into()
        .map_err(|_| anyhow::anyhow!("'{}' is not a constructor", class))?;
    Reflect::construct(&constructor, &args.iter().collect::<Array>()).map_err(js_error)
}

fn call(target: &JsValue, method: &str, args: &[JsValue]) -> anyhow::Result<JsValue> {
    let function: Function = get(target, method)?
        .dyn_into()
        .map_err(|_| anyhow::anyhow!("'{}' is not a function", method))?;
    Reflect::apply(&function, target, &args.iter().collect::<Array>()).map_err(js_error)
}

fn triple([x, y, z]: [f32; 3]) -> [JsValue; 3] {
    [x.into(), y.into(), z.into()]
}

fn dependencies_present() -> bool {
    global(defaults::THREE_GLOBAL).is_ok() && global(defaults::SPLAT_GLOBAL).is_ok()
}

// ============================================================================
// PAGE
// ============================================================================

fn viewport_width(window: &Window) -> f64 {
    window
        .inner_width()
        .ok()
        .and_then(|w| w.as_f64())
        .unwrap_or(0.0)
}

pub struct DomPage {
    window: Window,
    listeners: RefCell<HashMap<ListenerId, Closure<dyn FnMut()>>>,
    next_listener: Cell<u32>,
}

impl DomPage {
    pub fn new() -> anyhow::Result<Self> {
        let window = web_sys::window().context("No window object available")?;
        Ok(Self {
            window,
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(0),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl Page for DomPage {
    type Element = DomElement;

    fn viewport_width(&self) -> f64 {
        viewport_width(&self.window)
    }

    fn select_all(&self, selector: &str) -> Vec<DomElement> {
        let Some(document) = self.window.document() else {
            log::error!("No document to search for {}", selector);
            return Vec::new();
        };
        let nodes = match document.query_selector_all(selector) {
            Ok(nodes) => nodes,
            Err(e) => {
                log::error!("Invalid selector '{}': {}", selector, js_error(e));
                return Vec::new();
            }
        };
        (0..nodes.length())
            .filter_map(|i| nodes.get(i))
            .filter_map(|node| node.dyn_into::<HtmlElement>().ok())
            .map(|element| DomElement::new(element, self.window.clone()))
            .collect()
    }

    fn add_resize_listener(&self, mut listener: ResizeListener) -> anyhow::Result<ListenerId> {
        let window = self.window.clone();
        let closure = Closure::wrap(
            Box::new(move || listener(viewport_width(&window))) as Box<dyn FnMut()>
        );
        self.window
            .add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref())
            .map_err(js_error)?;

        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().insert(id, closure);
        Ok(id)
    }

    fn remove_resize_listener(&self, id: ListenerId) {
        let Some(closure) = self.listeners.borrow_mut().remove(&id) else {
            return;
        };
        if let Err(e) = self
            .window
            .remove_event_listener_with_callback("resize", closure.as_ref().unchecked_ref())
        {
            log::warn!("Failed to remove resize listener: {}", js_error(e));
        }
    }

    fn delay(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let window = self.window.clone();
        let timeout = i32::try_from(ms).unwrap_or(i32::MAX);
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            if let Err(e) =
                window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
            {
                log::error!("setTimeout failed: {}", js_error(e));
                let _ = resolve.call0(&JsValue::undefined());
            }
        });
        Box::pin(async move {
            let _ = JsFuture::from(promise).await;
        })
    }
}

#[derive(Clone)]
pub struct DomElement {
    element: HtmlElement,
    window: Window,
}

impl DomElement {
    pub fn new(element: HtmlElement, window: Window) -> Self {
        Self { element, window }
    }

    pub fn html(&self) -> &HtmlElement {
        &self.element
    }
}

impl PartialEq for DomElement {
    fn eq(&self, other: &Self) -> bool {
        self.element.is_same_node(Some(other.element.as_ref()))
    }
}

impl AttributeSource for DomElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }
}

impl PageElement for DomElement {
    type Surface = HtmlCanvasElement;

    fn surface(&self) -> Option<HtmlCanvasElement> {
        self.element
            .query_selector(defaults::SURFACE_SELECTOR)
            .ok()
            .flatten()
            .and_then(|e| e.dyn_into::<HtmlCanvasElement>().ok())
    }

    fn is_displayed(&self) -> bool {
        match self.window.get_computed_style(&self.element) {
            Ok(Some(style)) => {
                let display = style.get_property_value("display").unwrap_or_default();
                let visibility = style.get_property_value("visibility").unwrap_or_default();
                display != "none" && visibility != "hidden"
            }
            _ => {
                log::debug!("No computed style for {}, assuming displayed", self.describe());
                true
            }
        }
    }

    fn measure(&self) -> ElementBox {
        let rect = self.element.get_bounding_client_rect();
        ElementBox {
            rect_width: rect.width(),
            rect_height: rect.height(),
            client_width: f64::from(self.element.client_width()),
            client_height: f64::from(self.element.client_height()),
            offset_width: f64::from(self.element.offset_width()),
            offset_height: f64::from(self.element.offset_height()),
        }
    }

    fn set_inline_size(&self, dimensions: &Dimensions) {
        let style = self.element.style();
        for (property, value) in [("width", dimensions.width), ("height", dimensions.height)] {
            if let Err(e) = style.set_property(property, &format!("{}px", value)) {
                log::warn!("Failed to set {} on {}: {}", property, self.describe(), js_error(e));
            }
        }
    }

    fn describe(&self) -> String {
        let id = self.element.id();
        if id.is_empty() {
            self.element.tag_name().to_lowercase()
        } else {
            format!("#{}", id)
        }
    }
}

// ============================================================================
// THREE
// ============================================================================

pub struct ThreeScene(JsValue);
pub struct ThreeCamera(JsValue);

pub struct ThreeRenderer {
    renderer: JsValue,
    animation: Option<Closure<dyn FnMut()>>,
}

impl Drop for ThreeRenderer {
    fn drop(&mut self) {
        // the closure dies with us; JS must stop calling it first
        if self.animation.take().is_some() {
            let _ = call(&self.renderer, "setAnimationLoop", &[JsValue::NULL]);
        }
    }
}

impl SceneGraph<SparkModel> for ThreeScene {
    fn add_background_sphere(&mut self, radius: f32, color: u32) -> anyhow::Result<()> {
        let three = global(defaults::THREE_GLOBAL)?;
        let geometry = construct(
            &three,
            "SphereGeometry",
            &[radius.into(), JsValue::from(32), JsValue::from(32)],
        )?;

        let params = Object::new();
        set(&params, "color", &color.into())?;
        set(&params, "side", &get(&three, "BackSide")?)?;
        let material = construct(&three, "MeshBasicMaterial", &[params.into()])?;

        let mesh = construct(&three, "Mesh", &[geometry, material])?;
        call(&self.0, "add", &[mesh])?;
        Ok(())
    }

    fn add_model(&mut self, model: &SparkModel) -> anyhow::Result<()> {
        call(&self.0, "add", &[model.0.clone()])?;
        Ok(())
    }

    fn remove_model(&mut self, model: &SparkModel) -> anyhow::Result<()> {
        call(&self.0, "remove", &[model.0.clone()])?;
        Ok(())
    }
}

impl PerspectiveCamera for ThreeCamera {
    fn set_position(&mut self, position: [f32; 3]) -> anyhow::Result<()> {
        call(&get(&self.0, "position")?, "set", &triple(position))?;
        Ok(())
    }

    fn set_aspect(&mut self, aspect: f32) -> anyhow::Result<()> {
        set(&self.0, "aspect", &aspect.into())?;
        call(&self.0, "updateProjectionMatrix", &[])?;
        Ok(())
    }
}

impl FrameRenderer<ThreeScene, ThreeCamera> for ThreeRenderer {
    fn set_size(&mut self, width: f64, height: f64) -> anyhow::Result<()> {
        call(&self.renderer, "setSize", &[width.into(), height.into()])?;
        Ok(())
    }

    fn render(&mut self, scene: &ThreeScene, camera: &ThreeCamera) -> anyhow::Result<()> {
        call(&self.renderer, "render", &[scene.0.clone(), camera.0.clone()])?;
        Ok(())
    }

    fn set_animation_loop(&mut self, callback: Option<FrameCallback>) -> anyhow::Result<()> {
        match callback {
            Some(callback) => {
                let closure = Closure::wrap(callback);
                call(&self.renderer, "setAnimationLoop", &[closure.as_ref().clone()])?;
                self.animation = Some(closure);
            }
            None => {
                call(&self.renderer, "setAnimationLoop", &[JsValue::NULL])?;
                self.animation = None;
            }
        }
        Ok(())
    }
}

/// Builds `THREE` objects; the global is looked up per call so the factory can
/// exist before the library has loaded.
pub struct ThreeGraphics {
    window: Window,
}

impl ThreeGraphics {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl GraphicsFactory for ThreeGraphics {
    type Surface = HtmlCanvasElement;
    type Model = SparkModel;
    type Scene = ThreeScene;
    type Camera = ThreeCamera;
    type Renderer = ThreeRenderer;

    fn create_scene(&self) -> anyhow::Result<ThreeScene> {
        let three = global(defaults::THREE_GLOBAL)?;
        Ok(ThreeScene(construct(&three, "Scene", &[])?))
    }

    fn create_camera(&self, lens: &Lens, aspect: f32) -> anyhow::Result<ThreeCamera> {
        let three = global(defaults::THREE_GLOBAL)?;
        let camera = construct(
            &three,
            "PerspectiveCamera",
            &[
                lens.fov_deg.into(),
                aspect.into(),
                lens.near.into(),
                lens.far.into(),
            ],
        )?;
        Ok(ThreeCamera(camera))
    }

    fn create_renderer(
        &self,
        surface: &HtmlCanvasElement,
        dimensions: &Dimensions,
    ) -> anyhow::Result<ThreeRenderer> {
        let three = global(defaults::THREE_GLOBAL)?;
        let params = Object::new();
        set(&params, "canvas", surface.as_ref())?;
        set(&params, "antialias", &JsValue::TRUE)?;

        let renderer = construct(&three, "WebGLRenderer", &[params.into()])?;
        call(
            &renderer,
            "setPixelRatio",
            &[self.window.device_pixel_ratio().into()],
        )?;
        call(
            &renderer,
            "setSize",
            &[dimensions.width.into(), dimensions.height.into()],
        )?;
        Ok(ThreeRenderer {
            renderer,
            animation: None,
        })
    }
}

// ============================================================================
// SPARK
// ============================================================================

pub struct SparkModel(JsValue);

impl SplatModel for SparkModel {
    fn set_position(&mut self, position: [f32; 3]) -> anyhow::Result<()> {
        call(&get(&self.0, "position")?, "set", &triple(position))?;
        Ok(())
    }

    fn set_orientation(&mut self, [x, y, z, w]: [f32; 4]) -> anyhow::Result<()> {
        call(
            &get(&self.0, "quaternion")?,
            "set",
            &[x.into(), y.into(), z.into(), w.into()],
        )?;
        Ok(())
    }

    fn rotate_y(&mut self, radians: f32) -> anyhow::Result<()> {
        let rotation = get(&self.0, "rotation")?;
        let y = get(&rotation, "y")?.as_f64().unwrap_or(0.0);
        set(&rotation, "y", &(y + f64::from(radians)).into())
    }
}

pub struct SparkLoader;

impl ModelLoader for SparkLoader {
    type Model = SparkModel;

    fn load(&self, url: &str) -> anyhow::Result<SparkModel> {
        let spark = global(defaults::SPLAT_GLOBAL)?;
        let params = Object::new();
        set(&params, "url", &url.into())?;
        let mesh = construct(&spark, defaults::SPLAT_CONSTRUCTOR, &[params.into()])
            .with_context(|| format!("cannot create splat for '{}'", url))?;
        Ok(SparkModel(mesh))
    }
}

// ============================================================================
// JAVASCRIPT API
// ============================================================================

type DomViewer = SplatViewer<DomPage, ThreeGraphics, SparkLoader>;
type DomHandle = SceneHandle<DomPage, ThreeGraphics>;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize data: {}", e)))?;
    js_sys::JSON::parse(&json)
}

fn overrides_from_js(value: &JsValue) -> Option<Overrides> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    let json = js_sys::JSON::stringify(value).ok()?.as_string()?;
    match serde_json::from_str::<Overrides>(&json) {
        Ok(overrides) => Some(overrides),
        Err(e) => {
            log::warn!("Ignoring overrides {}: {}", json, e);
            None
        }
    }
}

/// A mounted viewer, as seen from JavaScript.
#[wasm_bindgen(js_name = SceneHandle)]
#[derive(Clone)]
pub struct WebSceneHandle {
    inner: Rc<DomHandle>,
}

#[wasm_bindgen(js_class = SceneHandle)]
impl WebSceneHandle {
    /// Returns `false` when already torn down.
    pub fn teardown(&self) -> bool {
        self.inner.teardown()
    }

    #[wasm_bindgen(getter, js_name = isActive)]
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_js(self.inner.config())
    }

    #[wasm_bindgen(getter)]
    pub fn element(&self) -> HtmlElement {
        self.inner.element().html().clone()
    }

    /// The `THREE.Scene`.
    #[wasm_bindgen(getter)]
    pub fn scene(&self) -> JsValue {
        self.inner.scene().0.clone()
    }

    /// The `THREE.PerspectiveCamera`.
    #[wasm_bindgen(getter)]
    pub fn camera(&self) -> JsValue {
        self.inner.camera().0.clone()
    }

    /// The `THREE.WebGLRenderer`.
    #[wasm_bindgen(getter)]
    pub fn renderer(&self) -> JsValue {
        self.inner.renderer().renderer.clone()
    }

    /// The `SPARK.SplatMesh`.
    #[wasm_bindgen(getter)]
    pub fn model(&self) -> JsValue {
        self.inner.model().0.clone()
    }
}

/// Set `element.splatViewer` on every handle's element and collect the handles.
fn attach_all(handles: Vec<Rc<DomHandle>>) -> Array {
    handles
        .into_iter()
        .map(|inner| {
            let handle = WebSceneHandle { inner };
            let element: &JsValue = handle.inner.element().html().as_ref();
            if let Err(e) = Reflect::set(
                element,
                &defaults::HANDLE_PROPERTY.into(),
                &JsValue::from(handle.clone()),
            ) {
                log::warn!("Failed to attach handle: {}", js_error(e));
            }
            JsValue::from(handle)
        })
        .collect()
}

#[wasm_bindgen]
pub struct WebViewer {
    viewer: Rc<DomViewer>,
    gate: Rc<DependencyGate>,
}

#[wasm_bindgen]
impl WebViewer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WebViewer, JsValue> {
        let page = DomPage::new().map_err(|e| JsValue::from_str(&e.to_string()))?;
        let graphics = ThreeGraphics::new(page.window().clone());
        Ok(Self {
            viewer: Rc::new(SplatViewer::new(page, graphics, SparkLoader)),
            gate: Rc::new(DependencyGate::new()),
        })
    }

    #[wasm_bindgen(js_name = initOne)]
    pub fn init_one(&self, element: HtmlElement, overrides: JsValue) -> Option<WebSceneHandle> {
        let element = DomElement::new(element, self.viewer.page().window().clone());
        self.viewer
            .init_one(&element, overrides_from_js(&overrides).as_ref())
            .map(|inner| WebSceneHandle { inner })
    }

    #[wasm_bindgen(js_name = initAll)]
    pub fn init_all(&self, selector: Option<String>) -> Array {
        attach_all(self.viewer.init_all(selector.as_deref()))
    }

    #[wasm_bindgen(js_name = defaultConfig)]
    pub fn default_config() -> Result<JsValue, JsValue> {
        to_js(&DomViewer::default_config())
    }

    /// Called by the page once `THREE` and `SPARK` are loaded.
    #[wasm_bindgen(js_name = dependenciesReady)]
    pub fn dependencies_ready(&self) {
        self.gate.signal();
    }

    /// Called by the page when a library script fails to load. Pending
    /// `autoInit` calls reject; a later `autoInit` that finds both libraries
    /// loaded starts over.
    #[wasm_bindgen(js_name = dependenciesFailed)]
    pub fn dependencies_failed(&self) {
        self.gate.abandon();
    }

    /// Resolves with the mounted handles once the libraries are available, or
    /// rejects after `timeoutMs` (default 10 s).
    #[wasm_bindgen(js_name = autoInit)]
    pub fn auto_init(&self, timeout_ms: Option<u32>) -> js_sys::Promise {
        if dependencies_present() {
            self.gate.reopen();
            self.gate.signal();
        }
        let viewer = self.viewer.clone();
        let gate = self.gate.clone();
        let timeout_ms = timeout_ms.unwrap_or(defaults::READINESS_TIMEOUT_MS);

        wasm_bindgen_futures::future_to_promise(async move {
            let handles = viewer
                .auto_init(&gate, timeout_ms)
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            Ok(attach_all(handles).into())
        })
    }
}
