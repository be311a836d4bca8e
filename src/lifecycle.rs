use crate::backend::{
    FrameCallback, FrameRenderer, GraphicsFactory, ModelLoader, PerspectiveCamera, SceneGraph,
    SplatModel,
};
use crate::config::{Overrides, ViewerConfig, resolve_config};
use crate::defaults;
use crate::error::InitError;
use crate::layout::{Dimensions, resolve_dimensions};
use crate::page::{ListenerId, Page, PageElement, ResizeListener};
use crate::parse::parse_hex_color;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use web_time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Destroyed,
}

struct SceneParts<G: GraphicsFactory> {
    scene: G::Scene,
    camera: G::Camera,
    renderer: G::Renderer,
    model: G::Model,
}

/// A mounted viewer: the external objects it created, the configuration they
/// were built from and the element they live in.
///
/// The frame loop and the resize listener share ownership of the scene objects,
/// so dropping the handle leaves the viewer running. Only
/// [`teardown`](Self::teardown) unhooks it from the page and releases them.
pub struct SceneHandle<P: Page, G: GraphicsFactory> {
    parts: Rc<RefCell<SceneParts<G>>>,
    config: ViewerConfig,
    element: P::Element,
    page: Rc<P>,
    resize_listener: Cell<Option<ListenerId>>,
    state: Cell<LifecycleState>,
}

/// Debug viewers log at info so their diagnostics show up in the console.
fn verbosity(config: &ViewerConfig) -> log::Level {
    if config.debug {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

/// Resolve the element's size, writing it back as inline style when the
/// element has none of its own.
fn fit_element<E: PageElement>(element: &E, viewport_width: f64, config: &ViewerConfig) -> Dimensions {
    let dimensions = resolve_dimensions(&element.measure(), viewport_width, config);
    if dimensions.fallback {
        element.set_inline_size(&dimensions);
    }
    dimensions
}

struct FrameStats {
    label: String,
    frames: u32,
    since: Instant,
}

impl FrameStats {
    fn new(label: String) -> Self {
        Self {
            label,
            frames: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        if self.frames < defaults::FRAME_STATS_INTERVAL {
            return;
        }
        let seconds = self.since.elapsed().as_secs_f64();
        if seconds > 0.0 {
            log::info!("{}: {:.1} fps", self.label, f64::from(self.frames) / seconds);
        }
        self.frames = 0;
        self.since = Instant::now();
    }
}

fn frame_callback<G: GraphicsFactory>(
    parts: Rc<RefCell<SceneParts<G>>>,
    config: &ViewerConfig,
    label: String,
) -> FrameCallback {
    let spin = config.auto_rotate.then_some(config.rotation_speed);
    let mut stats = config.debug.then(|| FrameStats::new(label));

    Box::new(move || {
        let mut parts = parts.borrow_mut();
        let SceneParts {
            scene,
            camera,
            renderer,
            model,
        } = &mut *parts;

        let spun = match spin {
            Some(radians) => model.rotate_y(radians),
            None => Ok(()),
        };
        if let Err(e) = spun.and_then(|()| renderer.render(scene, camera)) {
            log::error!("Frame failed: {:#}", e);
        }
        if let Some(stats) = stats.as_mut() {
            stats.tick();
        }
    })
}

fn resize_listener<G: GraphicsFactory, E: PageElement>(
    parts: Rc<RefCell<SceneParts<G>>>,
    element: E,
    config: ViewerConfig,
) -> ResizeListener {
    Box::new(move |viewport_width| {
        let dimensions = fit_element(&element, viewport_width, &config);
        let mut parts = parts.borrow_mut();
        let parts = &mut *parts;

        let resized = parts
            .camera
            .set_aspect(dimensions.aspect())
            .and_then(|()| parts.renderer.set_size(dimensions.width, dimensions.height));
        match resized {
            Ok(()) => log::log!(
                verbosity(&config),
                "Resized {} to {}x{}",
                element.describe(),
                dimensions.width,
                dimensions.height
            ),
            Err(e) => log::error!("Failed to resize {}: {:#}", element.describe(), e),
        }
    })
}

/// Build a viewer inside `element`.
///
/// Objects created before a failure are not disposed.
pub fn mount<P, G, L>(
    page: &Rc<P>,
    graphics: &G,
    loader: &L,
    element: &P::Element,
    overrides: Option<&Overrides>,
) -> Result<SceneHandle<P, G>, InitError>
where
    P: Page,
    G: GraphicsFactory,
    L: ModelLoader<Model = G::Model>,
    P::Element: PageElement<Surface = G::Surface>,
{
    let config = resolve_config(element, overrides);
    let level = verbosity(&config);
    let label = element.describe();
    log::log!(level, "Mounting viewer on {}: {:?}", label, config);

    let surface = element.surface().ok_or(InitError::MissingSurface)?;
    if !element.is_displayed() {
        return Err(InitError::NotDisplayed);
    }

    let dimensions = fit_element(element, page.viewport_width(), &config);
    log::log!(level, "{} sized {:?}", label, dimensions);

    let mut scene = graphics.create_scene()?;
    let mut camera = graphics.create_camera(&config.lens(), dimensions.aspect())?;
    camera.set_position(config.camera_position)?;
    let renderer = graphics.create_renderer(&surface, &dimensions)?;
    scene.add_background_sphere(
        defaults::BACKGROUND_SPHERE_RADIUS,
        parse_hex_color(&config.background_color),
    )?;

    let mut model = loader.load(&config.model_url)?;
    model.set_position(config.model_position())?;
    model.set_orientation(config.model_orientation())?;
    scene.add_model(&model)?;

    let parts: Rc<RefCell<SceneParts<G>>> = Rc::new(RefCell::new(SceneParts {
        scene,
        camera,
        renderer,
        model,
    }));

    let listener = if config.responsive {
        let listener = resize_listener(parts.clone(), element.clone(), config.clone());
        Some(page.add_resize_listener(listener)?)
    } else {
        None
    };

    let callback = frame_callback(parts.clone(), &config, label.clone());
    parts.borrow_mut().renderer.set_animation_loop(Some(callback))?;

    log::log!(level, "Viewer on {} active, model {}", label, config.model_url);

    Ok(SceneHandle {
        parts,
        config,
        element: element.clone(),
        page: page.clone(),
        resize_listener: Cell::new(listener),
        state: Cell::new(LifecycleState::Active),
    })
}

impl<P: Page, G: GraphicsFactory> SceneHandle<P, G> {
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn element(&self) -> &P::Element {
        &self.element
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    pub fn has_resize_listener(&self) -> bool {
        self.resize_listener.get().is_some()
    }

    pub fn scene(&self) -> Ref<'_, G::Scene> {
        Ref::map(self.parts.borrow(), |p| &p.scene)
    }

    pub fn camera(&self) -> Ref<'_, G::Camera> {
        Ref::map(self.parts.borrow(), |p| &p.camera)
    }

    pub fn renderer(&self) -> Ref<'_, G::Renderer> {
        Ref::map(self.parts.borrow(), |p| &p.renderer)
    }

    pub fn model(&self) -> Ref<'_, G::Model> {
        Ref::map(self.parts.borrow(), |p| &p.model)
    }

    /// Remove the resize listener, stop the frame loop and take the model out
    /// of the scene. Both callbacks are dropped here, so the scene objects go
    /// away with the last handle.
    ///
    /// Returns `false` if the handle was already torn down.
    pub fn teardown(&self) -> bool {
        let label = self.element.describe();
        if self.state.replace(LifecycleState::Destroyed) == LifecycleState::Destroyed {
            log::debug!("Viewer on {} already torn down", label);
            return false;
        }

        if let Some(id) = self.resize_listener.take() {
            self.page.remove_resize_listener(id);
        }

        let mut parts = self.parts.borrow_mut();
        let SceneParts {
            scene,
            renderer,
            model,
            ..
        } = &mut *parts;
        if let Err(e) = renderer.set_animation_loop(None) {
            log::warn!("Failed to stop frame loop on {}: {:#}", label, e);
        }
        if let Err(e) = scene.remove_model(model) {
            log::warn!("Failed to detach model on {}: {:#}", label, e);
        }

        log::log!(verbosity(&self.config), "Viewer on {} torn down", label);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_headless::{
        HeadlessElement, HeadlessGraphics, HeadlessLoader, HeadlessPage, SceneObject,
    };
    use crate::layout::ElementBox;
    use cgmath::Rad;
    use serde_json::json;

    struct Fixture {
        page: Rc<HeadlessPage>,
        graphics: HeadlessGraphics,
        loader: HeadlessLoader,
    }

    impl Fixture {
        fn new(viewport_width: f64) -> Self {
            Self {
                page: Rc::new(HeadlessPage::new(viewport_width)),
                graphics: HeadlessGraphics::new(),
                loader: HeadlessLoader::new(),
            }
        }

        fn mount(
            &self,
            element: &HeadlessElement,
            overrides: Option<&Overrides>,
        ) -> Result<SceneHandle<HeadlessPage, HeadlessGraphics>, InitError> {
            mount(&self.page, &self.graphics, &self.loader, element, overrides)
        }
    }

    fn viewer_element() -> HeadlessElement {
        HeadlessElement::new("div")
            .with_surface()
            .with_box(ElementBox::uniform(800.0, 400.0))
    }

    #[test]
    fn builds_scene_from_config() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element()
            .with_attribute("data-model-url", "scans/lobby.splat")
            .with_attribute("data-position", "1,2,3")
            .with_attribute("data-orientation", "0,0.7071,0,0.7071")
            .with_attribute("data-background-color", "#abc")
            .with_attribute("data-camera-position", "0,1,8");

        let handle = fixture.mount(&element, None).unwrap();

        assert!(handle.is_active());
        assert_eq!(handle.renderer().size(), (800.0, 400.0));
        assert_eq!(handle.camera().aspect(), 2.0);
        assert_eq!(handle.camera().position(), [0.0, 1.0, 8.0]);
        assert_eq!(handle.model().url(), "scans/lobby.splat");
        assert_eq!(handle.model().position(), cgmath::Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(
            handle.model().orientation(),
            cgmath::Quaternion::new(0.7071, 0.0, 0.7071, 0.0)
        );
        assert_eq!(
            handle.scene().objects()[0],
            SceneObject::Background {
                radius: defaults::BACKGROUND_SPHERE_RADIUS,
                color: 0xaabbcc
            }
        );
        assert!(handle.scene().contains_model(handle.model().id()));
        assert_eq!(fixture.loader.loaded(), vec!["scans/lobby.splat".to_string()]);
    }

    #[test]
    fn missing_surface_fails() {
        let fixture = Fixture::new(1280.0);
        let element = HeadlessElement::new("div").with_box(ElementBox::uniform(800.0, 400.0));
        assert!(matches!(fixture.mount(&element, None), Err(InitError::MissingSurface)));
        assert_eq!(fixture.graphics.scenes_created(), 0);
    }

    #[test]
    fn hidden_element_fails() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element().hidden();
        assert!(matches!(fixture.mount(&element, None), Err(InitError::NotDisplayed)));
        assert_eq!(fixture.page.listener_count(), 0);
    }

    #[test]
    fn backend_failure_is_reported_without_rollback() {
        let fixture = Fixture::new(1280.0);
        fixture.loader.fail_on("broken.splat");
        let element = viewer_element().with_attribute("data-model-url", "broken.splat");

        let err = fixture.mount(&element, None).err().unwrap();
        assert!(matches!(err, InitError::Backend(_)));
        assert!(err.to_string().contains("broken.splat"));
        assert_eq!(fixture.graphics.scenes_created(), 1);
    }

    #[test]
    fn empty_element_gets_viewport_size_written_back() {
        let fixture = Fixture::new(1024.0);
        let element = HeadlessElement::new("div").with_surface();

        let handle = fixture.mount(&element, None).unwrap();

        assert_eq!(handle.renderer().size(), (1024.0, 500.0));
        assert_eq!(element.inline_size(), Some((1024.0, 500.0)));
    }

    #[test]
    fn mobile_viewport_uses_mobile_height() {
        let fixture = Fixture::new(375.0);
        let element = HeadlessElement::new("div")
            .with_surface()
            .with_attribute("data-mobile-min-height", "280");

        let handle = fixture.mount(&element, None).unwrap();

        assert_eq!(handle.renderer().size(), (375.0, 280.0));
        assert_eq!(element.inline_size(), Some((375.0, 280.0)));
    }

    #[test]
    fn frames_spin_and_render() {
        let fixture = Fixture::new(1280.0);
        let overrides = json!({ "rotationSpeed": 0.5 }).as_object().cloned().unwrap();
        let handle = fixture.mount(&viewer_element(), Some(&overrides)).unwrap();

        fixture.graphics.advance_frames(4);

        assert_eq!(handle.renderer().renders(), 4);
        assert_eq!(handle.model().spin(), Rad(2.0));
    }

    #[test]
    fn auto_rotate_off_still_renders() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element().with_attribute("data-auto-rotate", "false");
        let handle = fixture.mount(&element, None).unwrap();

        fixture.graphics.advance_frames(3);

        assert_eq!(handle.renderer().renders(), 3);
        assert_eq!(handle.model().spin(), Rad(0.0));
    }

    #[test]
    fn resize_updates_camera_and_renderer() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element();
        let handle = fixture.mount(&element, None).unwrap();
        assert!(handle.has_resize_listener());

        element.set_box(ElementBox::uniform(600.0, 600.0));
        fixture.page.resize_to(1000.0);

        assert_eq!(handle.renderer().size(), (600.0, 600.0));
        assert_eq!(handle.camera().aspect(), 1.0);
        assert_eq!(handle.camera().projection_updates(), 1);
    }

    #[test]
    fn resize_reapplies_fallback() {
        let fixture = Fixture::new(1280.0);
        let element = HeadlessElement::new("div").with_surface();
        let handle = fixture.mount(&element, None).unwrap();

        fixture.page.resize_to(600.0);

        assert_eq!(handle.renderer().size(), (600.0, 300.0));
        assert_eq!(element.inline_size(), Some((600.0, 300.0)));
    }

    #[test]
    fn not_responsive_skips_listener() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element().with_attribute("data-responsive", "false");
        let handle = fixture.mount(&element, None).unwrap();

        assert!(!handle.has_resize_listener());
        assert_eq!(fixture.page.listener_count(), 0);
    }

    #[test]
    fn teardown_unhooks_everything() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element();
        let handle = fixture.mount(&element, None).unwrap();
        fixture.graphics.advance_frames(2);

        assert!(handle.teardown());

        assert_eq!(handle.state(), LifecycleState::Destroyed);
        assert_eq!(fixture.page.listener_count(), 0);
        assert!(!handle.renderer().has_animation_loop());
        assert!(!handle.scene().contains_model(handle.model().id()));

        element.set_box(ElementBox::uniform(300.0, 300.0));
        fixture.page.resize_to(900.0);
        fixture.graphics.advance_frames(5);

        assert_eq!(handle.renderer().size(), (800.0, 400.0));
        assert_eq!(handle.renderer().renders(), 2);
    }

    #[test]
    fn dropped_handle_keeps_running_until_teardown() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element();
        let handle = Rc::new(fixture.mount(&element, None).unwrap());
        let kept = Rc::clone(&handle);
        drop(handle);

        fixture.graphics.advance_frames(3);
        assert_eq!(fixture.graphics.active_loops(), 1);
        assert_eq!(fixture.page.listener_count(), 1);
        assert_eq!(kept.renderer().renders(), 3);

        assert!(kept.teardown());
        let parts = Rc::downgrade(&kept.parts);
        drop(kept);
        assert!(parts.upgrade().is_none());
        assert_eq!(fixture.graphics.active_loops(), 0);
    }

    #[test]
    fn mount_without_keeping_the_handle() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element();
        drop(fixture.mount(&element, None).unwrap());

        fixture.graphics.advance_frames(2);
        assert_eq!(fixture.graphics.active_loops(), 1);

        element.set_box(ElementBox::uniform(500.0, 500.0));
        fixture.page.resize_to(900.0);
        assert_eq!(fixture.page.listener_count(), 1);
    }

    #[test]
    fn second_teardown_is_a_no_op() {
        let fixture = Fixture::new(1280.0);
        let handle = fixture.mount(&viewer_element(), None).unwrap();

        assert!(handle.teardown());
        assert!(!handle.teardown());
        assert_eq!(handle.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn debug_viewer_counts_frames() {
        let fixture = Fixture::new(1280.0);
        let element = viewer_element().with_attribute("data-debug", "true");
        let handle = fixture.mount(&element, None).unwrap();

        fixture.graphics.advance_frames(defaults::FRAME_STATS_INTERVAL as usize + 1);

        assert!(handle.config().debug);
        assert_eq!(
            handle.renderer().renders(),
            defaults::FRAME_STATS_INTERVAL + 1
        );
    }
}
