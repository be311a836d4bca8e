use crate::backend::{GraphicsFactory, ModelLoader};
use crate::config::{Overrides, ViewerConfig};
use crate::defaults;
use crate::error::{InitError, ReadinessError};
use crate::lifecycle::{SceneHandle, mount};
use crate::page::{Page, PageElement};
use crate::readiness::DependencyGate;
use std::cell::RefCell;
use std::rc::Rc;

/// Entry point for embedding viewers into a page.
///
/// Owned by the application; holds the page and the graphics libraries every
/// viewer is built with, and keeps each active handle from
/// [`init_all`](Self::init_all) attached to its element.
pub struct SplatViewer<P: Page, G: GraphicsFactory, L> {
    page: Rc<P>,
    graphics: G,
    loader: L,
    attached: RefCell<Vec<Rc<SceneHandle<P, G>>>>,
}

impl<P, G, L> SplatViewer<P, G, L>
where
    P: Page,
    G: GraphicsFactory,
    L: ModelLoader<Model = G::Model>,
    P::Element: PageElement<Surface = G::Surface>,
{
    pub fn new(page: P, graphics: G, loader: L) -> Self {
        Self {
            page: Rc::new(page),
            graphics,
            loader,
            attached: RefCell::new(Vec::new()),
        }
    }

    pub fn page(&self) -> &Rc<P> {
        &self.page
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn default_config() -> ViewerConfig {
        ViewerConfig::default()
    }

    /// Mount a viewer on `element`; failures are logged and yield `None`.
    pub fn init_one(
        &self,
        element: &P::Element,
        overrides: Option<&Overrides>,
    ) -> Option<Rc<SceneHandle<P, G>>> {
        match mount(&self.page, &self.graphics, &self.loader, element, overrides) {
            Ok(handle) => Some(Rc::new(handle)),
            Err(e @ InitError::NotDisplayed) => {
                log::warn!("Skipping {}: {}", element.describe(), e);
                None
            }
            Err(e) => {
                log::error!("Failed to initialize {}: {}", element.describe(), e);
                None
            }
        }
    }

    /// Mount a viewer on every element matching `selector` (default
    /// `[data-splat-viewer]`), returning the ones that succeeded.
    pub fn init_all(&self, selector: Option<&str>) -> Vec<Rc<SceneHandle<P, G>>> {
        let selector = selector.unwrap_or(defaults::VIEWER_SELECTOR);
        let elements = self.page.select_all(selector);
        log::info!("Found {} element(s) matching {}", elements.len(), selector);

        let handles: Vec<_> = elements
            .iter()
            .filter_map(|element| self.init_one(element, None))
            .collect();
        for handle in &handles {
            self.attach(handle);
        }

        log::info!("Initialized {}/{} viewer(s)", handles.len(), elements.len());
        handles
    }

    fn attach(&self, handle: &Rc<SceneHandle<P, G>>) {
        let mut attached = self.attached.borrow_mut();
        attached.retain(|other| other.is_active() && other.element() != handle.element());
        attached.push(Rc::clone(handle));
    }

    /// The active handle [`init_all`](Self::init_all) attached to `element`.
    ///
    /// Torn-down handles are released here.
    pub fn handle_for(&self, element: &P::Element) -> Option<Rc<SceneHandle<P, G>>> {
        let mut attached = self.attached.borrow_mut();
        attached.retain(|handle| handle.is_active());
        attached
            .iter()
            .find(|handle| handle.element() == element)
            .cloned()
    }

    /// Wait until `gate` is signalled, at most `timeout_ms`, then initialize
    /// every marked element.
    pub async fn auto_init(
        &self,
        gate: &DependencyGate,
        timeout_ms: u32,
    ) -> Result<Vec<Rc<SceneHandle<P, G>>>, ReadinessError> {
        let timer = self.page.delay(timeout_ms);
        if let Err(e) = gate.wait(timer, timeout_ms).await {
            log::error!("Auto-initialization aborted: {}", e);
            return Err(e);
        }
        Ok(self.init_all(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_headless::{HeadlessElement, HeadlessGraphics, HeadlessLoader, HeadlessPage};
    use crate::layout::ElementBox;
    use crate::lifecycle::LifecycleState;

    type Viewer = SplatViewer<HeadlessPage, HeadlessGraphics, HeadlessLoader>;

    fn viewer() -> Viewer {
        SplatViewer::new(
            HeadlessPage::new(1280.0),
            HeadlessGraphics::new(),
            HeadlessLoader::new(),
        )
    }

    fn marked(id: &str) -> HeadlessElement {
        HeadlessElement::new("div")
            .with_attribute("data-splat-viewer", "")
            .with_attribute("id", id)
            .with_surface()
            .with_box(ElementBox::uniform(640.0, 480.0))
    }

    #[test]
    fn init_one_failures_are_none() {
        let viewer = viewer();
        let hidden = marked("hidden").hidden();
        let bare = HeadlessElement::new("div");

        assert!(viewer.init_one(&hidden, None).is_none());
        assert!(viewer.init_one(&bare, None).is_none());
        assert!(viewer.init_one(&marked("ok"), None).is_some());
    }

    #[test]
    fn init_all_skips_failures() {
        let viewer = viewer();
        let page = viewer.page();
        let a = page.add_element(marked("a"));
        let b = page.add_element(marked("b").hidden());
        let c = page.add_element(marked("c"));
        page.add_element(marked("d").hidden());
        page.add_element(HeadlessElement::new("div").with_surface());

        let handles = viewer.init_all(None);

        assert_eq!(handles.len(), 2);
        assert!(handles[0].element() == &a);
        assert!(handles[1].element() == &c);
        assert!(Rc::ptr_eq(&viewer.handle_for(&a).unwrap(), &handles[0]));
        assert!(viewer.handle_for(&b).is_none());
    }

    #[test]
    fn handles_tear_down_independently() {
        let viewer = viewer();
        viewer.page().add_element(marked("a"));
        viewer.page().add_element(marked("b"));
        let handles = viewer.init_all(None);
        assert_eq!(viewer.page().listener_count(), 2);

        assert!(handles[0].teardown());
        viewer.graphics().advance_frames(3);

        assert_eq!(handles[0].state(), LifecycleState::Destroyed);
        assert_eq!(handles[1].state(), LifecycleState::Active);
        assert_eq!(handles[0].renderer().renders(), 0);
        assert_eq!(handles[1].renderer().renders(), 3);
        assert_eq!(viewer.page().listener_count(), 1);
        assert_eq!(viewer.graphics().active_loops(), 1);
    }

    #[test]
    fn custom_selector() {
        let viewer = viewer();
        viewer
            .page()
            .add_element(marked("a").with_attribute("data-scene", "lobby"));
        viewer.page().add_element(marked("b"));

        let handles = viewer.init_all(Some("[data-scene=lobby]"));

        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].element().describe(), "div#a");
    }

    #[test]
    fn reinitializing_replaces_attachment() {
        let viewer = viewer();
        let a = viewer.page().add_element(marked("a"));

        let first = viewer.init_all(None);
        first[0].teardown();
        let second = viewer.init_all(None);

        assert!(Rc::ptr_eq(&viewer.handle_for(&a).unwrap(), &second[0]));
        second[0].teardown();
        assert!(viewer.handle_for(&a).is_none());
    }

    #[test]
    fn attached_viewers_outlive_the_returned_handles() {
        let viewer = viewer();
        let a = viewer.page().add_element(marked("a"));
        viewer.init_all(None);

        viewer.graphics().advance_frames(3);

        assert_eq!(viewer.graphics().active_loops(), 1);
        let handle = viewer.handle_for(&a).unwrap();
        assert!(handle.is_active());
        assert_eq!(handle.renderer().renders(), 3);

        assert!(handle.teardown());
        assert_eq!(viewer.page().listener_count(), 0);
        assert_eq!(viewer.graphics().active_loops(), 0);
        assert!(viewer.handle_for(&a).is_none());
    }

    #[test]
    fn default_config_is_exposed() {
        assert_eq!(Viewer::default_config(), ViewerConfig::default());
        assert_eq!(Viewer::default_config().breakpoint, defaults::BREAKPOINT);
    }

    #[test]
    fn auto_init_waits_for_signal() {
        let viewer = viewer();
        viewer.page().add_element(marked("a"));
        let gate = DependencyGate::new();
        gate.signal();

        let handles = pollster::block_on(viewer.auto_init(&gate, 1000)).unwrap();

        assert_eq!(handles.len(), 1);
        assert!(handles[0].is_active());
    }

    #[test]
    fn auto_init_times_out() {
        let viewer = viewer();
        viewer.page().add_element(marked("a"));
        let gate = DependencyGate::new();

        let result = pollster::block_on(viewer.auto_init(&gate, 50));

        assert_eq!(result.err(), Some(ReadinessError::TimedOut { timeout_ms: 50 }));
        assert_eq!(viewer.graphics().scenes_created(), 0);
    }

    #[test]
    fn auto_init_reports_abandoned_dependencies() {
        let viewer = viewer();
        let gate = DependencyGate::new();
        gate.abandon();

        let result = pollster::block_on(viewer.auto_init(&gate, 50));

        assert_eq!(result.err(), Some(ReadinessError::Abandoned));
    }
}
