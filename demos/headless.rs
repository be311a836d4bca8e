//! Mounts viewers on an in-memory page and walks them through their lifecycle.
//!
//! Run with `RUST_LOG=debug` to see every step.

use serde_json::json;
use splat_embed::engine_headless::{HeadlessElement, HeadlessGraphics, HeadlessLoader, HeadlessPage};
use splat_embed::{DependencyGate, ElementBox, READINESS_TIMEOUT_MS, SplatViewer};

fn main() -> anyhow::Result<()> {
    splat_embed::init_logging();

    let viewer = SplatViewer::new(
        HeadlessPage::new(1440.0),
        HeadlessGraphics::new(),
        HeadlessLoader::new(),
    );

    let page = viewer.page();
    page.add_element(
        HeadlessElement::new("div")
            .with_attribute("id", "hero")
            .with_attribute("data-splat-viewer", "")
            .with_attribute("data-model-url", "scans/garden.splat")
            .with_attribute("data-background-color", "#101820")
            .with_attribute("data-debug", "true")
            .with_surface()
            .with_box(ElementBox::uniform(1200.0, 640.0)),
    );
    page.add_element(
        HeadlessElement::new("div")
            .with_attribute("id", "footer")
            .with_attribute("data-splat-viewer", "")
            .with_attribute(
                "data-splat-config",
                &json!({ "modelUrl": "scans/bust.splat", "rotationSpeed": 0.02 }).to_string(),
            )
            .with_surface(),
    );
    page.add_element(
        HeadlessElement::new("div")
            .with_attribute("id", "collapsed")
            .with_attribute("data-splat-viewer", "")
            .with_surface()
            .hidden(),
    );

    let gate = DependencyGate::new();
    gate.signal();
    let handles = pollster::block_on(viewer.auto_init(&gate, READINESS_TIMEOUT_MS))?;

    viewer.graphics().advance_frames(600);
    page.resize_to(700.0);

    for handle in &handles {
        log::info!(
            "{}: {} frames, renderer {:?}, spin {:?}",
            handle.config().model_url,
            handle.renderer().renders(),
            handle.renderer().size(),
            handle.model().spin(),
        );
        handle.teardown();
    }

    log::info!(
        "{} listener(s) and {} frame loop(s) left",
        page.listener_count(),
        viewer.graphics().active_loops()
    );
    Ok(())
}
