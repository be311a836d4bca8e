//! Capability interfaces over the external 3D and splat libraries.
//!
//! The viewer never touches a concrete library; the web engine implements these
//! over `THREE` and `SPARK`, the headless engine over plain Rust state.

use crate::config::Lens;
use crate::layout::Dimensions;

/// A loaded splat that can be placed and spun.
pub trait SplatModel {
    fn set_position(&mut self, position: [f32; 3]) -> anyhow::Result<()>;

    /// Quaternion `x,y,z,w`
    fn set_orientation(&mut self, orientation: [f32; 4]) -> anyhow::Result<()>;

    /// Add `radians` to the rotation about the y axis
    fn rotate_y(&mut self, radians: f32) -> anyhow::Result<()>;
}

pub trait SceneGraph<M> {
    /// Inward-facing sphere surrounding the model
    fn add_background_sphere(&mut self, radius: f32, color: u32) -> anyhow::Result<()>;

    fn add_model(&mut self, model: &M) -> anyhow::Result<()>;

    fn remove_model(&mut self, model: &M) -> anyhow::Result<()>;
}

pub trait PerspectiveCamera {
    fn set_position(&mut self, position: [f32; 3]) -> anyhow::Result<()>;

    /// Change the aspect ratio and refresh the projection
    fn set_aspect(&mut self, aspect: f32) -> anyhow::Result<()>;
}

/// Per-frame callback installed on a renderer.
pub type FrameCallback = Box<dyn FnMut()>;

pub trait FrameRenderer<S, C> {
    fn set_size(&mut self, width: f64, height: f64) -> anyhow::Result<()>;

    fn render(&mut self, scene: &S, camera: &C) -> anyhow::Result<()>;

    /// Install `callback` to run once per display frame, or stop with `None`
    fn set_animation_loop(&mut self, callback: Option<FrameCallback>) -> anyhow::Result<()>;
}

/// Builds scenes, cameras and renderers.
pub trait GraphicsFactory: 'static {
    type Surface;
    type Model: SplatModel + 'static;
    type Scene: SceneGraph<Self::Model> + 'static;
    type Camera: PerspectiveCamera + 'static;
    type Renderer: FrameRenderer<Self::Scene, Self::Camera> + 'static;

    fn create_scene(&self) -> anyhow::Result<Self::Scene>;

    fn create_camera(&self, lens: &Lens, aspect: f32) -> anyhow::Result<Self::Camera>;

    fn create_renderer(
        &self,
        surface: &Self::Surface,
        dimensions: &Dimensions,
    ) -> anyhow::Result<Self::Renderer>;
}

/// Creates splat models from asset URLs.
///
/// The returned model is usable at once; fetching and decoding happen inside
/// the library.
pub trait ModelLoader {
    type Model: SplatModel;

    fn load(&self, url: &str) -> anyhow::Result<Self::Model>;
}
