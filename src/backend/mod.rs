//! Capabilities the engine consumes from a rendering backend.
//!
//! The engine never inspects scenes, cameras or GPU resources. It only moves
//! opaque handles around and calls into these traits:
//! - [`Scene`] – attach/detach renderable objects
//! - [`RenderTarget`] – draw a (scene, camera) pair directly or through a composer
//! - [`GpuResources`] – allocate/release GPU handles for loaded assets
//!
//! [`headless`] provides a recording implementation used by the demo binary
//! and the tests.

pub mod headless;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::RenderError;
use crate::pipeline::postfx::Effect;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

opaque_handle!(
    /// Backend scene a universe renders.
    SceneHandle,
    "scene"
);
opaque_handle!(
    /// Backend camera a universe renders through.
    CameraHandle,
    "camera"
);
opaque_handle!(
    /// Renderable object a node can attach to a scene.
    ObjectHandle,
    "object"
);
opaque_handle!(
    /// GPU-side resource (texture, geometry, material buffer).
    GpuHandle,
    "gpu"
);
opaque_handle!(
    /// Post-processing composer built by the render target.
    ComposerHandle,
    "composer"
);

/// Timing record handed to every render call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTiming {
    /// Milliseconds since the frame clock started.
    pub time: f64,
    /// Milliseconds since the previous tick.
    pub delta_time_ms: f64,
}

/// Scene attachment capability used by the node graph.
pub trait Scene {
    fn handle(&self) -> SceneHandle;
    fn attach(&mut self, object: ObjectHandle);
    fn detach(&mut self, object: ObjectHandle);
}

/// Scene shared between a universe and its node graph.
pub type SharedScene = Rc<RefCell<dyn Scene>>;

/// Render-target capability. All calls are synchronous.
pub trait RenderTarget {
    /// Drawing buffer size in pixels.
    fn size(&self) -> (u32, u32);
    fn set_size(&mut self, width: u32, height: u32);

    /// Render `scene` through `camera` straight to the target.
    fn render(&mut self, scene: SceneHandle, camera: CameraHandle, frame: &FrameTiming);

    /// Build a composer that renders `scene` then applies `effects` in order.
    fn create_composer(
        &mut self,
        scene: SceneHandle,
        camera: CameraHandle,
        effects: &[Effect],
    ) -> Result<ComposerHandle, RenderError>;

    fn render_composer(
        &mut self,
        composer: ComposerHandle,
        frame: &FrameTiming,
    ) -> Result<(), RenderError>;

    fn resize_composer(&mut self, composer: ComposerHandle, width: u32, height: u32);

    fn release_composer(&mut self, composer: ComposerHandle);
}

/// Render target shared by the output and the post-processing pass.
pub type SharedTarget = Rc<RefCell<dyn RenderTarget>>;

/// GPU allocation capability used by asset loaders and disposal.
pub trait GpuResources {
    fn allocate(&self, label: &str) -> GpuHandle;
    fn release(&self, handle: GpuHandle);
}
