//! Headless backend.
//!
//! Implements every backend capability without a GPU: scenes keep the list of
//! attached objects, the render target records each draw call, and the GPU
//! allocator tracks live handles. The demo binary runs on it and tests use it
//! to observe what the engine asked the backend to do.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{
    CameraHandle, ComposerHandle, FrameTiming, GpuHandle, GpuResources, ObjectHandle,
    RenderTarget, Scene, SceneHandle, SharedScene,
};
use crate::error::RenderError;
use crate::pipeline::postfx::Effect;

/// Monotonic id source shared by every handle kind.
#[derive(Debug, Clone, Default)]
pub struct HandleAllocator {
    next: Rc<Cell<u64>>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        let id = self.next.get() + 1;
        self.next.set(id);
        id
    }

    pub fn scene(&self) -> SceneHandle {
        SceneHandle(self.next_id())
    }

    pub fn camera(&self) -> CameraHandle {
        CameraHandle(self.next_id())
    }

    pub fn object(&self) -> ObjectHandle {
        ObjectHandle(self.next_id())
    }
}

/// Scene that only remembers which objects are attached.
#[derive(Debug)]
pub struct HeadlessScene {
    handle: SceneHandle,
    objects: Vec<ObjectHandle>,
}

impl HeadlessScene {
    pub fn new(handle: SceneHandle) -> Self {
        Self {
            handle,
            objects: Vec::new(),
        }
    }

    /// Wrap a new scene for sharing with a node graph.
    pub fn shared(handle: SceneHandle) -> Rc<RefCell<HeadlessScene>> {
        Rc::new(RefCell::new(Self::new(handle)))
    }

    pub fn contains(&self, object: ObjectHandle) -> bool {
        self.objects.contains(&object)
    }

    pub fn objects(&self) -> &[ObjectHandle] {
        &self.objects
    }
}

impl Scene for HeadlessScene {
    fn handle(&self) -> SceneHandle {
        self.handle
    }

    fn attach(&mut self, object: ObjectHandle) {
        if !self.objects.contains(&object) {
            self.objects.push(object);
        }
    }

    fn detach(&mut self, object: ObjectHandle) {
        self.objects.retain(|o| *o != object);
    }
}

/// Coerce a headless scene into the shared trait object the graph expects.
pub fn as_shared(scene: &Rc<RefCell<HeadlessScene>>) -> SharedScene {
    scene.clone()
}

/// One draw call observed by [`HeadlessTarget`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    pub scene: SceneHandle,
    pub camera: CameraHandle,
    /// Whether the draw went through a post-processing composer.
    pub composed: bool,
    pub frame: FrameTiming,
}

#[derive(Debug, Clone)]
struct ComposerRecord {
    scene: SceneHandle,
    camera: CameraHandle,
    effects: usize,
    size: (u32, u32),
}

#[derive(Debug, Default)]
struct TargetState {
    size: (u32, u32),
    draws: Vec<DrawRecord>,
    composers: FxHashMap<ComposerHandle, ComposerRecord>,
    next_composer: u64,
    composers_created: usize,
    fail_composer_setup: bool,
    fail_composer_render: bool,
}

/// Render target that records draw calls.
///
/// Cloning shares the underlying record so a test can keep a handle after
/// moving the target into the output.
#[derive(Debug, Clone, Default)]
pub struct HeadlessTarget {
    state: Rc<RefCell<TargetState>>,
}

impl HeadlessTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let target = Self::default();
        target.state.borrow_mut().size = (width, height);
        target
    }

    /// Every draw call since creation (or the last [`clear_draws`](Self::clear_draws)).
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    pub fn clear_draws(&self) {
        self.state.borrow_mut().draws.clear();
    }

    pub fn live_composers(&self) -> usize {
        self.state.borrow().composers.len()
    }

    pub fn composers_created(&self) -> usize {
        self.state.borrow().composers_created
    }

    /// Effects carried by the live composer for `scene`, if one exists.
    pub fn composer_effects(&self, scene: SceneHandle) -> Option<usize> {
        self.state
            .borrow()
            .composers
            .values()
            .find(|c| c.scene == scene)
            .map(|c| c.effects)
    }

    /// Size of the live composer for `scene`, if one exists.
    pub fn composer_size(&self, scene: SceneHandle) -> Option<(u32, u32)> {
        self.state
            .borrow()
            .composers
            .values()
            .find(|c| c.scene == scene)
            .map(|c| c.size)
    }

    /// Make composer creation fail from now on.
    pub fn fail_composer_setup(&self, fail: bool) {
        self.state.borrow_mut().fail_composer_setup = fail;
    }

    /// Make composer rendering fail from now on.
    pub fn fail_composer_render(&self, fail: bool) {
        self.state.borrow_mut().fail_composer_render = fail;
    }
}

impl RenderTarget for HeadlessTarget {
    fn size(&self) -> (u32, u32) {
        self.state.borrow().size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.state.borrow_mut().size = (width, height);
    }

    fn render(&mut self, scene: SceneHandle, camera: CameraHandle, frame: &FrameTiming) {
        trace!("render {} through {}", scene, camera);
        self.state.borrow_mut().draws.push(DrawRecord {
            scene,
            camera,
            composed: false,
            frame: *frame,
        });
    }

    fn create_composer(
        &mut self,
        scene: SceneHandle,
        camera: CameraHandle,
        effects: &[Effect],
    ) -> Result<ComposerHandle, RenderError> {
        let mut state = self.state.borrow_mut();
        if state.fail_composer_setup {
            return Err(RenderError::ComposerSetup("setup disabled".into()));
        }
        state.next_composer += 1;
        state.composers_created += 1;
        let handle = ComposerHandle(state.next_composer);
        let size = state.size;
        state.composers.insert(
            handle,
            ComposerRecord {
                scene,
                camera,
                effects: effects.len(),
                size,
            },
        );
        debug!("created {} with {} effect(s)", handle, effects.len());
        Ok(handle)
    }

    fn render_composer(
        &mut self,
        composer: ComposerHandle,
        frame: &FrameTiming,
    ) -> Result<(), RenderError> {
        let mut state = self.state.borrow_mut();
        if state.fail_composer_render {
            return Err(RenderError::ComposerRender("render disabled".into()));
        }
        let record = state
            .composers
            .get(&composer)
            .cloned()
            .ok_or(RenderError::UnknownComposer(composer.0))?;
        state.draws.push(DrawRecord {
            scene: record.scene,
            camera: record.camera,
            composed: true,
            frame: *frame,
        });
        Ok(())
    }

    fn resize_composer(&mut self, composer: ComposerHandle, width: u32, height: u32) {
        if let Some(record) = self.state.borrow_mut().composers.get_mut(&composer) {
            record.size = (width, height);
        }
    }

    fn release_composer(&mut self, composer: ComposerHandle) {
        self.state.borrow_mut().composers.remove(&composer);
    }
}

/// GPU allocator tracking which handles are still alive.
#[derive(Debug, Default)]
pub struct HeadlessGpu {
    next: Cell<u64>,
    live: RefCell<FxHashSet<GpuHandle>>,
    released: Cell<usize>,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn is_live(&self, handle: GpuHandle) -> bool {
        self.live.borrow().contains(&handle)
    }

    /// Total number of release calls for live handles.
    pub fn released_count(&self) -> usize {
        self.released.get()
    }
}

impl GpuResources for HeadlessGpu {
    fn allocate(&self, label: &str) -> GpuHandle {
        let handle = GpuHandle(self.next.get() + 1);
        self.next.set(handle.0);
        self.live.borrow_mut().insert(handle);
        trace!("allocated {} for {}", handle, label);
        handle
    }

    fn release(&self, handle: GpuHandle) {
        if self.live.borrow_mut().remove(&handle) {
            self.released.set(self.released.get() + 1);
        }
    }
}
