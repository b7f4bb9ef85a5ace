//! Node graph: registered nodes and their mount state.
//!
//! Mount order is `before_mount` (awaited) → scene attach → `on_mounted`
//! (entry effect spawned, not awaited) → mounted. Unmount order is
//! `before_unmount` (awaited, this is where exit animation runs) → scene
//! detach → `on_unmounted` → unmounted.
//!
//! A node enters `Mounting`/`Unmounting` before its first await, so a second
//! call for the same id that arrives mid-transition is a no-op instead of a
//! second interleaved transition. Entry effects run on the local task set and
//! must therefore be driven inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::future::join_all;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;

use crate::backend::{ObjectHandle, SharedScene};
use crate::error::GraphError;
use crate::nodes::node::Node;

/// Where a node is in its mount lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

impl NodePhase {
    /// Completed `on_mounted` without a following `on_unmounted`.
    pub fn is_mounted(self) -> bool {
        matches!(self, NodePhase::Mounted | NodePhase::Unmounting)
    }
}

struct Slot {
    node: RefCell<Box<dyn Node>>,
    renderable: Option<ObjectHandle>,
    phase: Cell<NodePhase>,
    effect: RefCell<Option<JoinHandle<()>>>,
}

impl Slot {
    fn abort_effect(&self) {
        if let Some(effect) = self.effect.borrow_mut().take() {
            effect.abort();
        }
    }
}

pub struct NodeGraph {
    scene: SharedScene,
    slots: RefCell<FxHashMap<String, Rc<Slot>>>,
}

impl std::fmt::Debug for NodeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGraph")
            .field("nodes", &self.len())
            .field("mounted", &self.mounted_ids())
            .finish()
    }
}

impl NodeGraph {
    pub fn new(scene: SharedScene) -> Self {
        Self {
            scene,
            slots: RefCell::new(FxHashMap::default()),
        }
    }

    /// Register `node`, replacing any node with the same id.
    pub fn add(&self, node: Box<dyn Node>) {
        let id = node.id().to_string();
        let slot = Rc::new(Slot {
            renderable: node.renderable(),
            node: RefCell::new(node),
            phase: Cell::new(NodePhase::Unmounted),
            effect: RefCell::new(None),
        });
        if let Some(previous) = self.slots.borrow_mut().insert(id.clone(), slot) {
            previous.abort_effect();
            if previous.phase.get() != NodePhase::Unmounted {
                warn!("node {} replaced while {:?}", id, previous.phase.get());
            }
        }
    }

    pub fn add_many(&self, nodes: impl IntoIterator<Item = Box<dyn Node>>) {
        for node in nodes {
            self.add(node);
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.slots.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn phase(&self, id: &str) -> Option<NodePhase> {
        self.slots.borrow().get(id).map(|slot| slot.phase.get())
    }

    pub fn is_mounted(&self, id: &str) -> bool {
        self.phase(id).is_some_and(NodePhase::is_mounted)
    }

    /// Ids of mounted nodes, sorted.
    pub fn mounted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .borrow()
            .iter()
            .filter(|(_, slot)| slot.phase.get().is_mounted())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Run `f` against the node registered as `id`.
    pub fn with_node<R>(&self, id: &str, f: impl FnOnce(&dyn Node) -> R) -> Option<R> {
        let slot = self.slots.borrow().get(id).cloned()?;
        let node = slot.node.borrow();
        Some(f(node.as_ref()))
    }

    fn slot(&self, id: &str) -> Result<Rc<Slot>, GraphError> {
        self.slots
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(id.to_string()))
    }

    fn holds(&self, id: &str, slot: &Rc<Slot>) -> bool {
        self.slots
            .borrow()
            .get(id)
            .is_some_and(|current| Rc::ptr_eq(current, slot))
    }

    pub async fn mount(&self, id: &str) -> Result<(), GraphError> {
        let slot = self.slot(id)?;
        if slot.phase.get() != NodePhase::Unmounted {
            return Ok(());
        }
        slot.phase.set(NodePhase::Mounting);
        debug!("mounting node {} ({})", id, slot.node.borrow().name());

        let setup = slot.node.borrow_mut().before_mount();
        if let Err(err) = setup.await {
            slot.phase.set(NodePhase::Unmounted);
            return Err(err.into());
        }
        if !self.holds(id, &slot) {
            // Disposed or replaced while setting up.
            debug!("node {} left the graph during mount", id);
            slot.phase.set(NodePhase::Unmounted);
            return Ok(());
        }

        if let Some(object) = slot.renderable {
            self.scene.borrow_mut().attach(object);
        }
        let effect = slot.node.borrow_mut().on_mounted();
        slot.abort_effect();
        if let Some(effect) = effect {
            *slot.effect.borrow_mut() = Some(tokio::task::spawn_local(effect));
        }
        slot.phase.set(NodePhase::Mounted);
        Ok(())
    }

    pub async fn unmount(&self, id: &str) -> Result<(), GraphError> {
        let slot = self.slot(id)?;
        if slot.phase.get() != NodePhase::Mounted {
            return Ok(());
        }
        slot.phase.set(NodePhase::Unmounting);
        slot.abort_effect();
        debug!("unmounting node {} ({})", id, slot.node.borrow().name());

        let exit = slot.node.borrow_mut().before_unmount();
        if let Err(err) = exit.await {
            slot.phase.set(NodePhase::Mounted);
            return Err(err.into());
        }

        if let Some(object) = slot.renderable {
            self.scene.borrow_mut().detach(object);
        }
        slot.node.borrow_mut().on_unmounted();
        slot.phase.set(NodePhase::Unmounted);
        Ok(())
    }

    /// Mount every id concurrently. Every member settles even when some fail.
    pub async fn mount_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), GraphError> {
        let results = join_all(ids.iter().map(|id| self.mount(id.as_ref()))).await;
        collect_batch(results)
    }

    /// Unmount every id concurrently. Every member settles even when some fail.
    pub async fn unmount_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), GraphError> {
        let results = join_all(ids.iter().map(|id| self.unmount(id.as_ref()))).await;
        collect_batch(results)
    }

    /// Update mounted nodes that report themselves active.
    pub fn update(&self, time: f64, dt: f64) {
        for slot in self.slots.borrow().values() {
            if !slot.phase.get().is_mounted() {
                continue;
            }
            let mut node = slot.node.borrow_mut();
            if node.active() {
                node.update(time, dt);
            }
        }
    }

    /// Resize every registered node.
    pub fn resize(&self, width: u32, height: u32) {
        for slot in self.slots.borrow().values() {
            slot.node.borrow_mut().resize(width, height);
        }
    }

    /// Dispose every node and forget them. A mount still awaiting its
    /// `before_mount` finishes without attaching anything.
    pub fn dispose(&self) {
        let slots: Vec<Rc<Slot>> = self.slots.borrow_mut().drain().map(|(_, s)| s).collect();
        for slot in slots {
            slot.abort_effect();
            slot.node.borrow_mut().dispose();
        }
    }
}

fn collect_batch(results: Vec<Result<(), GraphError>>) -> Result<(), GraphError> {
    let failures: Vec<GraphError> = results.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        warn!("{}", failure);
    }
    Err(GraphError::Batch(failures))
}
