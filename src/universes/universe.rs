//! A universe: scene, camera, node graph, pipeline and the contract machine
//! deciding which nodes are mounted.
//!
//! # Contract transitions
//!
//! [`Universe::apply_contract`] never runs two transitions at once. A request
//! arriving while one runs is parked in a single slot (a newer request
//! replaces it) and applied as soon as the running one finishes, so the
//! universe always converges to the last requested contract. Each transition
//! awaits every exiting node's unmount before mounting any entering node.
//!
//! A failed transition keeps the current contract but remembers the ids it
//! touched. The next request, even for the current contract, is then diffed
//! against what is actually mounted so the graph can catch up.
//!
//! Background contract requests go through [`Universe::spawn_contract`];
//! [`Universe::dispose`] aborts them before disposing the graph.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::future::join_all;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;

use crate::backend::{CameraHandle, FrameTiming, RenderTarget, SceneHandle, SharedScene};
use crate::error::{GraphError, LifecycleError, LifecycleStage};
use crate::nodes::graph::NodeGraph;
use crate::nodes::node::{HookFuture, ready};
use crate::pipeline::pass::{PassContext, Pipeline};
use crate::resources::assets::AssetStore;
use crate::universes::contract::{Contract, ContractDiff, NodeIds};

/// Per-universe behaviour layered on the shared lifecycle.
pub trait UniverseHooks {
    /// Runs first in every `before_mount`, before assets are preloaded.
    fn setup(&mut self, _universe: &Universe) -> HookFuture {
        ready()
    }

    /// Runs last in `on_mounted`.
    fn on_mounted(&mut self, _universe: &Rc<Universe>) {}

    /// Runs first in `before_unmount`.
    fn before_unmount(&mut self, _universe: &Universe) {}

    fn resize(&mut self, _universe: &Universe, _width: u32, _height: u32) {}
}

#[derive(Debug, Default)]
struct ContractMachine {
    contracts: FxHashMap<String, Contract>,
    current: Option<String>,
    transitioning: bool,
    queued: Option<String>,
    /// Ids a failed transition may have left half way.
    unsettled: NodeIds,
}

/// Clears the transitioning flag however the transition ends.
struct TransitionGuard<'a>(&'a RefCell<ContractMachine>);

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().transitioning = false;
    }
}

pub struct Universe {
    id: String,
    scene: SharedScene,
    scene_handle: SceneHandle,
    camera: CameraHandle,
    graph: NodeGraph,
    pipeline: RefCell<Pipeline>,
    assets: Option<AssetStore>,
    preload_groups: Vec<String>,
    initial_contract: Option<String>,
    machine: RefCell<ContractMachine>,
    active: Cell<bool>,
    mounted: Cell<bool>,
    disposed: Cell<bool>,
    contract_tasks: RefCell<Vec<JoinHandle<()>>>,
    hooks: RefCell<Option<Box<dyn UniverseHooks>>>,
}

impl std::fmt::Debug for Universe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Universe")
            .field("id", &self.id)
            .field("scene", &self.scene_handle)
            .field("camera", &self.camera)
            .field("active", &self.active.get())
            .field("mounted", &self.mounted.get())
            .field("current_contract", &self.machine.borrow().current)
            .finish()
    }
}

/// Assembles a [`Universe`].
pub struct UniverseBuilder {
    id: String,
    scene: SharedScene,
    camera: CameraHandle,
    pipeline: Pipeline,
    assets: Option<AssetStore>,
    preload_groups: Vec<String>,
    contracts: Vec<Contract>,
    initial_contract: Option<String>,
    hooks: Option<Box<dyn UniverseHooks>>,
}

impl UniverseBuilder {
    pub fn new(id: impl Into<String>, scene: SharedScene, camera: CameraHandle) -> Self {
        Self {
            id: id.into(),
            scene,
            camera,
            pipeline: Pipeline::default(),
            assets: None,
            preload_groups: Vec::new(),
            contracts: Vec::new(),
            initial_contract: None,
            hooks: None,
        }
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Store used for group preloading in `before_mount`.
    pub fn assets(mut self, assets: AssetStore) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn preload_group(mut self, group: impl Into<String>) -> Self {
        self.preload_groups.push(group.into());
        self
    }

    pub fn contract(mut self, contract: Contract) -> Self {
        self.contracts.push(contract);
        self
    }

    /// Contract applied, without being awaited, once the universe is mounted.
    pub fn initial_contract(mut self, id: impl Into<String>) -> Self {
        self.initial_contract = Some(id.into());
        self
    }

    pub fn hooks(mut self, hooks: impl UniverseHooks + 'static) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    pub fn build(self) -> Rc<Universe> {
        let scene_handle = self.scene.borrow().handle();
        let machine = ContractMachine {
            contracts: self
                .contracts
                .into_iter()
                .map(|c| (c.id().to_string(), c))
                .collect(),
            ..ContractMachine::default()
        };
        Rc::new(Universe {
            id: self.id,
            graph: NodeGraph::new(self.scene.clone()),
            scene: self.scene,
            scene_handle,
            camera: self.camera,
            pipeline: RefCell::new(self.pipeline),
            assets: self.assets,
            preload_groups: self.preload_groups,
            initial_contract: self.initial_contract,
            machine: RefCell::new(machine),
            active: Cell::new(false),
            mounted: Cell::new(false),
            disposed: Cell::new(false),
            contract_tasks: RefCell::new(Vec::new()),
            hooks: RefCell::new(self.hooks),
        })
    }
}

impl Universe {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    pub fn scene_handle(&self) -> SceneHandle {
        self.scene_handle
    }

    pub fn camera(&self) -> CameraHandle {
        self.camera
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn assets(&self) -> Option<&AssetStore> {
        self.assets.as_ref()
    }

    pub fn active(&self) -> bool {
        self.active.get()
    }

    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    pub fn mounted(&self) -> bool {
        self.mounted.get()
    }

    pub fn mark_mounted(&self) {
        self.mounted.set(true);
    }

    pub fn mark_unmounted(&self) {
        self.mounted.set(false);
    }

    /// Add or replace a contract.
    pub fn register_contract(&self, contract: Contract) {
        self.machine
            .borrow_mut()
            .contracts
            .insert(contract.id().to_string(), contract);
    }

    /// Last contract whose transition completed.
    pub fn current_contract_id(&self) -> Option<String> {
        self.machine.borrow().current.clone()
    }

    pub fn is_transitioning(&self) -> bool {
        self.machine.borrow().transitioning
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Apply `id` in the background. The task is aborted by [`Universe::dispose`].
    pub fn spawn_contract(self: &Rc<Self>, id: impl Into<String>) {
        if self.disposed.get() {
            return;
        }
        let id = id.into();
        let universe = Rc::clone(self);
        let task = tokio::task::spawn_local(async move {
            if let Err(err) = universe.apply_contract(&id).await {
                warn!("{}: contract {} failed: {}", universe.id, id, err);
            }
        });
        let mut tasks = self.contract_tasks.borrow_mut();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Move to contract `next_id`.
    ///
    /// Returns immediately, after parking the request, when a transition is
    /// already running. Unknown ids are ignored, and so is the current id
    /// unless a failed transition left nodes unsettled. A failed transition
    /// leaves the current contract unchanged. When queued requests were
    /// drained, the result is that of the last transition run; earlier
    /// failures are logged. Does nothing once the universe is disposed.
    pub async fn apply_contract(&self, next_id: &str) -> Result<(), GraphError> {
        if self.disposed.get() {
            return Ok(());
        }
        {
            let mut machine = self.machine.borrow_mut();
            if machine.transitioning {
                debug!("{}: queueing contract {}", self.id, next_id);
                machine.queued = Some(next_id.to_string());
                return Ok(());
            }
        }

        let mut next = next_id.to_string();
        let mut outcome = Ok(());
        loop {
            let diff = {
                let mut machine = self.machine.borrow_mut();
                let settled = machine.unsettled.is_empty();
                if settled && machine.current.as_deref() == Some(next.as_str()) {
                    break;
                }
                let Some(contract) = machine.contracts.get(&next) else {
                    debug!("{}: ignoring unknown contract {}", self.id, next);
                    break;
                };
                let prev = machine
                    .current
                    .as_ref()
                    .and_then(|id| machine.contracts.get(id));
                let diff = if settled {
                    contract.diff_from(prev)
                } else {
                    contract.reconcile(prev, &machine.unsettled, |id| self.graph.is_mounted(id))
                };
                machine.transitioning = true;
                diff
            };

            let guard = TransitionGuard(&self.machine);
            info!(
                "{}: contract {:?} -> {} (exit {:?}, enter {:?})",
                self.id,
                self.current_contract_id(),
                next,
                diff.exiting,
                diff.entering
            );
            let result = self.transition(&diff).await;
            if self.disposed.get() {
                debug!("{}: disposed during contract {}", self.id, next);
                return Ok(());
            }
            {
                let mut machine = self.machine.borrow_mut();
                match &result {
                    Ok(()) => {
                        machine.current = Some(next.clone());
                        machine.unsettled.clear();
                    }
                    Err(_) => {
                        for id in diff.exiting.iter().chain(&diff.entering) {
                            if !machine.unsettled.contains(id) {
                                machine.unsettled.push(id.clone());
                            }
                        }
                    }
                }
            }
            drop(guard);

            if let Err(err) = &outcome {
                warn!("{}: superseded transition failed: {}", self.id, err);
            }
            outcome = result;

            let queued = self.machine.borrow_mut().queued.take();
            match queued {
                Some(queued) => next = queued,
                None => break,
            }
        }
        outcome
    }

    async fn transition(&self, diff: &ContractDiff) -> Result<(), GraphError> {
        self.graph.unmount_many(&diff.exiting).await?;
        if self.disposed.get() {
            return Ok(());
        }
        self.graph.mount_many(&diff.entering).await
    }

    /// Setup hook, asset preloading, then pipeline setup.
    pub async fn before_mount(&self) -> Result<(), LifecycleError> {
        let setup = self.hooks.borrow_mut().as_mut().map(|h| h.setup(self));
        if let Some(setup) = setup {
            setup.await?;
        }

        if let Some(assets) = &self.assets
            && !self.preload_groups.is_empty()
        {
            let loads = self
                .preload_groups
                .iter()
                .map(|group| assets.preload_group(group, false));
            for result in join_all(loads).await {
                result.map_err(|err| {
                    LifecycleError::new(LifecycleStage::BeforeMount, &self.id, err)
                })?;
            }
        }

        let pipeline = self.pipeline.borrow_mut().before_mount();
        pipeline.await
    }

    /// Activate passes and start the initial contract in the background.
    pub fn on_mounted(self: &Rc<Self>) {
        debug!("{}: mounted", self.id);
        self.pipeline.borrow_mut().on_mounted();

        if let Some(initial) = self.initial_contract.clone() {
            self.spawn_contract(initial);
        }

        let hooks = self.hooks.borrow_mut().take();
        if let Some(mut hooks) = hooks {
            hooks.on_mounted(self);
            self.hooks.borrow_mut().get_or_insert(hooks);
        }
    }

    pub async fn before_unmount(&self) -> Result<(), LifecycleError> {
        debug!("{}: unmounting", self.id);
        if let Some(hooks) = self.hooks.borrow_mut().as_mut() {
            hooks.before_unmount(self);
        }
        let pipeline = self.pipeline.borrow_mut().before_unmount();
        pipeline.await
    }

    pub fn on_unmounted(&self) {
        self.pipeline.borrow_mut().on_unmounted();
    }

    pub fn update(&self, time: f64, dt: f64) {
        self.graph.update(time, dt);
    }

    /// Render this universe's pipeline into `target`.
    pub fn render(&self, frame: &FrameTiming, target: &RefCell<dyn RenderTarget>) {
        let ctx = PassContext {
            scene: self.scene_handle,
            camera: self.camera,
            target,
        };
        self.pipeline.borrow_mut().render(frame, &ctx);
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.pipeline.borrow_mut().resize(width, height);
        self.graph.resize(width, height);
        if let Some(hooks) = self.hooks.borrow_mut().as_mut() {
            hooks.resize(self, width, height);
        }
    }

    /// Abort background contract work, then dispose pipeline and graph.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for task in self.contract_tasks.borrow_mut().drain(..) {
            task.abort();
        }
        self.pipeline.borrow_mut().dispose();
        self.graph.dispose();
    }
}
