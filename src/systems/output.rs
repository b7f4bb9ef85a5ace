//! Active-universe orchestration and frame composition.
//!
//! [`Output`] owns the ordered set of active universes and runs their
//! activation and deactivation. Each universe has a lifecycle token that is
//! bumped on every activate/deactivate; a continuation resuming after an
//! await only finalizes when its token is still current and the universe is
//! still in the state it expects, so an older call never undoes a newer one.
//!
//! With post-processing enabled only the last active, mounted universe is
//! shown, routed through the post-fx pass. Otherwise every active, mounted
//! universe renders its own pipeline in activation order.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, error, info};
use rustc_hash::FxHashMap;

use crate::backend::{FrameTiming, GpuHandle, SharedTarget};
use crate::pipeline::pass::{Pass, PassContext};
use crate::pipeline::postfx::{PostFxConfig, PostProcessingPass};
use crate::universes::universe::Universe;

#[derive(Default)]
struct ActiveSet {
    universes: Vec<Rc<Universe>>,
    tokens: FxHashMap<String, u64>,
}

impl ActiveSet {
    fn contains(&self, universe: &Rc<Universe>) -> bool {
        self.universes.iter().any(|u| Rc::ptr_eq(u, universe))
    }

    fn remove(&mut self, universe: &Rc<Universe>) {
        self.universes.retain(|u| !Rc::ptr_eq(u, universe));
    }

    fn bump(&mut self, universe: &Universe) -> u64 {
        let token = self.tokens.entry(universe.id().to_string()).or_insert(0);
        *token += 1;
        *token
    }

    fn token(&self, universe: &Universe) -> u64 {
        self.tokens.get(universe.id()).copied().unwrap_or(0)
    }
}

pub struct Output {
    target: SharedTarget,
    active: RefCell<ActiveSet>,
    postfx: RefCell<PostProcessingPass>,
    postfx_enabled: Cell<bool>,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self
            .active_universes()
            .iter()
            .map(|u| u.id().to_string())
            .collect();
        f.debug_struct("Output")
            .field("active", &ids)
            .field("postfx_enabled", &self.postfx_enabled.get())
            .finish()
    }
}

impl Output {
    pub fn new(target: SharedTarget, postfx: PostFxConfig, postfx_enabled: bool) -> Self {
        Self {
            postfx: RefCell::new(PostProcessingPass::new(postfx, target.clone())),
            target,
            active: RefCell::new(ActiveSet::default()),
            postfx_enabled: Cell::new(postfx_enabled),
        }
    }

    pub fn target(&self) -> &SharedTarget {
        &self.target
    }

    /// Active universes in activation order.
    pub fn active_universes(&self) -> Vec<Rc<Universe>> {
        self.active.borrow().universes.clone()
    }

    pub fn is_active(&self, universe: &Rc<Universe>) -> bool {
        self.active.borrow().contains(universe)
    }

    pub fn postfx_enabled(&self) -> bool {
        self.postfx_enabled.get()
    }

    pub fn set_postfx_enabled(&self, enabled: bool) {
        self.postfx_enabled.set(enabled);
    }

    pub fn set_postfx_config(&self, config: PostFxConfig) {
        self.postfx.borrow_mut().set_config(config);
    }

    pub fn set_postfx_grain_texture(&self, texture: Option<GpuHandle>) {
        self.postfx.borrow_mut().set_grain_texture(texture);
    }

    /// Make `universe` active and mount it if needed.
    ///
    /// A failing `before_mount` is logged and, unless a newer call took
    /// over meanwhile, rolled back so the universe is left inactive.
    pub async fn activate_universe(&self, universe: &Rc<Universe>) {
        let token = {
            let mut active = self.active.borrow_mut();
            if active.contains(universe) {
                return;
            }
            let token = active.bump(universe);
            universe.set_active(true);
            active.universes.push(universe.clone());
            token
        };
        if universe.mounted() {
            return;
        }

        info!("activating universe {}", universe.id());
        if let Err(err) = universe.before_mount().await {
            error!("activation of universe {} failed: {}", universe.id(), err);
            let mut active = self.active.borrow_mut();
            if active.token(universe) != token {
                return;
            }
            active.remove(universe);
            universe.set_active(false);
            return;
        }

        if !self.still_current(universe, token, true) {
            debug!("activation of universe {} superseded", universe.id());
            return;
        }
        universe.on_mounted();
        universe.mark_mounted();
    }

    /// Make `universe` inactive and unmount it if it was mounted.
    pub async fn deactivate_universe(&self, universe: &Rc<Universe>) {
        let token = {
            let mut active = self.active.borrow_mut();
            if !active.contains(universe) {
                return;
            }
            let token = active.bump(universe);
            active.remove(universe);
            universe.set_active(false);
            token
        };
        if !universe.mounted() {
            return;
        }

        info!("deactivating universe {}", universe.id());
        if let Err(err) = universe.before_unmount().await {
            error!("deactivation of universe {} failed: {}", universe.id(), err);
            return;
        }

        if !self.still_current(universe, token, false) {
            debug!("deactivation of universe {} superseded", universe.id());
            return;
        }
        universe.on_unmounted();
        universe.mark_unmounted();
    }

    fn still_current(&self, universe: &Rc<Universe>, token: u64, activating: bool) -> bool {
        let active = self.active.borrow();
        universe.active() == activating
            && active.contains(universe) == activating
            && active.token(universe) == token
    }

    fn active_mounted(&self) -> Vec<Rc<Universe>> {
        self.active
            .borrow()
            .universes
            .iter()
            .filter(|u| u.mounted())
            .cloned()
            .collect()
    }

    pub fn update(&self, time: f64, dt: f64) {
        for universe in self.active_mounted() {
            universe.update(time, dt);
        }
    }

    pub fn render(&self, frame: &FrameTiming) {
        let visible = self.active_mounted();
        let Some(primary) = visible.last() else {
            return;
        };

        if self.postfx_enabled.get() {
            let ctx = PassContext {
                scene: primary.scene_handle(),
                camera: primary.camera(),
                target: &*self.target,
            };
            self.postfx.borrow_mut().render(frame, &ctx);
            return;
        }

        for universe in &visible {
            universe.render(frame, &self.target);
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.postfx.borrow_mut().resize(width, height);
        for universe in self.active_mounted() {
            universe.resize(width, height);
        }
    }

    pub fn dispose(&self) {
        self.postfx.borrow_mut().dispose();
    }
}
