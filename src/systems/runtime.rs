//! Runtime: owns state, input, output, the frame clock and the registry.
//!
//! Orchestration only. Universe lifecycle lives in [`Output`], frame timing
//! in [`FrameClock`], instance creation in [`UniverseRegistry`].

use std::rc::Rc;

use log::info;

use crate::backend::SharedTarget;
use crate::error::RuntimeError;
use crate::events::input::Input;
use crate::pipeline::postfx::PostFxConfig;
use crate::resources::config::RuntimeConfig;
use crate::resources::state::State;
use crate::systems::clock::FrameClock;
use crate::systems::output::Output;
use crate::universes::registry::UniverseRegistry;

#[derive(Debug)]
pub struct Runtime {
    state: Rc<State>,
    input: Input,
    output: Rc<Output>,
    clock: Rc<FrameClock>,
    registry: Rc<UniverseRegistry>,
}

impl Runtime {
    pub fn new(
        target: SharedTarget,
        registry: Rc<UniverseRegistry>,
        state: Rc<State>,
        config: &RuntimeConfig,
    ) -> Self {
        let input = Input::new();
        let output = Rc::new(Output::new(
            target,
            PostFxConfig::preset(config.postfx_quality),
            config.postfx_enabled,
        ));
        let clock = Rc::new(FrameClock::new(
            input.clone(),
            output.clone(),
            config.frame_interval(),
        ));
        Self {
            state,
            input,
            output,
            clock,
            registry,
        }
    }

    pub fn state(&self) -> &Rc<State> {
        &self.state
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn output(&self) -> &Rc<Output> {
        &self.output
    }

    pub fn clock(&self) -> &Rc<FrameClock> {
        &self.clock
    }

    pub fn registry(&self) -> &Rc<UniverseRegistry> {
        &self.registry
    }

    /// Deactivate everything, then activate `ids` in order.
    pub async fn set_active_universes<S: AsRef<str>>(&self, ids: &[S]) -> Result<(), RuntimeError> {
        for universe in self.output.active_universes() {
            self.output.deactivate_universe(&universe).await;
        }
        for id in ids {
            self.activate_universe(id.as_ref()).await?;
        }
        Ok(())
    }

    /// Create the universe on first use and activate it.
    ///
    /// A failing activation is logged and rolled back by [`Output`]; only an
    /// undefined id is reported to the caller.
    pub async fn activate_universe(&self, id: &str) -> Result<(), RuntimeError> {
        let universe = self
            .registry
            .get_or_create(id)
            .ok_or_else(|| RuntimeError::UnknownUniverse(id.to_string()))?;
        self.output.activate_universe(&universe).await;
        Ok(())
    }

    /// No-op for ids that were never instantiated.
    pub async fn deactivate_universe(&self, id: &str) {
        if let Some(universe) = self.registry.get_instance(id) {
            self.output.deactivate_universe(&universe).await;
        }
    }

    pub fn init(&self) {
        self.clock.init();
    }

    pub fn start(&self) -> Result<(), RuntimeError> {
        self.clock.start()
    }

    pub fn stop(&self) {
        self.clock.stop();
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.clock.resize(width, height);
    }

    /// Stop the loop, unmount every active universe and release everything.
    pub async fn shutdown(&self) {
        self.stop();
        for universe in self.output.active_universes() {
            self.output.deactivate_universe(&universe).await;
        }
        self.registry.dispose_all();
        self.clock.dispose();
        self.output.dispose();
        self.input.dispose();
        info!("runtime shut down");
    }
}
