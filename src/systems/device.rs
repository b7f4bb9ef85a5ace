//! Composition root.
//!
//! [`Device`] builds the asset store, shared state, universe registry and
//! runtime around one render target and boots them in a fixed order:
//!
//! 1. viewport and render size
//! 2. preload the `boot` asset group
//! 3. hand the grain texture to the post-processing pass
//! 4. initialize the runtime
//! 5. activate the default universe
//! 6. start the frame loop

use std::cell::Cell;
use std::rc::Rc;

use log::{info, warn};

use crate::backend::{GpuResources, SharedTarget};
use crate::error::RuntimeError;
use crate::events::input::Input;
use crate::resources::assets::{AssetManifest, AssetStore, LoaderSet};
use crate::resources::config::RuntimeConfig;
use crate::resources::inputbridge::InputBridge;
use crate::resources::state::State;
use crate::systems::runtime::Runtime;
use crate::universes::registry::UniverseRegistry;
use crate::universes::universe::Universe;

/// Manifest key of the film-grain texture used by post-processing.
pub const GRAIN_TEXTURE_KEY: &str = "postfx.grainTexture";
/// Asset group preloaded before any universe is activated.
pub const BOOT_GROUP: &str = "boot";

/// Services a universe factory may capture.
#[derive(Clone)]
pub struct DeviceSlice {
    pub assets: AssetStore,
    pub input: Input,
    pub state: Rc<State>,
    pub target: SharedTarget,
}

pub struct Device {
    config: RuntimeConfig,
    target: SharedTarget,
    assets: AssetStore,
    registry: Rc<UniverseRegistry>,
    runtime: Runtime,
    disposed: Cell<bool>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("runtime", &self.runtime)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

impl Device {
    /// Wire a device whose assets load from `config.asset_root`.
    pub fn new(
        config: RuntimeConfig,
        target: SharedTarget,
        gpu: Rc<dyn GpuResources>,
        manifest: AssetManifest,
    ) -> Self {
        let loaders = LoaderSet::filesystem(config.asset_root.clone(), gpu);
        Self::with_loaders(config, target, manifest, loaders)
    }

    pub fn with_loaders(
        config: RuntimeConfig,
        target: SharedTarget,
        manifest: AssetManifest,
        loaders: LoaderSet,
    ) -> Self {
        let assets = AssetStore::new(manifest, loaders);
        let state = Rc::new(State::new(config.pixel_ratio));
        let registry = Rc::new(UniverseRegistry::new());
        let runtime = Runtime::new(target.clone(), registry.clone(), state, &config);
        Self {
            config,
            target,
            assets,
            registry,
            runtime,
            disposed: Cell::new(false),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn slice(&self) -> DeviceSlice {
        DeviceSlice {
            assets: self.assets.clone(),
            input: self.runtime.input().clone(),
            state: self.runtime.state().clone(),
            target: self.target.clone(),
        }
    }

    /// Register a universe built from this device's services.
    pub fn define_universe(
        &self,
        id: impl Into<String>,
        factory: impl Fn(&DeviceSlice) -> Rc<Universe> + 'static,
        is_default: bool,
    ) {
        let slice = self.slice();
        self.registry.define(id, move || factory(&slice), is_default);
    }

    /// Pointer commands from `bridge` reach the input hub every frame.
    pub fn attach_input_bridge(&self, bridge: InputBridge) {
        self.runtime.clock().attach_bridge(bridge);
    }

    /// Boot and start the frame loop. Must run inside a `LocalSet`.
    pub async fn init(&self) -> Result<(), RuntimeError> {
        if self.disposed.get() {
            return Err(RuntimeError::Disposed);
        }
        self.resize(self.config.width, self.config.height);

        self.assets.preload_group(BOOT_GROUP, false).await?;

        let grain = self
            .assets
            .get(GRAIN_TEXTURE_KEY)
            .and_then(|asset| asset.as_texture().map(|texture| texture.gpu));
        if grain.is_none() {
            warn!("no grain texture loaded; post-processing runs without grain");
        }
        self.runtime.output().set_postfx_grain_texture(grain);

        self.runtime.init();
        if let Some(id) = self.registry.default_id() {
            self.runtime.activate_universe(&id).await?;
        }
        self.runtime.start()?;
        info!(
            "device ready: {}x{} @{}x",
            self.config.width, self.config.height, self.config.pixel_ratio
        );
        Ok(())
    }

    /// Viewport in logical pixels; the drawing buffer is scaled by the pixel ratio.
    pub fn resize(&self, width: u32, height: u32) {
        let state = self.runtime.state();
        state.set_viewport(width, height, None);
        let dpr = state.viewport().dpr;
        let buffer_w = (width as f32 * dpr).round() as u32;
        let buffer_h = (height as f32 * dpr).round() as u32;
        self.target.borrow_mut().set_size(buffer_w, buffer_h);
        self.runtime.resize(width, height);
    }

    pub fn start(&self) -> Result<(), RuntimeError> {
        self.runtime.start()
    }

    pub fn stop(&self) {
        self.runtime.stop();
    }

    /// Shut the runtime down and release every cached asset. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.runtime.shutdown().await;
        self.assets.dispose_all();
        info!("device disposed");
    }
}
