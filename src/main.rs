//! Stagecraft headless demo.
//!
//! Boots a device on the headless backend, activates the main universe and
//! runs the frame loop for a fixed number of frames while a scripted pointer
//! clicks every few frames, swapping contracts. Draw calls and GPU handles are
//! recorded instead of rasterized.
//!
//! # Running
//!
//! ```sh
//! cargo run -- --frames 600 --swap-every 120
//! RUST_LOG=debug cargo run -- --no-postfx
//! ```

use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use log::{error, info, warn};

use stagecraft::backend::SharedTarget;
use stagecraft::backend::headless::{
    HandleAllocator, HeadlessGpu, HeadlessScene, HeadlessTarget, as_shared,
};
use stagecraft::demo::universe::{MAIN_UNIVERSE, MainSceneParts, main_universe};
use stagecraft::demo::with_demo_hooks;
use stagecraft::error::RuntimeError;
use stagecraft::events::input::MouseButton;
use stagecraft::resources::assets::AssetManifest;
use stagecraft::resources::config::RuntimeConfig;
use stagecraft::resources::inputbridge::{InputBridge, PointerCmd};
use stagecraft::systems::device::Device;

/// Stagecraft scene runtime, headless demo
#[derive(Parser)]
#[command(version, about = "Runs the Stagecraft demo universe on the headless backend.")]
struct Cli {
    /// INI configuration file (default: ./stagecraft.ini).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON asset manifest, overriding the one named in the config.
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Frames to run before shutting down.
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Click (swap contracts) every N frames; 0 disables clicking.
    #[arg(long, default_value_t = 90)]
    swap_every: u64,

    /// Render every universe directly, skipping post-processing.
    #[arg(long)]
    no_postfx: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::with_path(path),
        None => RuntimeConfig::new(),
    };
    if let Err(e) = config.load_from_file() {
        warn!("{e}; using defaults");
    }
    if cli.no_postfx {
        config.postfx_enabled = false;
    }

    let manifest_path = cli.manifest.clone().unwrap_or_else(|| config.manifest_path.clone());
    let manifest = if manifest_path.exists() {
        match AssetManifest::from_path(&manifest_path) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        warn!("manifest {:?} not found; running without assets", manifest_path);
        AssetManifest::new()
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let local = tokio::task::LocalSet::new();
    match local.block_on(&runtime, run(cli, config, with_demo_hooks(manifest))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: RuntimeConfig, manifest: AssetManifest) -> Result<(), RuntimeError> {
    let frame_interval = config.frame_interval();
    let (width, height) = (config.width, config.height);

    let recorder = HeadlessTarget::new(width, height);
    let target: SharedTarget = Rc::new(RefCell::new(recorder.clone()));
    let gpu = Rc::new(HeadlessGpu::new());
    let device = Device::new(config, target, gpu.clone(), manifest);

    let bridge = InputBridge::new();
    let pointer = bridge.sender();
    device.attach_input_bridge(bridge);

    let ids = HandleAllocator::new();
    let scene = HeadlessScene::shared(ids.scene());
    let parts = MainSceneParts {
        camera: ids.camera(),
        boxes: [ids.object(), ids.object(), ids.object()],
    };
    device.define_universe(
        MAIN_UNIVERSE,
        move |slice| main_universe(slice, as_shared(&scene), parts),
        true,
    );

    device.init().await?;

    let clock = device.runtime().clock().clone();
    let mut clicks = 0;
    while clock.stats().frames() < cli.frames {
        tokio::time::sleep(frame_interval).await;
        let frames = clock.stats().frames();
        if cli.swap_every > 0 && frames / cli.swap_every > clicks {
            clicks = frames / cli.swap_every;
            let x = (clicks % 2) as f32 * width as f32 / 2.0 + width as f32 / 4.0;
            // The receiver lives inside the device, so sends cannot fail here.
            let _ = pointer.send(PointerCmd::Move { x, y: height as f32 / 2.0 });
            let _ = pointer.send(PointerCmd::Button { button: MouseButton::Left, pressed: true });
            let _ = pointer.send(PointerCmd::Button { button: MouseButton::Left, pressed: false });
        }
    }

    let stats = clock.stats();
    let draws = recorder.draws();
    if let Some(main) = device.runtime().registry().get_instance(MAIN_UNIVERSE) {
        info!(
            "universe {}: contract {:?}, mounted nodes {:?}",
            main.id(),
            main.current_contract_id(),
            main.graph().mounted_ids()
        );
    }
    info!(
        "{} frames ({:.1} fps), {} draw call(s), {} composed, {} click(s)",
        stats.frames(),
        stats.fps(),
        draws.len(),
        draws.iter().filter(|d| d.composed).count(),
        clicks
    );

    device.dispose().await;
    info!("gpu handles still live after dispose: {}", gpu.live_count());
    Ok(())
}
