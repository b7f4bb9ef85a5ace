//! Device boot, asset store sharing and the demo universe end to end.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::LocalSet;

use stagecraft::backend::headless::{
    HandleAllocator, HeadlessGpu, HeadlessScene, HeadlessTarget, as_shared,
};
use stagecraft::backend::{GpuResources, ObjectHandle, RenderTarget, SharedTarget};
use stagecraft::demo::nodes::{NODE_1, NODE_1B, NODE_2};
use stagecraft::demo::universe::{MAIN_UNIVERSE, MainSceneParts, main_universe};
use stagecraft::demo::with_demo_hooks;
use stagecraft::error::RuntimeError;
use stagecraft::events::input::MouseButton;
use stagecraft::nodes::node::{EntryEffect, HookFuture, Node};
use stagecraft::resources::assets::loaders::{LoadFuture, Texture, TextureWrap};
use stagecraft::resources::assets::{
    Asset, AssetEntry, AssetKind, AssetLoader, AssetManifest, AssetStore, LoaderSet,
};
use stagecraft::resources::config::RuntimeConfig;
use stagecraft::systems::device::{Device, GRAIN_TEXTURE_KEY};
use stagecraft::universes::contract::Contract;
use stagecraft::universes::universe::UniverseBuilder;

/// Texture loader that takes a while and counts its calls.
struct SlowTextures {
    gpu: Rc<HeadlessGpu>,
    calls: Rc<Cell<usize>>,
}

impl AssetLoader for SlowTextures {
    fn load(&self, entry: &AssetEntry) -> LoadFuture {
        self.calls.set(self.calls.get() + 1);
        let gpu = self.gpu.clone();
        let src = entry.src.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Asset::Texture(Texture {
                gpu: gpu.allocate(&src),
                byte_len: 0,
                wrap: TextureWrap::default(),
                color_space: Default::default(),
            }))
        }
        .boxed_local()
    }

    fn dispose(&self, asset: &Asset) {
        if let Some(texture) = asset.as_texture() {
            self.gpu.release(texture.gpu);
        }
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn concurrent_loads_share_one_loader_call() {
    let gpu = Rc::new(HeadlessGpu::new());
    let calls = Rc::new(Cell::new(0));
    let manifest =
        AssetManifest::new().with_entry("tex", AssetEntry::new("a.png", AssetKind::Texture));
    let loaders = LoaderSet::new().with(
        AssetKind::Texture,
        SlowTextures {
            gpu: gpu.clone(),
            calls: calls.clone(),
        },
    );
    let store = AssetStore::new(manifest, loaders);

    let (a, b) = tokio::join!(store.load("tex"), store.load("tex"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(calls.get(), 1);
    assert!(!store.is_loading("tex"));

    store.dispose("never-loaded");
    store.dispose("tex");
    store.dispose("tex");
    assert!(!store.has("tex"));
    assert_eq!(gpu.live_count(), 0);
}

struct Booted {
    device: Device,
    gpu: Rc<HeadlessGpu>,
    recorder: HeadlessTarget,
    _dir: tempfile::TempDir,
}

fn boot_fixture(with_grain_file: bool) -> Booted {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("postfx")).unwrap();
    if with_grain_file {
        std::fs::write(dir.path().join("postfx/grain.png"), [0u8; 64]).unwrap();
    }
    let manifest = with_demo_hooks(
        AssetManifest::from_json(
            r#"{"postfx": {"grainTexture": {"src": "postfx/grain.png", "type": "texture", "group": "boot"}}}"#,
        )
        .unwrap(),
    );

    let mut config = RuntimeConfig::new();
    config.width = 400;
    config.height = 300;
    config.pixel_ratio = 2.0;
    config.asset_root = dir.path().to_path_buf();

    let recorder = HeadlessTarget::new(1, 1);
    let target: SharedTarget = Rc::new(RefCell::new(recorder.clone()));
    let gpu = Rc::new(HeadlessGpu::new());
    let device = Device::new(config, target, gpu.clone(), manifest);

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
    Booted {
        device,
        gpu,
        recorder,
        _dir: dir,
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn boot_runs_the_demo_and_click_swaps_contracts() {
    LocalSet::new()
        .run_until(async {
            let booted = boot_fixture(true);
            let device = &booted.device;
            device.init().await.unwrap();

            assert_eq!(booted.recorder.size(), (800, 600));
            let grain = device.assets().require(GRAIN_TEXTURE_KEY).unwrap();
            assert_eq!(grain.as_texture().unwrap().wrap, TextureWrap::Repeat);

            let main = device.runtime().registry().get_instance(MAIN_UNIVERSE).unwrap();
            assert!(main.active());
            assert!(main.mounted());
            assert!(device.runtime().clock().is_running());

            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(main.current_contract_id().as_deref(), Some(NODE_1));
            assert_eq!(main.graph().mounted_ids(), vec![NODE_1.to_string(), NODE_1B.to_string()]);
            assert!(device.runtime().clock().stats().frames() > 0);
            assert!(booted.recorder.draws().iter().any(|d| d.composed));

            let input = device.runtime().input();
            input.set_mouse_button(MouseButton::Left, true);
            input.set_mouse_button(MouseButton::Left, false);
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(main.current_contract_id().as_deref(), Some(NODE_2));
            assert_eq!(main.graph().mounted_ids(), vec![NODE_1B.to_string(), NODE_2.to_string()]);

            device.dispose().await;
            device.dispose().await;
            assert!(device.is_disposed());
            assert!(!device.runtime().clock().is_running());
            assert_eq!(booted.gpu.live_count(), 0);
            assert!(matches!(device.init().await, Err(RuntimeError::Disposed)));
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn boot_fails_when_a_boot_asset_is_missing() {
    LocalSet::new()
        .run_until(async {
            let booted = boot_fixture(false);
            let result = booted.device.init().await;
            assert!(matches!(result, Err(RuntimeError::Boot(_))));
            assert!(!booted.device.runtime().clock().is_running());
        })
        .await;
}

/// Node whose setup takes a while, logging how far it got.
struct SlowSetup {
    object: ObjectHandle,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Node for SlowSetup {
    fn id(&self) -> &str {
        "n"
    }

    fn renderable(&self) -> Option<ObjectHandle> {
        Some(self.object)
    }

    fn before_mount(&mut self) -> HookFuture {
        let log = self.log.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            log.borrow_mut().push("setup done");
            Ok(())
        }
        .boxed_local()
    }

    fn on_mounted(&mut self) -> Option<EntryEffect> {
        self.log.borrow_mut().push("mounted");
        None
    }

    fn dispose(&mut self) {
        self.log.borrow_mut().push("disposed");
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dispose_stops_a_contract_still_mounting() {
    LocalSet::new()
        .run_until(async {
            let recorder = HeadlessTarget::new(1, 1);
            let target: SharedTarget = Rc::new(RefCell::new(recorder));
            let gpu = Rc::new(HeadlessGpu::new());
            let device = Device::new(RuntimeConfig::new(), target, gpu, AssetManifest::new());

            let ids = HandleAllocator::new();
            let scene = HeadlessScene::shared(ids.scene());
            let camera = ids.camera();
            let object = ids.object();
            let log = Rc::new(RefCell::new(Vec::new()));
            let (factory_scene, factory_log) = (scene.clone(), log.clone());
            device.define_universe(
                "main",
                move |_| {
                    let universe = UniverseBuilder::new("main", as_shared(&factory_scene), camera)
                        .contract(Contract::new("c", ["n"]))
                        .initial_contract("c")
                        .build();
                    universe.graph().add(Box::new(SlowSetup {
                        object,
                        log: factory_log.clone(),
                    }));
                    universe
                },
                true,
            );

            device.runtime().activate_universe("main").await.unwrap();
            tokio::task::yield_now().await;
            device.dispose().await;
            assert_eq!(*log.borrow(), vec!["disposed"]);

            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(!log.borrow().contains(&"mounted"));
            assert!(!scene.borrow().contains(object));
        })
        .await;
}
