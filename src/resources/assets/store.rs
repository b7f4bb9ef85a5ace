//! Keyed asset cache with at most one in-flight load per key.
//!
//! A key is always in exactly one of three states: absent, in flight, or
//! cached. Concurrent [`AssetStore::load`] calls for an in-flight key await
//! the same shared future, so the loader runs once and every caller receives
//! the same `Rc<Asset>`. The in-flight marker is cleared whether the load
//! succeeds or fails.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Shared, join_all};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::error::{AssetError, LoadCause};
use crate::resources::assets::loaders::{Asset, LoaderSet};
use crate::resources::assets::manifest::AssetManifest;

type SharedLoad = Shared<LocalBoxFuture<'static, Result<Rc<Asset>, AssetError>>>;

struct StoreInner {
    manifest: AssetManifest,
    loaders: LoaderSet,
    cache: RefCell<FxHashMap<String, Rc<Asset>>>,
    inflight: RefCell<FxHashMap<String, SharedLoad>>,
}

/// Cloneable handle to one asset cache.
#[derive(Clone)]
pub struct AssetStore {
    inner: Rc<StoreInner>,
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStore")
            .field("entries", &self.inner.manifest.len())
            .field("cached", &self.inner.cache.borrow().len())
            .field("inflight", &self.inner.inflight.borrow().len())
            .finish()
    }
}

impl AssetStore {
    pub fn new(manifest: AssetManifest, loaders: LoaderSet) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                manifest,
                loaders,
                cache: RefCell::new(FxHashMap::default()),
                inflight: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    /// Whether `key` is cached.
    pub fn has(&self, key: &str) -> bool {
        self.inner.cache.borrow().contains_key(key)
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.inner.inflight.borrow().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Rc<Asset>> {
        self.inner.cache.borrow().get(key).cloned()
    }

    /// Cached asset, or [`AssetError::NotLoaded`].
    pub fn require(&self, key: &str) -> Result<Rc<Asset>, AssetError> {
        self.get(key)
            .ok_or_else(|| AssetError::NotLoaded(key.to_string()))
    }

    /// Every key in the manifest, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .manifest
            .iter()
            .map(|(k, _)| k.to_string())
            .collect();
        keys.sort();
        keys
    }

    /// Load `key`, reusing the cached value or the in-flight load.
    pub async fn load(&self, key: &str) -> Result<Rc<Asset>, AssetError> {
        if let Some(asset) = self.get(key) {
            return Ok(asset);
        }
        let existing = self.inner.inflight.borrow().get(key).cloned();
        if let Some(pending) = existing {
            return pending.await;
        }

        let entry = self
            .inner
            .manifest
            .get(key)
            .cloned()
            .ok_or_else(|| AssetError::UnknownKey(key.to_string()))?;
        let Some(loader) = self.inner.loaders.get(entry.kind) else {
            let cause: LoadCause = Arc::new(AssetError::Unsupported(entry.kind));
            return Err(AssetError::Load {
                key: key.to_string(),
                src: entry.src,
                cause,
            });
        };

        debug!("loading asset {} from {}", key, entry.src);
        let loading = loader.load(&entry);
        let store: Weak<StoreInner> = Rc::downgrade(&self.inner);
        let owned_key = key.to_string();
        let task = async move {
            let result = match loading.await {
                Ok(mut asset) => {
                    if let Some(hook) = &entry.post_process {
                        hook.apply(&mut asset);
                    }
                    Ok(Rc::new(asset))
                }
                Err(cause) => Err(AssetError::Load {
                    key: owned_key.clone(),
                    src: entry.src.clone(),
                    cause,
                }),
            };
            if let Some(store) = store.upgrade() {
                if let Ok(asset) = &result {
                    store.cache.borrow_mut().insert(owned_key.clone(), asset.clone());
                }
                store.inflight.borrow_mut().remove(&owned_key);
            }
            result
        }
        .boxed_local()
        .shared();

        self.inner
            .inflight
            .borrow_mut()
            .insert(key.to_string(), task.clone());
        task.await
    }

    /// Load every entry of `group` concurrently. Lazy entries are skipped
    /// unless `include_lazy` is set. Every load settles before the first
    /// failure is returned.
    pub async fn preload_group(&self, group: &str, include_lazy: bool) -> Result<(), AssetError> {
        let keys: Vec<String> = self
            .inner
            .manifest
            .iter()
            .filter(|(_, entry)| entry.belongs_to(group) && (include_lazy || !entry.lazy))
            .map(|(key, _)| key.to_string())
            .collect();
        info!("preloading {} asset(s) of group {}", keys.len(), group);

        let results = join_all(keys.iter().map(|key| self.load(key))).await;
        let mut first_error = None;
        for result in results {
            if let Err(err) = result {
                warn!("{}", err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Tear down and evict `key`. No-op when it is not cached.
    pub fn dispose(&self, key: &str) {
        let Some(asset) = self.inner.cache.borrow_mut().remove(key) else {
            return;
        };
        let loader = self
            .inner
            .manifest
            .get(key)
            .and_then(|entry| self.inner.loaders.get(entry.kind));
        if let Some(loader) = loader {
            loader.dispose(&asset);
        }
        debug!("disposed asset {}", key);
    }

    pub fn dispose_group(&self, group: &str) {
        let keys: Vec<String> = self
            .inner
            .manifest
            .iter()
            .filter(|(_, entry)| entry.belongs_to(group))
            .map(|(key, _)| key.to_string())
            .collect();
        for key in keys {
            self.dispose(&key);
        }
    }

    pub fn dispose_all(&self) {
        let keys: Vec<String> = self.inner.cache.borrow().keys().cloned().collect();
        for key in keys {
            self.dispose(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuHandle;
    use crate::resources::assets::loaders::{AssetLoader, LoadFuture, Texture, TextureWrap};
    use crate::resources::assets::manifest::{AssetEntry, AssetKind};
    use std::cell::Cell;
    use tokio::sync::Notify;

    /// Loader that counts calls and resolves once `gate` is notified.
    struct GatedLoader {
        calls: Rc<Cell<usize>>,
        disposed: Rc<Cell<usize>>,
        gate: Rc<Notify>,
        fail: bool,
    }

    impl AssetLoader for GatedLoader {
        fn load(&self, _entry: &AssetEntry) -> LoadFuture {
            self.calls.set(self.calls.get() + 1);
            let gate = self.gate.clone();
            let fail = self.fail;
            async move {
                gate.notified().await;
                if fail {
                    let cause: LoadCause =
                        Arc::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
                    return Err(cause);
                }
                Ok(Asset::Texture(Texture {
                    gpu: GpuHandle(7),
                    byte_len: 4,
                    wrap: TextureWrap::Clamp,
                    color_space: Default::default(),
                }))
            }
            .boxed_local()
        }

        fn dispose(&self, _asset: &Asset) {
            self.disposed.set(self.disposed.get() + 1);
        }
    }

    struct Harness {
        store: AssetStore,
        calls: Rc<Cell<usize>>,
        disposed: Rc<Cell<usize>>,
        gate: Rc<Notify>,
    }

    fn harness(manifest: AssetManifest, fail: bool) -> Harness {
        let calls = Rc::new(Cell::new(0));
        let disposed = Rc::new(Cell::new(0));
        let gate = Rc::new(Notify::new());
        let loaders = LoaderSet::new().with(
            AssetKind::Texture,
            GatedLoader {
                calls: calls.clone(),
                disposed: disposed.clone(),
                gate: gate.clone(),
                fail,
            },
        );
        Harness {
            store: AssetStore::new(manifest, loaders),
            calls,
            disposed,
            gate,
        }
    }

    fn tex_manifest() -> AssetManifest {
        AssetManifest::from_json(r#"{"tex": {"src": "a.png", "type": "texture"}}"#).unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_loads_share_one_loader_call() {
        let h = harness(tex_manifest(), false);
        let first = h.store.load("tex");
        let second = h.store.load("tex");
        let gate = h.gate.clone();
        let release = async move {
            tokio::task::yield_now().await;
            gate.notify_waiters();
        };
        let (a, b, ()) = tokio::join!(first, second, release);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(h.calls.get(), 1);
        assert!(h.store.has("tex"));
        assert!(!h.store.is_loading("tex"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cached_load_skips_loader() {
        let h = harness(tex_manifest(), false);
        h.gate.notify_one();
        let a = h.store.load("tex").await.unwrap();
        let b = h.store.load("tex").await.unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(h.calls.get(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_load_clears_inflight_and_wraps_cause() {
        let h = harness(tex_manifest(), true);
        h.gate.notify_one();
        match h.store.load("tex").await {
            Err(AssetError::Load { key, src, .. }) => {
                assert_eq!(key, "tex");
                assert_eq!(src, "a.png");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(!h.store.is_loading("tex"));
        assert!(!h.store.has("tex"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_key_and_unsupported_kind() {
        let manifest =
            tex_manifest().with_entry("data", AssetEntry::new("d.json", AssetKind::Json));
        let h = harness(manifest, false);
        assert!(matches!(
            h.store.load("missing").await,
            Err(AssetError::UnknownKey(_))
        ));
        match h.store.load("data").await {
            Err(AssetError::Load { key, src, cause }) => {
                assert_eq!(key, "data");
                assert_eq!(src, "d.json");
                assert!(matches!(
                    cause.downcast_ref::<AssetError>(),
                    Some(AssetError::Unsupported(AssetKind::Json))
                ));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(!h.store.is_loading("data"));
        assert_eq!(h.calls.get(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn post_process_runs_before_caching() {
        let h = harness(
            tex_manifest().with_post_process("tex", |asset| {
                if let Asset::Texture(texture) = asset {
                    texture.wrap = TextureWrap::Repeat;
                }
            }),
            false,
        );
        h.gate.notify_one();
        h.store.load("tex").await.unwrap();
        let cached = h.store.require("tex").unwrap();
        assert_eq!(cached.as_texture().unwrap().wrap, TextureWrap::Repeat);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn preload_group_skips_lazy_entries() {
        let manifest = AssetManifest::new()
            .with_entry("boot.a", AssetEntry::new("a.png", AssetKind::Texture).in_group("boot"))
            .with_entry(
                "boot.b",
                AssetEntry::new("b.png", AssetKind::Texture).in_group("boot").lazy(),
            )
            .with_entry("other", AssetEntry::new("c.png", AssetKind::Texture));
        let h = harness(manifest, false);
        // Permit stored before the single load waits on it.
        h.gate.notify_one();
        h.store.preload_group("boot", false).await.unwrap();
        assert!(h.store.has("boot.a"));
        assert!(!h.store.has("boot.b"));
        assert!(!h.store.has("other"));
        assert_eq!(h.calls.get(), 1);
    }

    #[test]
    fn dispose_of_unloaded_key_is_a_noop() {
        let h = harness(tex_manifest(), false);
        h.store.dispose("tex");
        h.store.dispose("never-declared");
        assert_eq!(h.disposed.get(), 0);
        assert!(matches!(h.store.require("tex"), Err(AssetError::NotLoaded(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dispose_all_tears_down_every_cached_asset() {
        let manifest = AssetManifest::new()
            .with_entry("a", AssetEntry::new("a.png", AssetKind::Texture).in_group("g"))
            .with_entry("b", AssetEntry::new("b.png", AssetKind::Texture));
        let h = harness(manifest, false);
        h.gate.notify_one();
        h.store.load("a").await.unwrap();
        h.gate.notify_one();
        h.store.load("b").await.unwrap();

        h.store.dispose_group("g");
        assert!(!h.store.has("a") && h.store.has("b"));
        h.store.dispose_all();
        assert!(!h.store.has("b"));
        assert_eq!(h.disposed.get(), 2);
    }
}
