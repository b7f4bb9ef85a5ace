//! Loaded asset types and the per-type loaders that produce them.
//!
//! Every loader implements [`AssetLoader`]: an asynchronous `load` for one
//! manifest entry and a synchronous `dispose` that tears the result down
//! (releasing GPU handles, stopping video playback). [`LoaderSet`] maps each
//! [`AssetKind`] to its loader; [`LoaderSet::filesystem`] registers the
//! built-in loaders reading from a directory with `tokio::fs`.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use smallvec::SmallVec;

use crate::backend::{GpuHandle, GpuResources};
use crate::error::LoadCause;
use crate::resources::assets::manifest::{AssetEntry, AssetKind, VideoOptions, VideoPreload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureWrap {
    #[default]
    Clamp,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Srgb,
    /// Raw data, no color conversion (noise, normal maps).
    Linear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub gpu: GpuHandle,
    pub byte_len: usize,
    pub wrap: TextureWrap,
    pub color_space: ColorSpace,
}

/// One node of a loaded model tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub name: String,
    pub geometry: Option<GpuHandle>,
    pub materials: SmallVec<[GpuHandle; 2]>,
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    /// Visit this node and every descendant, depth first.
    pub fn traverse(&self, visit: &mut impl FnMut(&ModelNode)) {
        visit(self);
        for child in &self.children {
            child.traverse(visit);
        }
    }

    /// Every GPU handle owned by the subtree.
    pub fn gpu_handles(&self) -> Vec<GpuHandle> {
        let mut handles = Vec::new();
        self.traverse(&mut |node| {
            handles.extend(node.geometry);
            handles.extend(node.materials.iter().copied());
        });
        handles
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub data: Vec<u8>,
}

/// Video player bound to a streaming texture.
#[derive(Debug)]
pub struct Video {
    pub texture: GpuHandle,
    pub options: VideoOptions,
    playing: Cell<bool>,
    source: RefCell<Option<String>>,
    attached: Cell<bool>,
}

impl Video {
    fn new(texture: GpuHandle, src: String, options: VideoOptions) -> Self {
        Self {
            texture,
            playing: Cell::new(false),
            source: RefCell::new(Some(src)),
            attached: Cell::new(options.attach),
            options,
        }
    }

    pub fn play(&self) {
        if self.source.borrow().is_some() {
            self.playing.set(true);
        }
    }

    pub fn pause(&self) {
        self.playing.set(false);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn source(&self) -> Option<String> {
        self.source.borrow().clone()
    }

    /// Drop the source so the player releases its buffers.
    pub fn detach_source(&self) {
        self.source.borrow_mut().take();
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    /// Remove the player from the presentation surface.
    pub fn remove(&self) {
        self.attached.set(false);
    }
}

/// A decoded resource held by the store.
#[derive(Debug)]
pub enum Asset {
    Texture(Texture),
    Model(ModelNode),
    Json(serde_json::Value),
    Audio(AudioClip),
    Video(Video),
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Texture(_) => AssetKind::Texture,
            Asset::Model(_) => AssetKind::Model,
            Asset::Json(_) => AssetKind::Json,
            Asset::Audio(_) => AssetKind::Audio,
            Asset::Video(_) => AssetKind::Video,
        }
    }

    pub fn as_texture(&self) -> Option<&Texture> {
        match self {
            Asset::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelNode> {
        match self {
            Asset::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Asset::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&Video> {
        match self {
            Asset::Video(video) => Some(video),
            _ => None,
        }
    }
}

pub type LoadFuture = LocalBoxFuture<'static, Result<Asset, LoadCause>>;

/// Loads and tears down one kind of asset.
pub trait AssetLoader {
    fn load(&self, entry: &AssetEntry) -> LoadFuture;
    fn dispose(&self, asset: &Asset);
}

/// Loader per asset kind.
#[derive(Clone, Default)]
pub struct LoaderSet {
    loaders: FxHashMap<AssetKind, Rc<dyn AssetLoader>>,
}

impl LoaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: AssetKind, loader: Rc<dyn AssetLoader>) {
        self.loaders.insert(kind, loader);
    }

    pub fn with(mut self, kind: AssetKind, loader: impl AssetLoader + 'static) -> Self {
        self.register(kind, Rc::new(loader));
        self
    }

    pub fn get(&self, kind: AssetKind) -> Option<Rc<dyn AssetLoader>> {
        self.loaders.get(&kind).cloned()
    }

    /// Built-in loaders reading files under `root`.
    pub fn filesystem(root: impl Into<PathBuf>, gpu: Rc<dyn GpuResources>) -> Self {
        let fs = FsLoader {
            root: root.into(),
            gpu,
        };
        Self::new()
            .with(AssetKind::Texture, TextureLoader(fs.clone()))
            .with(AssetKind::Model, ModelLoader(fs.clone()))
            .with(AssetKind::Json, JsonLoader(fs.clone()))
            .with(AssetKind::Audio, AudioLoader(fs.clone()))
            .with(AssetKind::Video, VideoLoader(fs))
    }
}

/// Shared state of the filesystem loaders.
#[derive(Clone)]
struct FsLoader {
    root: PathBuf,
    gpu: Rc<dyn GpuResources>,
}

impl FsLoader {
    fn path(&self, src: &str) -> PathBuf {
        self.root.join(src.trim_start_matches('/'))
    }

    fn read(&self, src: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadCause>> {
        let path = self.path(src);
        async move {
            trace!("reading {:?}", path);
            tokio::fs::read(&path).await.map_err(|e| Arc::new(e) as LoadCause)
        }
        .boxed_local()
    }
}

struct TextureLoader(FsLoader);

impl AssetLoader for TextureLoader {
    fn load(&self, entry: &AssetEntry) -> LoadFuture {
        let read = self.0.read(&entry.src);
        let gpu = self.0.gpu.clone();
        let label = entry.src.clone();
        async move {
            let bytes = read.await?;
            Ok(Asset::Texture(Texture {
                gpu: gpu.allocate(&label),
                byte_len: bytes.len(),
                wrap: TextureWrap::default(),
                color_space: ColorSpace::default(),
            }))
        }
        .boxed_local()
    }

    fn dispose(&self, asset: &Asset) {
        if let Some(texture) = asset.as_texture() {
            self.0.gpu.release(texture.gpu);
        }
    }
}

/// On-disk model description: a node tree naming which nodes carry
/// geometry and how many materials each uses.
#[derive(Debug, Deserialize)]
struct ModelDescription {
    name: String,
    #[serde(default)]
    geometry: bool,
    #[serde(default)]
    materials: u32,
    #[serde(default)]
    children: Vec<ModelDescription>,
}

impl ModelDescription {
    fn build(self, gpu: &dyn GpuResources) -> ModelNode {
        let geometry = self
            .geometry
            .then(|| gpu.allocate(&format!("{}/geometry", self.name)));
        let materials = (0..self.materials)
            .map(|i| gpu.allocate(&format!("{}/material{}", self.name, i)))
            .collect();
        let children = self.children.into_iter().map(|c| c.build(gpu)).collect();
        ModelNode {
            name: self.name,
            geometry,
            materials,
            children,
        }
    }
}

struct ModelLoader(FsLoader);

impl AssetLoader for ModelLoader {
    fn load(&self, entry: &AssetEntry) -> LoadFuture {
        let read = self.0.read(&entry.src);
        let gpu = self.0.gpu.clone();
        async move {
            let bytes = read.await?;
            let description: ModelDescription =
                serde_json::from_slice(&bytes).map_err(|e| Arc::new(e) as LoadCause)?;
            Ok(Asset::Model(description.build(gpu.as_ref())))
        }
        .boxed_local()
    }

    fn dispose(&self, asset: &Asset) {
        if let Some(model) = asset.as_model() {
            let handles = model.gpu_handles();
            debug!("releasing {} handle(s) of model {}", handles.len(), model.name);
            for handle in handles {
                self.0.gpu.release(handle);
            }
        }
    }
}

struct JsonLoader(FsLoader);

impl AssetLoader for JsonLoader {
    fn load(&self, entry: &AssetEntry) -> LoadFuture {
        let read = self.0.read(&entry.src);
        async move {
            let bytes = read.await?;
            let value = serde_json::from_slice(&bytes).map_err(|e| Arc::new(e) as LoadCause)?;
            Ok(Asset::Json(value))
        }
        .boxed_local()
    }

    fn dispose(&self, _asset: &Asset) {}
}

struct AudioLoader(FsLoader);

impl AssetLoader for AudioLoader {
    fn load(&self, entry: &AssetEntry) -> LoadFuture {
        let read = self.0.read(&entry.src);
        async move { Ok(Asset::Audio(AudioClip { data: read.await? })) }.boxed_local()
    }

    fn dispose(&self, _asset: &Asset) {}
}

struct VideoLoader(FsLoader);

impl AssetLoader for VideoLoader {
    fn load(&self, entry: &AssetEntry) -> LoadFuture {
        let options = entry.video.clone().unwrap_or_default();
        let path = self.0.path(&entry.src);
        let gpu = self.0.gpu.clone();
        let src = entry.src.clone();
        async move {
            if options.preload != VideoPreload::None {
                tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| Arc::new(e) as LoadCause)?;
            }
            let video = Video::new(gpu.allocate(&src), src, options);
            if video.options.autoplay {
                video.play();
            }
            Ok(Asset::Video(video))
        }
        .boxed_local()
    }

    fn dispose(&self, asset: &Asset) {
        if let Some(video) = asset.as_video() {
            self.0.gpu.release(video.texture);
            video.pause();
            video.detach_source();
            if video.is_attached() {
                video.remove();
            }
        }
    }
}
