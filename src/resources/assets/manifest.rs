//! Asset manifest: static descriptors keyed by dotted path.
//!
//! A manifest is a nested JSON object. Any object carrying both `src` and
//! `type` is an entry; every other object is a namespace whose name becomes a
//! key segment:
//!
//! ```json
//! {
//!   "postfx": {
//!     "grainTexture": { "src": "postfx/grain.webp", "type": "texture", "group": "boot" }
//!   },
//!   "ui": { "logo": { "src": "ui/logo.png", "type": "texture", "group": "ui", "lazy": true } }
//! }
//! ```
//!
//! flattens to `postfx.grainTexture` and `ui.logo`. Post-load hooks cannot be
//! expressed in JSON and are attached with [`AssetManifest::with_post_process`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::resources::assets::loaders::Asset;

/// Type tag selecting the loader for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Texture,
    /// 3D model; `gltf` is accepted as an alias.
    #[serde(alias = "gltf")]
    Model,
    Json,
    Audio,
    Video,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Texture => "texture",
            AssetKind::Model => "model",
            AssetKind::Json => "json",
            AssetKind::Audio => "audio",
            AssetKind::Video => "video",
        };
        f.write_str(name)
    }
}

/// How much of a video to fetch before the load resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPreload {
    /// Resolve immediately without touching the source.
    None,
    #[default]
    Metadata,
    Auto,
}

fn default_true() -> bool {
    true
}

/// Playback options for `video` entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptions {
    #[serde(default)]
    pub autoplay: bool,
    /// Keep the player attached to the presentation surface.
    #[serde(default, alias = "attachToDom")]
    pub attach: bool,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    #[serde(default = "default_true")]
    pub muted: bool,
    #[serde(default)]
    pub preload: VideoPreload,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            autoplay: false,
            attach: false,
            looping: false,
            muted: true,
            preload: VideoPreload::Metadata,
        }
    }
}

/// Hook run on a freshly loaded asset before it is cached.
#[derive(Clone)]
pub struct PostProcess(Rc<dyn Fn(&mut Asset)>);

impl PostProcess {
    pub fn new(hook: impl Fn(&mut Asset) + 'static) -> Self {
        Self(Rc::new(hook))
    }

    pub fn apply(&self, asset: &mut Asset) {
        (self.0)(asset)
    }
}

impl fmt::Debug for PostProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PostProcess(..)")
    }
}

/// Static descriptor of one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    /// Source locator, relative to the loader's root.
    pub src: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    #[serde(default)]
    pub group: Option<String>,
    /// Skipped by group preloads unless lazy entries are included.
    #[serde(default)]
    pub lazy: bool,
    #[serde(default)]
    pub video: Option<VideoOptions>,
    #[serde(skip)]
    pub post_process: Option<PostProcess>,
}

impl AssetEntry {
    pub fn new(src: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            src: src.into(),
            kind,
            group: None,
            lazy: false,
            video: None,
            post_process: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_video(mut self, options: VideoOptions) -> Self {
        self.video = Some(options);
        self
    }

    pub fn belongs_to(&self, group: &str) -> bool {
        self.group.as_deref() == Some(group)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestNode {
    Entry(AssetEntry),
    Namespace(BTreeMap<String, ManifestNode>),
}

fn flatten(
    prefix: &str,
    nodes: BTreeMap<String, ManifestNode>,
    out: &mut FxHashMap<String, AssetEntry>,
) {
    for (name, node) in nodes {
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}.{name}")
        };
        match node {
            ManifestNode::Entry(entry) => {
                out.insert(key, entry);
            }
            ManifestNode::Namespace(children) => flatten(&key, children, out),
        }
    }
}

/// Flattened manifest: dotted key to entry.
#[derive(Debug, Clone, Default)]
pub struct AssetManifest {
    entries: FxHashMap<String, AssetEntry>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and flatten a nested JSON manifest.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let root: BTreeMap<String, ManifestNode> = serde_json::from_str(json)?;
        let mut entries = FxHashMap::default();
        flatten("", root, &mut entries);
        Ok(Self { entries })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Add or replace the entry at `key`.
    pub fn insert(&mut self, key: impl Into<String>, entry: AssetEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn with_entry(mut self, key: impl Into<String>, entry: AssetEntry) -> Self {
        self.insert(key, entry);
        self
    }

    /// Attach a post-load hook to `key`. Unknown keys are left untouched.
    pub fn with_post_process(mut self, key: &str, hook: impl Fn(&mut Asset) + 'static) -> Self {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.post_process = Some(PostProcess::new(hook));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&AssetEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "ui": { "logo": { "src": "ui/logo.png", "type": "texture", "group": "ui", "lazy": true } },
        "postfx": {
            "grainTexture": { "src": "postfx/grain.webp", "type": "texture", "group": "boot" }
        },
        "models": { "ship": { "src": "ship.json", "type": "gltf" } },
        "intro": {
            "src": "intro.mp4",
            "type": "video",
            "video": { "autoplay": true, "attachToDom": true, "loop": true }
        }
    }"#;

    #[test]
    fn nested_objects_flatten_to_dotted_keys() {
        let manifest = AssetManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.len(), 4);
        let grain = manifest.get("postfx.grainTexture").unwrap();
        assert_eq!(grain.kind, AssetKind::Texture);
        assert!(grain.belongs_to("boot"));
        assert!(manifest.get("ui.logo").unwrap().lazy);
        assert_eq!(manifest.get("models.ship").unwrap().kind, AssetKind::Model);
    }

    #[test]
    fn video_options_fill_defaults() {
        let manifest = AssetManifest::from_json(MANIFEST).unwrap();
        let video = manifest.get("intro").unwrap().video.clone().unwrap();
        assert!(video.autoplay && video.attach && video.looping && video.muted);
        assert_eq!(video.preload, VideoPreload::Metadata);
    }

    #[test]
    fn post_process_attaches_only_to_known_keys() {
        let manifest = AssetManifest::from_json(MANIFEST)
            .unwrap()
            .with_post_process("postfx.grainTexture", |_| {})
            .with_post_process("missing", |_| {});
        assert!(manifest.get("postfx.grainTexture").unwrap().post_process.is_some());
        assert!(manifest.get("missing").is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(AssetManifest::from_json(r#"{"a": {"src": "x", "type": "mesh"}}"#).is_err());
    }
}
