//! Error types shared across the engine.
//!
//! - [`GraphError`] – node lookup and node lifecycle failures
//! - [`AssetError`] – manifest lookups and loader failures
//! - [`LifecycleError`] – a mount/unmount hook rejected
//! - [`RenderError`] – backend composition failures
//! - [`ConfigError`] – runtime configuration could not be read or written
//! - [`RuntimeError`] – boot and frame-loop control failures

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::resources::assets::manifest::AssetKind;

/// Boxed error used as the cause of a failed asset load.
pub type LoadCause = Arc<dyn Error + Send + Sync>;

/// Step of a mount/unmount transition in which a hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    BeforeMount,
    OnMounted,
    BeforeUnmount,
    OnUnmounted,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleStage::BeforeMount => "before_mount",
            LifecycleStage::OnMounted => "on_mounted",
            LifecycleStage::BeforeUnmount => "before_unmount",
            LifecycleStage::OnUnmounted => "on_unmounted",
        };
        f.write_str(label)
    }
}

/// A node, pass or universe hook rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} of \"{subject}\" failed: {reason}")]
pub struct LifecycleError {
    /// Id of the node/universe/pass whose hook failed.
    pub subject: String,
    pub stage: LifecycleStage,
    pub reason: String,
}

impl LifecycleError {
    pub fn new(
        stage: LifecycleStage,
        subject: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            subject: subject.into(),
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by [`NodeGraph`](crate::nodes::graph::NodeGraph).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The id was never registered with the graph.
    #[error("node \"{0}\" not found")]
    NotFound(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// One or more members of a batch failed; every sibling still settled.
    #[error("{} node transition(s) failed", .0.len())]
    Batch(Vec<GraphError>),
}

/// Errors raised by [`AssetStore`](crate::resources::assets::store::AssetStore).
#[derive(Debug, Clone, Error)]
pub enum AssetError {
    /// The key has no manifest entry.
    #[error("unknown asset key \"{0}\"")]
    UnknownKey(String),
    /// The loader for the entry failed.
    #[error("failed to load \"{key}\" from \"{src}\": {cause}")]
    Load {
        key: String,
        src: String,
        #[source]
        cause: LoadCause,
    },
    /// `require` was called for a key that is not in the cache.
    #[error("asset \"{0}\" is not loaded")]
    NotLoaded(String),
    /// No loader is registered for the entry's type. The store reports it
    /// as the cause of a [`AssetError::Load`].
    #[error("no loader registered for asset type \"{0}\"")]
    Unsupported(AssetKind),
}

impl AssetError {
    /// Key the error refers to, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            AssetError::UnknownKey(key) | AssetError::NotLoaded(key) => Some(key),
            AssetError::Load { key, .. } => Some(key),
            AssetError::Unsupported(_) => None,
        }
    }
}

/// Backend failure while composing or presenting a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("composer could not be created: {0}")]
    ComposerSetup(String),
    #[error("composer render failed: {0}")]
    ComposerRender(String),
    #[error("unknown composer handle {0}")]
    UnknownComposer(u64),
}

/// Runtime configuration could not be read or written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("failed to save config file {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value for [{section}] {key}: {value}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Failures surfaced by the runtime and device.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("universe \"{0}\" is not defined")]
    UnknownUniverse(String),
    #[error("frame clock must be initialized before starting")]
    ClockNotInitialized,
    #[error("device already disposed")]
    Disposed,
    #[error("boot asset preload failed: {0}")]
    Boot(#[from] AssetError),
}
