//! Asset manifest, loaders and the keyed asset cache.
//!
//! - [`manifest`] – nested descriptors flattened to dotted keys
//! - [`loaders`] – loaded asset types and the per-type loaders
//! - [`store`] – cache with at most one in-flight load per key

pub mod loaders;
pub mod manifest;
pub mod store;

pub use loaders::{Asset, AssetLoader, LoaderSet};
pub use manifest::{AssetEntry, AssetKind, AssetManifest};
pub use store::AssetStore;
