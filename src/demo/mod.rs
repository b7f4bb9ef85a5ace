//! Demo content run by the binary: three box nodes in one universe.
//!
//! - [`nodes`] – the boxes and their entry/exit tweens
//! - [`universe`] – the main universe, its contracts and click toggle

pub mod nodes;
pub mod universe;

use crate::resources::assets::AssetManifest;
use crate::resources::assets::loaders::{Asset, ColorSpace, TextureWrap};
use crate::systems::device::GRAIN_TEXTURE_KEY;

/// Grain is tiled across the screen and sampled as raw data.
pub fn with_demo_hooks(manifest: AssetManifest) -> AssetManifest {
    manifest.with_post_process(GRAIN_TEXTURE_KEY, |asset| {
        if let Asset::Texture(texture) = asset {
            texture.wrap = TextureWrap::Repeat;
            texture.color_space = ColorSpace::Linear;
        }
    })
}
