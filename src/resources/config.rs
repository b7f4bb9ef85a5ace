//! Runtime configuration.
//!
//! Settings loaded from an INI configuration file. Every field has a safe
//! default so the runtime can boot without a file.
//!
//! # Configuration File Format
//!
//! ```ini
//! [render]
//! width = 1280
//! height = 720
//! pixel_ratio = 1.0
//!
//! [loop]
//! target_fps = 60
//!
//! [postfx]
//! enabled = true
//! quality = medium
//!
//! [assets]
//! manifest = ./assets/manifest.json
//! root = ./assets
//! ```

use std::path::PathBuf;

use configparser::ini::Ini;
use log::info;

use crate::error::ConfigError;
use crate::pipeline::postfx::PostFxQuality;

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_PIXEL_RATIO: f32 = 1.0;
const DEFAULT_TARGET_FPS: u32 = 60;
const DEFAULT_POSTFX_ENABLED: bool = true;
const DEFAULT_MANIFEST_PATH: &str = "./assets/manifest.json";
const DEFAULT_ASSET_ROOT: &str = "./assets";
const DEFAULT_CONFIG_PATH: &str = "./stagecraft.ini";

/// Upper bound applied to the device pixel ratio.
pub const MAX_PIXEL_RATIO: f32 = 2.0;

/// Settings read by the device at boot.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Drawing buffer width in pixels.
    pub width: u32,
    /// Drawing buffer height in pixels.
    pub height: u32,
    /// Device pixel ratio, clamped to [`MAX_PIXEL_RATIO`].
    pub pixel_ratio: f32,
    /// Frame clock rate.
    pub target_fps: u32,
    /// Route the primary universe through the post-processing pass.
    pub postfx_enabled: bool,
    pub postfx_quality: PostFxQuality,
    /// Nested JSON asset manifest.
    pub manifest_path: PathBuf,
    /// Directory asset `src` paths are resolved against.
    pub asset_root: PathBuf,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfig {
    /// Create a new configuration with safe default values.
    pub fn new() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            pixel_ratio: DEFAULT_PIXEL_RATIO,
            target_fps: DEFAULT_TARGET_FPS,
            postfx_enabled: DEFAULT_POSTFX_ENABLED,
            postfx_quality: PostFxQuality::default(),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            asset_root: PathBuf::from(DEFAULT_ASSET_ROOT),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a new configuration with a custom config file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Load configuration from the INI file.
    ///
    /// Missing values retain their current (default) values.
    pub fn load_from_file(&mut self) -> Result<(), ConfigError> {
        let mut config = Ini::new();
        config
            .load(&self.config_path)
            .map_err(|reason| ConfigError::Load {
                path: self.config_path.display().to_string(),
                reason,
            })?;

        // [render] section
        if let Some(width) = config.getuint("render", "width").ok().flatten() {
            self.width = width as u32;
        }
        if let Some(height) = config.getuint("render", "height").ok().flatten() {
            self.height = height as u32;
        }
        if let Some(ratio) = config.getfloat("render", "pixel_ratio").ok().flatten() {
            self.pixel_ratio = (ratio as f32).clamp(0.5, MAX_PIXEL_RATIO);
        }

        // [loop] section
        if let Some(fps) = config.getuint("loop", "target_fps").ok().flatten() {
            if fps == 0 {
                return Err(ConfigError::Invalid {
                    section: "loop",
                    key: "target_fps",
                    value: fps.to_string(),
                });
            }
            self.target_fps = fps as u32;
        }

        // [postfx] section
        if let Some(enabled) = config.getbool("postfx", "enabled").ok().flatten() {
            self.postfx_enabled = enabled;
        }
        if let Some(quality) = config.get("postfx", "quality") {
            self.postfx_quality = quality.parse().map_err(|_| ConfigError::Invalid {
                section: "postfx",
                key: "quality",
                value: quality.clone(),
            })?;
        }

        // [assets] section
        if let Some(manifest) = config.get("assets", "manifest") {
            self.manifest_path = PathBuf::from(manifest);
        }
        if let Some(root) = config.get("assets", "root") {
            self.asset_root = PathBuf::from(root);
        }

        info!(
            "Loaded config: {}x{} @{}x, fps={}, postfx={} ({}), manifest={:?}",
            self.width,
            self.height,
            self.pixel_ratio,
            self.target_fps,
            self.postfx_enabled,
            self.postfx_quality,
            self.manifest_path
        );

        Ok(())
    }

    /// Save configuration to the INI file.
    ///
    /// Creates the file if it doesn't exist.
    pub fn save_to_file(&self) -> Result<(), ConfigError> {
        let mut config = Ini::new();

        config.set("render", "width", Some(self.width.to_string()));
        config.set("render", "height", Some(self.height.to_string()));
        config.set("render", "pixel_ratio", Some(self.pixel_ratio.to_string()));
        config.set("loop", "target_fps", Some(self.target_fps.to_string()));
        config.set("postfx", "enabled", Some(self.postfx_enabled.to_string()));
        config.set("postfx", "quality", Some(self.postfx_quality.to_string()));
        config.set(
            "assets",
            "manifest",
            Some(self.manifest_path.display().to_string()),
        );
        config.set("assets", "root", Some(self.asset_root.display().to_string()));

        config
            .write(&self.config_path)
            .map_err(|source| ConfigError::Save {
                path: self.config_path.display().to_string(),
                source,
            })?;

        info!("Saved config to {:?}", self.config_path);

        Ok(())
    }

    /// Frame period derived from `target_fps`.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }
}
