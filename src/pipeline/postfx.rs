//! Post-processing: bloom plus a final grain/vignette effect.
//!
//! [`PostProcessingPass`] lazily asks the render target for a composer the
//! first time it renders a (scene, camera) pair and rebuilds it whenever the
//! pair changes. Any composer failure is logged, the composer is dropped and
//! the frame falls back to a direct render; the next frame tries again.

use std::fmt;
use std::str::FromStr;

use log::{debug, error, warn};

use crate::backend::{
    CameraHandle, ComposerHandle, FrameTiming, GpuHandle, RenderTarget, SceneHandle, SharedTarget,
};
use crate::pipeline::pass::{Pass, PassContext};

/// Quality preset selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PostFxQuality {
    Off,
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for PostFxQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostFxQuality::Off => "off",
            PostFxQuality::Low => "low",
            PostFxQuality::Medium => "medium",
            PostFxQuality::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for PostFxQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(PostFxQuality::Off),
            "low" => Ok(PostFxQuality::Low),
            "medium" => Ok(PostFxQuality::Medium),
            "high" => Ok(PostFxQuality::High),
            other => Err(format!("unknown post-fx quality \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
    Add,
    Screen,
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub enabled: bool,
    pub intensity: f32,
    pub threshold: f32,
    pub radius: f32,
}

/// Grain and vignette applied last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalSettings {
    pub enabled: bool,
    pub noise: f32,
    pub grain_scale: f32,
    pub blend: BlendMode,
    pub vignette_center: [f32; 2],
    pub vignette_radius: f32,
    pub vignette_strength: f32,
    pub vignette_power: f32,
    pub vignette_color: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostFxConfig {
    pub enabled: bool,
    pub bloom: BloomSettings,
    pub final_fx: FinalSettings,
}

const VIGNETTE_COLOR: [f32; 3] = [0.06, 0.07, 0.1];

impl PostFxConfig {
    pub fn preset(quality: PostFxQuality) -> Self {
        let final_fx = |noise: f32, strength: f32| FinalSettings {
            enabled: true,
            noise,
            grain_scale: 6.0,
            blend: BlendMode::Add,
            vignette_center: [0.5, 0.5],
            vignette_radius: 0.3,
            vignette_strength: strength,
            vignette_power: 0.8,
            vignette_color: VIGNETTE_COLOR,
        };
        let bloom = |intensity: f32| BloomSettings {
            enabled: true,
            intensity,
            threshold: 0.43,
            radius: 0.5,
        };
        match quality {
            PostFxQuality::Off => PostFxConfig {
                enabled: false,
                bloom: BloomSettings {
                    enabled: false,
                    intensity: 0.0,
                    threshold: 1.0,
                    radius: 0.0,
                },
                final_fx: FinalSettings {
                    enabled: false,
                    noise: 0.0,
                    grain_scale: 1.0,
                    blend: BlendMode::Normal,
                    vignette_strength: 0.0,
                    ..final_fx(0.0, 0.0)
                },
            },
            PostFxQuality::Low => PostFxConfig {
                enabled: true,
                bloom: bloom(0.8),
                final_fx: final_fx(0.03, 0.12),
            },
            PostFxQuality::Medium => PostFxConfig {
                enabled: true,
                bloom: bloom(0.5),
                final_fx: final_fx(0.038, 0.15),
            },
            PostFxQuality::High => PostFxConfig {
                enabled: true,
                bloom: bloom(1.2),
                final_fx: final_fx(0.05, 0.18),
            },
        }
    }
}

/// Effect handed to the backend when building a composer.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Bloom(BloomSettings),
    Final {
        settings: FinalSettings,
        /// Tileable noise texture; procedural noise when absent.
        grain: Option<GpuHandle>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bound {
    scene: SceneHandle,
    camera: CameraHandle,
    composer: Option<ComposerHandle>,
}

/// Routes one (scene, camera) pair through the configured effects.
pub struct PostProcessingPass {
    config: PostFxConfig,
    target: SharedTarget,
    bound: Option<Bound>,
    size: (u32, u32),
    grain: Option<GpuHandle>,
}

impl fmt::Debug for PostProcessingPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostProcessingPass")
            .field("config", &self.config)
            .field("bound", &self.bound)
            .field("size", &self.size)
            .field("grain", &self.grain)
            .finish()
    }
}

impl PostProcessingPass {
    pub fn new(config: PostFxConfig, target: SharedTarget) -> Self {
        Self {
            config,
            target,
            bound: None,
            size: (1, 1),
            grain: None,
        }
    }

    pub fn config(&self) -> &PostFxConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Swap presets. The composer is rebuilt on the next render.
    pub fn set_config(&mut self, config: PostFxConfig) {
        self.config = config;
        self.release_composer();
    }

    /// Use `texture` as grain noise from the next composer build on.
    pub fn set_grain_texture(&mut self, texture: Option<GpuHandle>) {
        if self.grain == texture {
            return;
        }
        self.grain = texture;
        self.release_composer();
    }

    pub fn has_composer(&self) -> bool {
        self.bound.is_some_and(|b| b.composer.is_some())
    }

    fn effects(&self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.config.bloom.enabled {
            effects.push(Effect::Bloom(self.config.bloom));
        }
        if self.config.final_fx.enabled {
            effects.push(Effect::Final {
                settings: self.config.final_fx,
                grain: self.grain,
            });
        }
        effects
    }

    fn release_composer(&mut self) {
        if let Some(composer) = self.bound.take().and_then(|b| b.composer) {
            self.target.borrow_mut().release_composer(composer);
            debug!("released {}", composer);
        }
    }

    fn ensure_composer(
        &mut self,
        target: &mut dyn RenderTarget,
        scene: SceneHandle,
        camera: CameraHandle,
    ) -> Option<ComposerHandle> {
        if let Some(bound) = self.bound
            && bound.scene == scene
            && bound.camera == camera
            && bound.composer.is_some()
        {
            return bound.composer;
        }

        if let Some(composer) = self.bound.take().and_then(|b| b.composer) {
            target.release_composer(composer);
        }
        let effects = self.effects();
        let composer = if effects.is_empty() {
            None
        } else {
            match target.create_composer(scene, camera, &effects) {
                Ok(composer) => {
                    target.resize_composer(composer, self.size.0, self.size.1);
                    Some(composer)
                }
                Err(err) => {
                    warn!("post-fx composer unavailable, rendering directly: {}", err);
                    None
                }
            }
        };
        self.bound = Some(Bound {
            scene,
            camera,
            composer,
        });
        composer
    }

    fn apply_size(&mut self, target: &mut dyn RenderTarget, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        if let Some(composer) = self.bound.and_then(|b| b.composer) {
            target.resize_composer(composer, width, height);
        }
    }
}

impl Pass for PostProcessingPass {
    fn name(&self) -> &str {
        "postfx"
    }

    fn on_unmounted(&mut self) {
        self.release_composer();
    }

    fn render(&mut self, frame: &FrameTiming, ctx: &PassContext<'_>) {
        let mut target = ctx.target.borrow_mut();
        if !self.config.enabled {
            target.render(ctx.scene, ctx.camera, frame);
            return;
        }

        let (width, height) = target.size();
        if width > 0 && height > 0 && (width, height) != self.size {
            self.apply_size(&mut *target, width, height);
        }

        let Some(composer) = self.ensure_composer(&mut *target, ctx.scene, ctx.camera) else {
            target.render(ctx.scene, ctx.camera, frame);
            return;
        };

        if let Err(err) = target.render_composer(composer, frame) {
            error!("composer render failed, falling back to direct render: {}", err);
            target.release_composer(composer);
            self.bound = None;
            target.render(ctx.scene, ctx.camera, frame);
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        let target = self.target.clone();
        let mut target = target.borrow_mut();
        self.apply_size(&mut *target, width, height);
    }

    fn dispose(&mut self) {
        self.release_composer();
    }
}
