//! Render pipeline.
//!
//! - [`pass`] – the [`Pass`](pass::Pass) trait, per-frame context and ordered [`Pipeline`](pass::Pipeline)
//! - [`forward`] – direct scene render
//! - [`postfx`] – quality presets and the post-processing pass

pub mod forward;
pub mod pass;
pub mod postfx;
