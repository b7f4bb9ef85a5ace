//! Engine systems.
//!
//! Submodules overview
//! - [`clock`] – frame loop: input flush, update, render
//! - [`output`] – active-universe set, activation races, frame composition
//! - [`runtime`] – owns state, input, output, clock and registry
//! - [`device`] – composition root and boot order

pub mod clock;
pub mod device;
pub mod output;
pub mod runtime;
