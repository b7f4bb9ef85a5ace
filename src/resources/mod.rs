//! Long-lived data shared by the runtime.
//!
//! Overview
//! - `assets` – asset manifest, loaders and the keyed asset cache
//! - `config` – runtime settings read from an INI file
//! - `inputbridge` – channel feeding pointer commands from an adapter thread
//! - `state` – viewport size and pixel ratio
pub mod assets;
pub mod config;
pub mod inputbridge;
pub mod state;
