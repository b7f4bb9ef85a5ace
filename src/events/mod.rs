//! Events exchanged between adapters and nodes.
//!
//! Submodules:
//! - [`input`] – pointer state and the publish/subscribe hub nodes listen on
pub mod input;
