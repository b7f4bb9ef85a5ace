//! Stagecraft library.
//!
//! A small scene runtime: universes own a scene, a camera, a node graph and
//! a render pipeline; contracts decide which nodes are mounted; the output
//! activates universes and composes each frame; the asset store loads and
//! caches everything they need. Exposed for the demo binary and for
//! integration tests.

pub mod backend;
pub mod demo;
pub mod error;
pub mod events;
pub mod nodes;
pub mod pipeline;
pub mod resources;
pub mod systems;
pub mod universes;
