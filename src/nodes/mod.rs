//! Nodes and the graph that mounts them.
//!
//! - [`node`] – the [`Node`](node::Node) capability and hook future types
//! - [`graph`] – registration and ordered mount/unmount transitions
//! - [`tween`] – scalar tweens for entry and exit effects

pub mod graph;
pub mod node;
pub mod tween;
