//! Universes and their contracts.
//!
//! - [`contract`] – immutable node-id sets per mode
//! - [`universe`] – scene/camera/graph/pipeline bundle with the contract machine
//! - [`registry`] – lazy factory + instance cache keyed by universe id

pub mod contract;
pub mod registry;
pub mod universe;
