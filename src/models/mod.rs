//! Core data models for boundary layers and resolved hierarchies.

pub mod boundary;
pub mod hierarchy;
pub mod layer;

pub use boundary::{BoundaryRecord, BoundaryShape};
pub use hierarchy::HierarchyRow;
pub use layer::{Layer, LayerKey, Scope, PRECINCT};
