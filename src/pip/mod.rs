//! Point-in-polygon hierarchy resolution.
//!
//! Each layer is indexed in an R-tree over its sanitized regions; precincts
//! are looked up at a representative point.

pub mod geometry;
mod index;
mod resolver;

pub use geometry::{representative_point, sanitize};
pub use index::{IndexedRegion, LayerIndex};
pub use resolver::{resolve, HierarchyResolver};
