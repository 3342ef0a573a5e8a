//! Spatial index over the regions of one layer.

use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::{debug, warn};

use super::geometry::{sanitize, shape_contains};
use crate::models::{BoundaryRecord, Layer, LayerKey};

/// Wrapper for R-tree indexing of region records
#[derive(Clone)]
pub struct IndexedRegion {
    pub record: Arc<BoundaryRecord>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedRegion {
    /// Sanitize the record's shape and wrap it for indexing.
    ///
    /// Returns `None` for shapes without extent.
    pub fn new(mut record: BoundaryRecord) -> Option<Self> {
        record.shape = sanitize(&record.shape);
        let rect = record.shape.bounding_rect()?;
        Some(Self {
            record: Arc::new(record),
            envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        })
    }
}

/// R-tree over one layer's sanitized regions
pub struct LayerIndex {
    key: LayerKey,
    tree: RTree<IndexedRegion>,
}

impl LayerIndex {
    /// Build the index for a layer
    pub fn build(layer: Layer) -> Self {
        let total = layer.len();
        let indexed: Vec<IndexedRegion> = layer
            .records
            .into_iter()
            .filter_map(IndexedRegion::new)
            .collect();

        if indexed.len() < total {
            warn!(
                "Layer {}: dropped {} regions without extent",
                layer.key,
                total - indexed.len()
            );
        }

        let tree = RTree::bulk_load(indexed);
        debug!("Indexed layer {} with {} regions", layer.key, tree.size());

        Self {
            key: layer.key,
            tree,
        }
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    /// Every region strictly containing `point`
    pub fn lookup(&self, point: &Point<f64>) -> Vec<Arc<BoundaryRecord>> {
        let query_envelope = AABB::from_point([point.x(), point.y()]);

        // Envelope intersection first, then exact containment
        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|region| shape_contains(&region.record.shape, point))
            .map(|region| Arc::clone(&region.record))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};
    use serde_json::{json, Map};

    fn county(name: &str, x: f64) -> BoundaryRecord {
        let mut attrs = Map::new();
        attrs.insert("name".to_string(), json!(name));
        BoundaryRecord::new(
            polygon![(x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)],
            attrs,
        )
    }

    #[test]
    fn test_lookup() {
        let layer = Layer::new(
            LayerKey::global("county"),
            vec![county("a", 0.0), county("b", 1.0), county("c", 2.0)],
        );
        let index = LayerIndex::build(layer);
        assert_eq!(index.len(), 3);

        let found = index.lookup(&point!(x: 1.5, y: 0.5));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name().as_deref(), Some("b"));

        assert!(index.lookup(&point!(x: 5.0, y: 0.5)).is_empty());
    }

    #[test]
    fn test_boundary_point_is_not_contained() {
        let index = LayerIndex::build(Layer::new(LayerKey::global("county"), vec![county("a", 0.0)]));
        assert!(index.lookup(&point!(x: 1.0, y: 0.5)).is_empty());
    }

    #[test]
    fn test_empty_layer() {
        let index = LayerIndex::build(Layer::new(LayerKey::global("ward"), vec![]));
        assert!(index.is_empty());
        assert!(index.lookup(&point!(x: 0.0, y: 0.0)).is_empty());
    }
}
