//! Assigns every precinct its containing region in each layer.
//!
//! Global layers are resolved for all precincts first. Scoped layers are
//! resolved afterwards, and a precinct only tests against a scoped layer
//! when its global assignment for the scope's boundary type is the scope's
//! region.

use std::collections::BTreeSet;
use std::sync::Arc;

use geo::Point;
use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::{info, warn};

use super::geometry::representative_point;
use super::LayerIndex;
use crate::error::ResolveError;
use crate::models::{BoundaryRecord, HierarchyRow, Layer};

/// Resolver over a fixed set of layers
pub struct HierarchyResolver {
    global: Vec<LayerIndex>,
    /// Scoped layer instances grouped by boundary type
    scoped: Vec<(String, Vec<LayerIndex>)>,
    boundary_types: BTreeSet<String>,
}

impl HierarchyResolver {
    /// Index every layer
    pub fn new(layers: Vec<Layer>) -> Self {
        let mut global = Vec::new();
        let mut scoped: HashMap<String, Vec<LayerIndex>> = HashMap::new();
        let mut boundary_types = BTreeSet::new();

        let indexes: Vec<LayerIndex> = layers.into_par_iter().map(LayerIndex::build).collect();
        for index in indexes {
            let boundary_type = index.key().boundary_type.clone();
            boundary_types.insert(boundary_type.clone());
            if index.key().is_global() {
                global.push(index);
            } else {
                scoped.entry(boundary_type).or_default().push(index);
            }
        }

        global.sort_by(|a, b| a.key().cmp(b.key()));
        let mut scoped: Vec<(String, Vec<LayerIndex>)> = scoped.into_iter().collect();
        scoped.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            "Resolver ready: {} global layers, {} scoped boundary types",
            global.len(),
            scoped.len()
        );

        Self {
            global,
            scoped,
            boundary_types,
        }
    }

    /// Every boundary type a row is assigned for
    pub fn boundary_types(&self) -> impl Iterator<Item = &str> {
        self.boundary_types.iter().map(String::as_str)
    }

    /// Resolve every precinct, preserving input order.
    ///
    /// A precinct inside more than one region of a boundary type fails the
    /// whole run with [`ResolveError::Ambiguous`].
    pub fn resolve(&self, precincts: Vec<BoundaryRecord>) -> Result<Vec<HierarchyRow>, ResolveError> {
        info!("Resolving {} precincts", precincts.len());

        let mut rows: Vec<(HierarchyRow, Option<Point<f64>>)> = precincts
            .into_par_iter()
            .map(|precinct| {
                let point = representative_point(&precinct.shape);
                if point.is_none() {
                    warn!("Precinct {} has no usable test point", precinct.label());
                }
                (HierarchyRow::new(precinct), point)
            })
            .collect();

        // Global layers
        rows.par_iter_mut()
            .try_for_each(|(row, point)| self.assign_global(row, point.as_ref()))?;

        // Scoped layers, once every parent assignment is known
        rows.par_iter_mut()
            .try_for_each(|(row, point)| self.assign_scoped(row, point.as_ref()))?;

        Ok(rows.into_iter().map(|(row, _)| row).collect())
    }

    fn assign_global(&self, row: &mut HierarchyRow, point: Option<&Point<f64>>) -> Result<(), ResolveError> {
        for index in &self.global {
            let boundary_type = &index.key().boundary_type;
            let region = match point {
                Some(point) => single_match(row, boundary_type, index.lookup(point))?,
                None => None,
            };
            row.set(boundary_type, region);
        }
        Ok(())
    }

    fn assign_scoped(&self, row: &mut HierarchyRow, point: Option<&Point<f64>>) -> Result<(), ResolveError> {
        for (boundary_type, instances) in &self.scoped {
            let applicable: Vec<&LayerIndex> = instances
                .iter()
                .filter(|index| {
                    index
                        .key()
                        .scope
                        .as_ref()
                        .map(|scope| row.is_in(&scope.boundary_type, &scope.region))
                        .unwrap_or(false)
                })
                .collect();

            let region = match point {
                Some(point) if !applicable.is_empty() => {
                    let candidates = applicable.iter().flat_map(|index| index.lookup(point)).collect();
                    single_match(row, boundary_type, candidates)?
                }
                _ => None,
            };

            // A scoped match refines a state-wide one, absence never clears it
            if region.is_some() || row.get(boundary_type).is_none() {
                row.set(boundary_type, region);
            }
        }
        Ok(())
    }
}

fn single_match(
    row: &HierarchyRow,
    boundary_type: &str,
    mut candidates: Vec<Arc<BoundaryRecord>>,
) -> Result<Option<Arc<BoundaryRecord>>, ResolveError> {
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => {
            let mut regions: Vec<String> = candidates.iter().map(|r| r.label()).collect();
            regions.sort();
            Err(ResolveError::Ambiguous {
                precinct: row.precinct.label(),
                boundary_type: boundary_type.to_string(),
                regions,
            })
        }
    }
}

/// Resolve `precincts` against `layers` in one call.
pub fn resolve(precincts: Vec<BoundaryRecord>, layers: Vec<Layer>) -> Result<Vec<HierarchyRow>, ResolveError> {
    HierarchyResolver::new(layers).resolve(precincts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LayerKey, Scope};
    use geo::polygon;
    use serde_json::{json, Map};

    fn square(name: &str, x: f64, y: f64, size: f64) -> BoundaryRecord {
        let mut attrs = Map::new();
        attrs.insert("name".to_string(), json!(name));
        BoundaryRecord::new(
            polygon![
                (x: x, y: y),
                (x: x + size, y: y),
                (x: x + size, y: y + size),
                (x: x, y: y + size),
            ],
            attrs,
        )
    }

    fn precinct(name: &str, x: f64, y: f64) -> BoundaryRecord {
        square(name, x - 0.1, y - 0.1, 0.2)
    }

    fn assigned(row: &HierarchyRow, boundary_type: &str) -> Option<String> {
        row.get(boundary_type).and_then(|r| r.name())
    }

    #[test]
    fn test_single_zero_and_ambiguous() {
        let layers = vec![Layer::new(
            LayerKey::global("county"),
            vec![square("a", 0.0, 0.0, 2.0), square("b", 1.0, 0.0, 2.0)],
        )];

        let rows = resolve(
            vec![precinct("p1", 0.5, 1.0), precinct("p2", 10.0, 10.0)],
            layers.clone(),
        )
        .unwrap();
        assert_eq!(assigned(&rows[0], "county").as_deref(), Some("a"));
        assert!(rows[1].assignments.contains_key("county"));
        assert!(rows[1].get("county").is_none());

        let err = resolve(vec![precinct("p3", 1.5, 1.0)], layers).unwrap_err();
        match err {
            ResolveError::Ambiguous {
                precinct,
                boundary_type,
                regions,
            } => {
                assert_eq!(precinct, "p3");
                assert_eq!(boundary_type, "county");
                assert_eq!(regions, ["a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_listing_order_does_not_matter() {
        let a = square("a", 0.0, 0.0, 1.0);
        let b = square("b", 1.0, 0.0, 1.0);
        let c = square("c", 2.0, 0.0, 1.0);
        let orders = [
            [&a, &b, &c],
            [&a, &c, &b],
            [&b, &a, &c],
            [&b, &c, &a],
            [&c, &a, &b],
            [&c, &b, &a],
        ];

        for order in orders {
            let layer = Layer::new(
                LayerKey::global("county"),
                order.iter().map(|r| (*r).clone()).collect(),
            );
            let rows = resolve(vec![precinct("p", 1.5, 0.5)], vec![layer]).unwrap();
            assert_eq!(assigned(&rows[0], "county").as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_scoped_layer_only_applies_inside_its_region() {
        let layers = vec![
            Layer::new(
                LayerKey::global("city"),
                vec![square("x", 0.0, 0.0, 4.0), square("y", 4.0, 0.0, 4.0)],
            ),
            Layer::new(
                LayerKey::scoped("ward", Scope::new("city", "X")),
                // Ward 2 also covers part of city y
                vec![square("1", 0.0, 0.0, 2.0), square("2", 2.0, 0.0, 4.0)],
            ),
        ];

        let rows = resolve(
            vec![
                precinct("in-x", 1.0, 1.0),
                precinct("in-y", 5.0, 1.0),
                precinct("nowhere", 20.0, 20.0),
            ],
            layers,
        )
        .unwrap();

        assert_eq!(assigned(&rows[0], "city").as_deref(), Some("x"));
        assert_eq!(assigned(&rows[0], "ward").as_deref(), Some("1"));

        assert_eq!(assigned(&rows[1], "city").as_deref(), Some("y"));
        assert!(rows[1].assignments.contains_key("ward"));
        assert!(rows[1].get("ward").is_none());

        assert!(rows[2].get("city").is_none());
        assert!(rows[2].get("ward").is_none());
    }

    #[test]
    fn test_scoped_instances_are_pooled_by_type() {
        let layers = vec![
            Layer::new(
                LayerKey::global("county"),
                vec![square("king", 0.0, 0.0, 4.0), square("pierce", 4.0, 0.0, 4.0)],
            ),
            Layer::new(
                LayerKey::scoped("county_council_district", Scope::new("county", "king")),
                vec![square("k1", 0.0, 0.0, 4.0)],
            ),
            Layer::new(
                LayerKey::scoped("county_council_district", Scope::new("county", "pierce")),
                vec![square("p1", 4.0, 0.0, 4.0)],
            ),
        ];

        let resolver = HierarchyResolver::new(layers);
        assert_eq!(
            resolver.boundary_types().collect::<Vec<_>>(),
            ["county", "county_council_district"]
        );

        let rows = resolver
            .resolve(vec![precinct("a", 1.0, 1.0), precinct("b", 5.0, 1.0)])
            .unwrap();
        assert_eq!(assigned(&rows[0], "county_council_district").as_deref(), Some("k1"));
        assert_eq!(assigned(&rows[1], "county_council_district").as_deref(), Some("p1"));
        assert_eq!(rows[0].precinct.label(), "a");
    }

    #[test]
    fn test_regions_are_sanitized_before_lookup() {
        use geo::MultiPolygon;

        // Clockwise shell with its hole encoded as a separate part
        let shell = polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 4.0), (x: 4.0, y: 4.0), (x: 4.0, y: 0.0)];
        let hole = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0)];
        let mut attrs = Map::new();
        attrs.insert("name".to_string(), json!("donut"));
        let donut = BoundaryRecord::new(MultiPolygon::new(vec![shell, hole]), attrs);

        let layers = vec![Layer::new(
            LayerKey::global("school_district"),
            vec![donut, square("island", 1.0, 1.0, 2.0)],
        )];
        let rows = resolve(vec![precinct("p", 2.0, 2.0)], layers).unwrap();
        assert_eq!(assigned(&rows[0], "school_district").as_deref(), Some("island"));
    }
}
