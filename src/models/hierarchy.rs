//! Resolved containment hierarchy of a precinct.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::BoundaryRecord;

/// One precinct and the region it falls in for every boundary type.
///
/// Every boundary type known to the resolver has a key; `None` means no
/// region of that type covers the precinct (e.g. a precinct outside any
/// city), which is not an error.
#[derive(Debug, Clone)]
pub struct HierarchyRow {
    pub precinct: BoundaryRecord,
    pub assignments: BTreeMap<String, Option<Arc<BoundaryRecord>>>,
}

impl HierarchyRow {
    pub fn new(precinct: BoundaryRecord) -> Self {
        Self {
            precinct,
            assignments: BTreeMap::new(),
        }
    }

    /// Region assigned for a boundary type, if any
    pub fn get(&self, boundary_type: &str) -> Option<&BoundaryRecord> {
        self.assignments
            .get(boundary_type)
            .and_then(|entry| entry.as_deref())
    }

    pub fn set(&mut self, boundary_type: &str, region: Option<Arc<BoundaryRecord>>) {
        self.assignments.insert(boundary_type.to_string(), region);
    }

    /// Whether the precinct lies in the named region of `boundary_type`.
    pub fn is_in(&self, boundary_type: &str, region_name: &str) -> bool {
        self.get(boundary_type)
            .and_then(|r| r.name())
            .map(|name| name.eq_ignore_ascii_case(region_name))
            .unwrap_or(false)
    }
}
