//! Layers of boundary records and their identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::BoundaryRecord;

/// Boundary type of the base unit every hierarchy row is built around.
pub const PRECINCT: &str = "precinct";

/// Parent region a scoped layer is restricted to, e.g. `city = seattle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Boundary type of the parent region
    pub boundary_type: String,
    /// Parent region name (lowercase, as normalized records store it)
    pub region: String,
}

impl Scope {
    pub fn new(boundary_type: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            boundary_type: boundary_type.into(),
            region: region.into().to_lowercase(),
        }
    }
}

/// Identity of a layer: its boundary type plus optional scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey {
    pub boundary_type: String,
    pub scope: Option<Scope>,
}

impl LayerKey {
    /// A state-wide layer
    pub fn global(boundary_type: impl Into<String>) -> Self {
        Self {
            boundary_type: boundary_type.into(),
            scope: None,
        }
    }

    /// A layer that only exists inside `scope`
    pub fn scoped(boundary_type: impl Into<String>, scope: Scope) -> Self {
        Self {
            boundary_type: boundary_type.into(),
            scope: Some(scope),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_none()
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            None => write!(f, "{} (state)", self.boundary_type),
            Some(scope) => write!(
                f,
                "{} ({} {})",
                self.boundary_type, scope.boundary_type, scope.region
            ),
        }
    }
}

/// Ordered records sharing one source's output schema.
#[derive(Debug, Clone)]
pub struct Layer {
    pub key: LayerKey,
    pub records: Vec<BoundaryRecord>,
}

impl Layer {
    pub fn new(key: LayerKey, records: Vec<BoundaryRecord>) -> Self {
        Self { key, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_region_is_case_folded() {
        let scope = Scope::new("city", "Bellingham");
        assert_eq!(scope.region, "bellingham");
    }

    #[test]
    fn test_layer_key_display() {
        assert_eq!(LayerKey::global("county").to_string(), "county (state)");
        let key = LayerKey::scoped("ward", Scope::new("city", "bellingham"));
        assert_eq!(key.to_string(), "ward (city bellingham)");
    }
}
