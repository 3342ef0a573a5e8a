//! In-memory table produced by the format adapters.

use geo::Geometry;
use serde_json::{Map, Value};

use crate::normalize::Crs;

/// One feature as delivered by a source, before normalization.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

/// What a source says about its coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceCrs {
    /// No CRS information at all, e.g. a shapefile without `.prj`
    #[default]
    Undeclared,
    Known(Crs),
    /// A definition is present but maps to no EPSG code; holds its name
    Unidentified(String),
}

impl From<Crs> for SourceCrs {
    fn from(crs: Crs) -> Self {
        SourceCrs::Known(crs)
    }
}

/// Rows of a source plus the column set and CRS the source declared.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Every attribute column seen in the source, in first-seen order
    pub columns: Vec<String>,
    pub crs: SourceCrs,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(crs: impl Into<SourceCrs>) -> Self {
        Self {
            columns: Vec::new(),
            crs: crs.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row, registering any column not seen before.
    pub fn push(&mut self, row: RawRow) {
        for key in row.properties.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
