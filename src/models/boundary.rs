//! Boundary geometry and attribute records.

use geo::{BoundingRect, Geometry, MultiPolygon, Polygon, Rect};
use serde_json::{Map, Value};

/// Polygonal shape of a region.
///
/// Sources only ever deliver polygons or multi-polygons for boundaries;
/// everything else is rejected when a record is built.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryShape {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl BoundaryShape {
    /// Axis-aligned bounds, `None` for an empty shape
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            BoundaryShape::Polygon(p) => p.bounding_rect(),
            BoundaryShape::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            BoundaryShape::Polygon(p) => Geometry::Polygon(p.clone()),
            BoundaryShape::MultiPolygon(mp) => Geometry::MultiPolygon(mp.clone()),
        }
    }
}

impl TryFrom<Geometry<f64>> for BoundaryShape {
    type Error = &'static str;

    fn try_from(geometry: Geometry<f64>) -> Result<Self, Self::Error> {
        match geometry {
            Geometry::Polygon(p) => Ok(BoundaryShape::Polygon(p)),
            Geometry::MultiPolygon(mp) => Ok(BoundaryShape::MultiPolygon(mp)),
            Geometry::Point(_) => Err("point"),
            Geometry::MultiPoint(_) => Err("multi-point"),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Err("line")
            }
            Geometry::GeometryCollection(_) => Err("geometry collection"),
            Geometry::Rect(_) | Geometry::Triangle(_) => Err("rect/triangle"),
        }
    }
}

impl From<Polygon<f64>> for BoundaryShape {
    fn from(polygon: Polygon<f64>) -> Self {
        BoundaryShape::Polygon(polygon)
    }
}

impl From<MultiPolygon<f64>> for BoundaryShape {
    fn from(multi: MultiPolygon<f64>) -> Self {
        BoundaryShape::MultiPolygon(multi)
    }
}

/// One normalized region: a shape plus its renamed, case-folded attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryRecord {
    pub shape: BoundaryShape,
    pub attributes: Map<String, Value>,
}

impl BoundaryRecord {
    pub fn new(shape: impl Into<BoundaryShape>, attributes: Map<String, Value>) -> Self {
        Self {
            shape: shape.into(),
            attributes,
        }
    }

    /// The `id` attribute rendered as text, if present and not null
    pub fn id(&self) -> Option<String> {
        self.attributes.get("id").and_then(value_to_label)
    }

    /// The `name` attribute rendered as text, if present and not null
    pub fn name(&self) -> Option<String> {
        self.attributes.get("name").and_then(value_to_label)
    }

    /// Human-facing label: name, falling back to id.
    pub fn label(&self) -> String {
        self.name()
            .or_else(|| self.id())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

fn value_to_label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
