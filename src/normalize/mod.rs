//! Reduction of raw source tables to uniform boundary records.
//!
//! Every layer, whatever its source format, goes through [`normalize`]:
//! - only the geometry and the field-map source fields are kept
//! - fields are renamed per the field map
//! - string values are lowercased so later joins on names are reliable
//! - geometries end up in WGS84

mod crs;

pub use crs::{wkt_name, Crs, Reprojector};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::{BoundaryRecord, BoundaryShape};
use crate::sources::{FieldMap, RawTable, SourceCrs};

/// Per-layer normalization switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Reproject to WGS84 even when the table already claims WGS84
    pub reproject: bool,
    /// CRS to assume instead of what the source declared
    pub source_crs: Option<Crs>,
}

/// Normalize a raw table into boundary records.
///
/// Fails with [`FetchError::Schema`] when a field-map source field is not a
/// column of a non-empty table. Rows without a polygonal geometry are dropped.
pub fn normalize(
    table: RawTable,
    field_map: &FieldMap,
    options: &NormalizeOptions,
) -> Result<Vec<BoundaryRecord>, FetchError> {
    if !table.is_empty() {
        if let Some(missing) = field_map.sources().find(|f| !table.has_column(f)) {
            return Err(FetchError::Schema {
                field: missing.to_string(),
            });
        }
    }

    let crs = match (options.source_crs, &table.crs) {
        (Some(crs), _) => crs,
        (None, SourceCrs::Known(crs)) => *crs,
        (None, SourceCrs::Undeclared) => {
            debug!("Source carries no CRS, assuming {}", Crs::WGS84);
            Crs::WGS84
        }
        (None, SourceCrs::Unidentified(name)) => {
            return Err(FetchError::Format(format!(
                "source declares unidentified CRS '{}'; set source_crs for this layer",
                name
            )));
        }
    };
    let reprojector = if options.reproject || crs != Crs::WGS84 {
        debug!("Reprojecting from {} to {}", crs, Crs::WGS84);
        Some(Reprojector::to_wgs84(crs)?)
    } else {
        None
    };

    let total = table.len();
    let mut records = Vec::with_capacity(total);
    let mut dropped = 0usize;

    for row in table.rows {
        let Some(geometry) = row.geometry else {
            dropped += 1;
            continue;
        };
        let geometry = match &reprojector {
            Some(r) => r.reproject(&geometry)?,
            None => geometry,
        };
        let shape = match BoundaryShape::try_from(geometry) {
            Ok(shape) => shape,
            Err(kind) => {
                debug!("Dropping row with {} geometry", kind);
                dropped += 1;
                continue;
            }
        };

        let mut attributes = Map::new();
        for (source, output) in field_map.iter() {
            let value = row.properties.get(source).cloned().unwrap_or(Value::Null);
            attributes.insert(output.to_string(), case_fold(value));
        }
        records.push(BoundaryRecord { shape, attributes });
    }

    if dropped > 0 {
        warn!(
            "Dropped {} of {} rows without polygon geometry",
            dropped, total
        );
    }

    Ok(records)
}

fn case_fold(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::RawRow;
    use geo::{point, polygon, Geometry};
    use serde_json::json;

    fn row(props: Value) -> RawRow {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        RawRow {
            geometry: Some(Geometry::Polygon(square)),
            properties: props.as_object().cloned().unwrap(),
        }
    }

    fn field_map() -> FieldMap {
        [("CITY_NM", "name"), ("OBJECTID", "id"), ("COUNTY_NM", "county")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_renames_drops_and_lowercases() {
        let mut table = RawTable::new(SourceCrs::Undeclared);
        table.push(row(json!({
            "CITY_NM": "Bellingham",
            "OBJECTID": 12,
            "COUNTY_NM": "WHATCOM",
            "Shape__Area": 1234.5,
        })));
        table.push(row(json!({
            "CITY_NM": "SeaTac",
            "OBJECTID": 13,
            "COUNTY_NM": null,
            "Shape__Area": 99.0,
        })));

        let records = normalize(table, &field_map(), &NormalizeOptions::default()).unwrap();
        assert_eq!(records.len(), 2);

        for record in &records {
            assert!(!record.attributes.contains_key("Shape__Area"));
            assert!(!record.attributes.contains_key("CITY_NM"));
            for value in record.attributes.values() {
                if let Value::String(s) = value {
                    assert_eq!(s, &s.to_lowercase());
                }
            }
        }
        assert_eq!(records[0].attributes["name"], json!("bellingham"));
        assert_eq!(records[0].attributes["county"], json!("whatcom"));
        assert_eq!(records[0].attributes["id"], json!(12));
        assert_eq!(records[1].attributes["name"], json!("seatac"));
        assert_eq!(records[1].attributes["county"], Value::Null);
    }

    #[test]
    fn test_missing_source_field_is_schema_error() {
        let mut table = RawTable::new(SourceCrs::Undeclared);
        table.push(row(json!({ "CITY_NM": "Everett", "OBJECTID": 1 })));

        let err = normalize(table, &field_map(), &NormalizeOptions::default()).unwrap_err();
        match err {
            FetchError::Schema { field } => assert_eq!(field, "COUNTY_NM"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_table_is_not_a_schema_error() {
        let records =
                normalize(RawTable::default(), &field_map(), &NormalizeOptions::default()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_non_polygon_rows_are_dropped() {
        let mut table = RawTable::new(Crs::WGS84);
        table.push(row(json!({ "CITY_NM": "A", "OBJECTID": 1, "COUNTY_NM": "x" })));
        table.push(RawRow {
            geometry: Some(Geometry::Point(point!(x: 0.5, y: 0.5))),
            properties: json!({ "CITY_NM": "B", "OBJECTID": 2, "COUNTY_NM": "x" })
                .as_object()
                .cloned()
                .unwrap(),
        });
        table.push(RawRow {
            geometry: None,
            properties: json!({ "CITY_NM": "C", "OBJECTID": 3, "COUNTY_NM": "x" })
                .as_object()
                .cloned()
                .unwrap(),
        });

        let records = normalize(table, &field_map(), &NormalizeOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name().as_deref(), Some("a"));
    }

    #[test]
    fn test_reprojects_declared_crs() {
        let mut table = RawTable::new(Crs::epsg(3857));
        table.push(RawRow {
            geometry: Some(Geometry::Polygon(polygon![
                (x: -13_618_000.0, y: 6_041_000.0),
                (x: -13_616_000.0, y: 6_041_000.0),
                (x: -13_616_000.0, y: 6_043_000.0),
                (x: -13_618_000.0, y: 6_043_000.0),
            ])),
            properties: json!({ "CITY_NM": "Seattle", "OBJECTID": 1, "COUNTY_NM": "King" })
                .as_object()
                .cloned()
                .unwrap(),
        });

        let records = normalize(table, &field_map(), &NormalizeOptions::default()).unwrap();
        let rect = records[0].shape.bounding_rect().unwrap();
        assert!(rect.min().x > -123.0 && rect.max().x < -122.0);
        assert!(rect.min().y > 47.0 && rect.max().y < 48.0);
    }

    #[test]
    fn test_unidentified_crs_fails_without_override() {
        let name = "NAD_1983_HARN_StatePlane_Washington_North_FIPS_4601_Feet";
        let mut table = RawTable::new(SourceCrs::Unidentified(name.to_string()));
        table.push(RawRow {
            geometry: Some(Geometry::Polygon(polygon![
                (x: 1_230_000.0, y: 640_000.0),
                (x: 1_240_000.0, y: 640_000.0),
                (x: 1_240_000.0, y: 650_000.0),
                (x: 1_230_000.0, y: 650_000.0),
            ])),
            properties: json!({ "CITY_NM": "Seattle", "OBJECTID": 1, "COUNTY_NM": "King" })
                .as_object()
                .cloned()
                .unwrap(),
        });

        let err = normalize(table.clone(), &field_map(), &NormalizeOptions::default()).unwrap_err();
        match err {
            FetchError::Format(msg) => assert!(msg.contains(name), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }

        // NAD83(HARN) / Washington North (ftUS)
        let options = NormalizeOptions {
            reproject: false,
            source_crs: Some(Crs::epsg(2926)),
        };
        let records = normalize(table, &field_map(), &options).unwrap();
        let rect = records[0].shape.bounding_rect().unwrap();
        // Bellingham
        assert!(rect.min().x > -123.0 && rect.max().x < -122.0, "{rect:?}");
        assert!(rect.min().y > 48.5 && rect.max().y < 49.0, "{rect:?}");
    }
}
