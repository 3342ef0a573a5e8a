//! Shapefile layers inside extracted archives.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geo::Geometry;
use serde_json::{Map, Number, Value};
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use tracing::{debug, warn};

use super::{RawRow, RawTable, SourceCrs};
use crate::error::FetchError;
use crate::normalize::{wkt_name, Crs};

/// Read `<layer>.shp` (with its sidecars) from an extracted archive root.
pub fn read_layer(root: &Path, layer: &str) -> Result<RawTable, FetchError> {
    let shp = root.join(format!("{}.shp", layer));
    if !shp.is_file() {
        return Err(FetchError::Format(format!(
            "shapefile '{}' not found in archive",
            layer
        )));
    }

    let crs = read_prj(&shp.with_extension("prj"));
    let mut table = RawTable::new(crs);

    let mut reader = shapefile::Reader::from_path(&shp)
        .map_err(|e| FetchError::Format(format!("cannot open {}: {}", shp.display(), e)))?;

    for result in reader.iter_shapes_and_records() {
        let (shape, record) =
            result.map_err(|e| FetchError::Format(format!("bad shapefile record: {}", e)))?;

        let geometry = match shape {
            Shape::NullShape => None,
            other => Some(
                Geometry::<f64>::try_from(other)
                    .map_err(|e| FetchError::Format(format!("unsupported shape: {:?}", e)))?,
            ),
        };

        let fields: HashMap<String, FieldValue> = record.into();
        let properties: Map<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name, field_to_json(value)))
            .collect();

        table.push(RawRow {
            geometry,
            properties,
        });
    }

    debug!("Read {} records from {}", table.len(), shp.display());
    Ok(table)
}

/// CRS declared by the `.prj` sidecar.
///
/// A sidecar that exists but cannot be read or identified is reported as
/// [`SourceCrs::Unidentified`], never as undeclared.
fn read_prj(prj: &Path) -> SourceCrs {
    if !prj.is_file() {
        return SourceCrs::Undeclared;
    }
    let wkt = match fs::read_to_string(prj) {
        Ok(wkt) => wkt,
        Err(e) => {
            warn!("Could not read {}: {}", prj.display(), e);
            return SourceCrs::Unidentified(prj.display().to_string());
        }
    };
    match Crs::from_wkt(&wkt) {
        Some(crs) => SourceCrs::Known(crs),
        None => {
            let name = wkt_name(&wkt).unwrap_or(wkt.trim()).to_string();
            warn!("Could not identify CRS '{}' in {}", name, prj.display());
            SourceCrs::Unidentified(name)
        }
    }
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => Value::String(s),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            number(n)
        }
        FieldValue::Float(Some(f)) => number(f64::from(f)),
        FieldValue::Integer(i) => Value::from(i),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Date(Some(d)) => Value::String(format!(
            "{:04}-{:02}-{:02}",
            d.year(),
            d.month(),
            d.day()
        )),
        _ => Value::Null,
    }
}

/// Whole numbers stay integers so ids read back as `12`, not `12.0`.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
