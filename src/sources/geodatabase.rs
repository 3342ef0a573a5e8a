//! File geodatabase layers inside extracted archives.
//!
//! Decoding goes through GDAL's OpenFileGDB driver and is only compiled with
//! the `geodatabase` feature.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FetchError;
use super::RawTable;

/// Whether this build can decode geodatabase layers.
pub const SUPPORTED: bool = cfg!(feature = "geodatabase");

/// Locate the `*.gdb` bundle in an extracted archive root.
///
/// The root may itself be the bundle.
pub fn find_bundle(root: &Path) -> Result<PathBuf, FetchError> {
    if is_bundle(root) {
        return Ok(root.to_path_buf());
    }
    let mut bundles = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && is_bundle(&path) {
            bundles.push(path);
        }
    }
    bundles.sort();
    bundles
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Format("no .gdb bundle in archive".to_string()))
}

fn is_bundle(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gdb"))
        .unwrap_or(false)
}

/// Read the named layer of the geodatabase found under `root`.
pub fn read_layer(root: &Path, layer: &str) -> Result<RawTable, FetchError> {
    let bundle = find_bundle(root)?;
    decode(&bundle, layer)
}

#[cfg(feature = "geodatabase")]
fn decode(bundle: &Path, layer_name: &str) -> Result<RawTable, FetchError> {
    use gdal::vector::{FieldValue, LayerAccess};
    use gdal::Dataset;
    use serde_json::{Map, Value};

    use super::{RawRow, SourceCrs};
    use crate::normalize::{wkt_name, Crs};

    let dataset = Dataset::open(bundle)
        .map_err(|e| FetchError::Format(format!("cannot open {}: {}", bundle.display(), e)))?;
    let mut layer = dataset.layer_by_name(layer_name).map_err(|_| {
        FetchError::Format(format!("layer '{}' not found in geodatabase", layer_name))
    })?;

    let crs = match layer.spatial_ref() {
        None => SourceCrs::Undeclared,
        Some(srs) => {
            let wkt = srs.to_wkt().unwrap_or_default();
            match srs.auth_code().ok().and_then(|code| u16::try_from(code).ok()) {
                Some(code) => SourceCrs::Known(Crs::epsg(code)),
                None => match Crs::from_wkt(&wkt) {
                    Some(crs) => SourceCrs::Known(crs),
                    None => SourceCrs::Unidentified(wkt_name(&wkt).unwrap_or(layer_name).to_string()),
                },
            }
        }
    };
    let mut table = RawTable::new(crs);

    for feature in layer.features() {
        let geometry = feature
            .geometry()
            .map(|g| g.to_geo())
            .transpose()
            .map_err(|e| FetchError::Format(format!("bad geometry: {}", e)))?;

        let properties: Map<String, Value> = feature
            .fields()
            .map(|(name, value)| {
                let value = match value {
                    Some(FieldValue::StringValue(s)) => Value::String(s),
                    Some(FieldValue::IntegerValue(i)) => Value::from(i),
                    Some(FieldValue::Integer64Value(i)) => Value::from(i),
                    Some(FieldValue::RealValue(f)) => Value::from(f),
                    _ => Value::Null,
                };
                (name, value)
            })
            .collect();

        table.push(RawRow {
            geometry,
            properties,
        });
    }

    Ok(table)
}

#[cfg(not(feature = "geodatabase"))]
fn decode(bundle: &Path, _layer_name: &str) -> Result<RawTable, FetchError> {
    Err(FetchError::Format(format!(
        "cannot read {}: built without the `geodatabase` feature",
        bundle.display()
    )))
}
