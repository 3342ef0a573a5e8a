//! On-disk dataset layout and GeoJSON layer artifacts.
//!
//! ```text
//! <root>/<STATE>/state/<boundary_type>.geojson
//! <root>/<STATE>/<scope_type>/<region>/<boundary_type>.geojson
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ResolveError;
use crate::models::{BoundaryRecord, BoundaryShape, HierarchyRow, Layer, LayerKey, Scope, PRECINCT};

const EXTENSION: &str = "geojson";
const STATE_DIR: &str = "state";

/// Root of the dataset tree.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

/// Everything the resolver needs for one state.
#[derive(Debug)]
pub struct StateDataset {
    pub precincts: Vec<BoundaryRecord>,
    pub layers: Vec<Layer>,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self, state: &str) -> PathBuf {
        self.root.join(state.to_uppercase())
    }

    /// Where the artifact for a layer of `state` lives.
    pub fn artifact_path(&self, state: &str, key: &LayerKey) -> PathBuf {
        let dir = match &key.scope {
            None => self.state_dir(state).join(STATE_DIR),
            Some(scope) => self
                .state_dir(state)
                .join(&scope.boundary_type)
                .join(&scope.region),
        };
        dir.join(format!("{}.{}", key.boundary_type, EXTENSION))
    }

    /// Load the precinct layer and every other layer of a state.
    ///
    /// Fails before reading anything else if the precinct artifact is
    /// missing. Layers whose boundary type is in `excluded` are skipped.
    pub fn load_state(&self, state: &str, excluded: &[String]) -> Result<StateDataset, ResolveError> {
        let precinct_path = self.artifact_path(state, &LayerKey::global(PRECINCT));
        if !precinct_path.is_file() {
            return Err(ResolveError::MissingInput(precinct_path));
        }
        let precincts = read_records(&precinct_path)?;
        info!("Loaded {} precincts", precincts.len());

        let mut layers = Vec::new();
        for (key, path) in self.discover_layers(state)? {
            if key.boundary_type == PRECINCT || excluded.contains(&key.boundary_type) {
                debug!("Skipping layer {}", key);
                continue;
            }
            let records = read_records(&path)?;
            info!("Loaded layer {} with {} regions", key, records.len());
            layers.push(Layer::new(key, records));
        }

        Ok(StateDataset { precincts, layers })
    }

    /// Every artifact under a state's directory, in path order.
    pub fn discover_layers(&self, state: &str) -> Result<Vec<(LayerKey, PathBuf)>, ResolveError> {
        let state_dir = self.state_dir(state);
        let mut found = Vec::new();

        for entry in WalkDir::new(&state_dir)
            .min_depth(2)
            .max_depth(3)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| ResolveError::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().map(|e| e != EXTENSION).unwrap_or(true)
            {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&state_dir) else {
                continue;
            };
            let parts: Vec<&str> = relative.iter().filter_map(|c| c.to_str()).collect();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let key = match parts.as_slice() {
                [dir, _] if *dir == STATE_DIR => LayerKey::global(stem),
                [scope_type, region, _] if *scope_type != STATE_DIR => {
                    LayerKey::scoped(stem, Scope::new(*scope_type, *region))
                }
                _ => continue,
            };
            found.push((key, path.to_path_buf()));
        }

        Ok(found)
    }
}

/// Write records as a GeoJSON feature collection, atomically.
///
/// The collection is written to a temporary file next to `path` and renamed
/// into place, so `path` either holds a complete artifact or does not exist.
pub fn write_records(path: &Path, records: &[BoundaryRecord]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let features = records
        .iter()
        .map(|record| Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &record.shape.to_geometry(),
            ))),
            id: None,
            properties: Some(record.attributes.clone()),
            foreign_members: None,
        })
        .collect();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, &collection)?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a GeoJSON artifact back into records.
pub fn read_records(path: &Path) -> Result<Vec<BoundaryRecord>, ResolveError> {
    let text = fs::read_to_string(path)?;
    let invalid = |reason: String| ResolveError::InvalidArtifact {
        path: path.to_path_buf(),
        reason,
    };

    let collection: FeatureCollection =
        serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;

    let mut records = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let geometry = feature
            .geometry
            .ok_or_else(|| invalid("feature without geometry".to_string()))?;
        let geometry =
            geo::Geometry::<f64>::try_from(geometry).map_err(|e| invalid(e.to_string()))?;
        let shape = BoundaryShape::try_from(geometry)
            .map_err(|kind| invalid(format!("unexpected {} geometry", kind)))?;
        records.push(BoundaryRecord {
            shape,
            attributes: feature.properties.unwrap_or_default(),
        });
    }
    Ok(records)
}

/// Write resolved rows as CSV, one line per precinct.
///
/// Columns are the precinct id and name followed by one column per entry of
/// `boundary_types` holding the assigned region's name, or its id when it
/// has none. Absent assignments are empty.
pub fn write_hierarchy_csv<W: Write>(
    writer: W,
    boundary_types: &[&str],
    rows: &[HierarchyRow],
) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["precinct_id", "precinct_name"];
    header.extend_from_slice(boundary_types);
    csv.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.precinct.id().unwrap_or_default(),
            row.precinct.name().unwrap_or_default(),
        ];
        for boundary_type in boundary_types {
            let region = row
                .get(boundary_type)
                .and_then(|r| r.name().or_else(|| r.id()))
                .unwrap_or_default();
            record.push(region);
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}
