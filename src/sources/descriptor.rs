//! Declarations of remote boundary sources.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::normalize::Crs;

/// How a source serves its boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// ArcGIS REST feature service queried page by page as GeoJSON
    FeatureService,
    /// Zip archive holding a shapefile
    Shapefile,
    /// Zip archive holding a file geodatabase
    Geodatabase,
}

impl SourceFormat {
    pub fn is_archive(&self) -> bool {
        !matches!(self, SourceFormat::FeatureService)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::FeatureService => "feature_service",
            SourceFormat::Shapefile => "shapefile",
            SourceFormat::Geodatabase => "geodatabase",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping of source field names to output field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(Vec<(String, String)>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, output: impl Into<String>) {
        self.0.push((source.into(), output.into()));
    }

    /// `(source, output)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(s, o)| (s.as_str(), o.as_str()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(s, _)| s.as_str())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, o)| o.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>, O: Into<String>> FromIterator<(S, O)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (S, O)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(s, o)| (s.into(), o.into()))
                .collect(),
        )
    }
}

/// One remote boundary source and how to reduce it to a layer.
///
/// Only constructed through [`RequestDescriptor::new`], so a descriptor in
/// hand always satisfies: archive formats name their in-archive layer, the
/// feature service format never does, and the field map yields `id` or
/// `name` without duplicate outputs.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    layer_name: String,
    source_url: Url,
    format: SourceFormat,
    field_map: FieldMap,
    archive_layer: Option<String>,
    source_crs: Option<Crs>,
}

impl RequestDescriptor {
    pub fn new(
        layer_name: impl Into<String>,
        source_url: &str,
        format: SourceFormat,
        field_map: FieldMap,
        archive_layer: Option<String>,
    ) -> Result<Self, ConfigError> {
        let layer_name = layer_name.into();
        validate_name(&layer_name)?;

        let source_url = Url::parse(source_url).map_err(|source| ConfigError::InvalidUrl {
            layer: layer_name.clone(),
            url: source_url.to_string(),
            source,
        })?;

        match (format.is_archive(), &archive_layer) {
            (true, None) => {
                return Err(ConfigError::MissingArchiveLayer {
                    layer: layer_name,
                    format: format.as_str(),
                })
            }
            (false, Some(_)) => {
                return Err(ConfigError::UnexpectedArchiveLayer { layer: layer_name })
            }
            _ => {}
        }

        if field_map.is_empty() {
            return Err(ConfigError::EmptyFieldMap { layer: layer_name });
        }
        let mut seen: Vec<&str> = Vec::with_capacity(field_map.len());
        for output in field_map.outputs() {
            if seen.contains(&output) {
                return Err(ConfigError::DuplicateField {
                    layer: layer_name.clone(),
                    field: output.to_string(),
                });
            }
            seen.push(output);
        }
        if !seen.iter().any(|f| *f == "id" || *f == "name") {
            return Err(ConfigError::MissingIdentity { layer: layer_name });
        }

        Ok(Self {
            layer_name,
            source_url,
            format,
            field_map,
            archive_layer,
            source_crs: None,
        })
    }

    /// Override the CRS the source data is declared in.
    pub fn with_source_crs(mut self, crs: Crs) -> Self {
        self.source_crs = Some(crs);
        self
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Shapefile stem or geodatabase layer inside the archive
    pub fn archive_layer(&self) -> Option<&str> {
        self.archive_layer.as_deref()
    }

    pub fn source_crs(&self) -> Option<Crs> {
        self.source_crs
    }
}

/// Names become path components of the dataset tree.
pub(crate) fn validate_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> FieldMap {
        [("OBJECTID", "id"), ("CITY_NM", "name")].into_iter().collect()
    }

    #[test]
    fn test_archive_format_requires_layer_name() {
        let err = RequestDescriptor::new(
            "ward",
            "https://example.com/wards.gdb.zip",
            SourceFormat::Geodatabase,
            fields(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingArchiveLayer { .. }));
    }

    #[test]
    fn test_feature_service_rejects_archive_layer() {
        let err = RequestDescriptor::new(
            "city",
            "https://example.com/query",
            SourceFormat::FeatureService,
            fields(),
            Some("cities".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedArchiveLayer { .. }));
    }

    #[test]
    fn test_field_map_needs_identity() {
        let map: FieldMap = [("COUNTY_NM", "county_nm")].into_iter().collect();
        let err = RequestDescriptor::new(
            "city",
            "https://example.com/query",
            SourceFormat::FeatureService,
            map,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingIdentity { .. }));
    }

    #[test]
    fn test_duplicate_output_field() {
        let map: FieldMap = [("A", "name"), ("B", "name")].into_iter().collect();
        let err = RequestDescriptor::new(
            "city",
            "https://example.com/query",
            SourceFormat::FeatureService,
            map,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField { .. }));
    }

    #[test]
    fn test_rejects_bad_url_and_path_names() {
        assert!(matches!(
            RequestDescriptor::new("city", "not a url", SourceFormat::FeatureService, fields(), None),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RequestDescriptor::new(
                "../city",
                "https://example.com/query",
                SourceFormat::FeatureService,
                fields(),
                None
            ),
            Err(ConfigError::InvalidName(_))
        ));
    }

    #[test]
    fn test_valid_shapefile_descriptor() {
        let desc = RequestDescriptor::new(
            "school_district",
            "https://example.com/sd.zip",
            SourceFormat::Shapefile,
            fields(),
            Some("SchoolDistricts".to_string()),
        )
        .unwrap();
        assert_eq!(desc.archive_layer(), Some("SchoolDistricts"));
        assert_eq!(desc.field_map().sources().collect::<Vec<_>>(), ["OBJECTID", "CITY_NM"]);
    }
}
