//! State configuration files.
//!
//! A state file lists the state's boundary sources. Loading validates every
//! entry into a [`StatePlan`], so malformed sources surface as
//! [`ConfigError`] before any request is made.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::{LayerKey, Scope};
use crate::normalize::Crs;
use crate::sources::descriptor::validate_name;
use crate::sources::{FieldMap, RequestDescriptor, SourceFormat};

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    pub state: StateSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub scoped: Vec<ScopedLayerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateSection {
    pub code: String,
    /// Boundary types left out of resolution
    #[serde(default)]
    pub excluded_layers: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchSection {
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/temp`
    pub temp_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub reproject: bool,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("datasets"),
            temp_dir: None,
            timeout_secs: 10,
            concurrency: 4,
            reproject: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_format")]
    pub format: SourceFormat,
    /// `[source, output]` pairs
    pub fields: Vec<(String, String)>,
    pub archive_layer: Option<String>,
    /// EPSG code overriding what the source declares
    pub source_crs: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScopedLayerConfig {
    /// Boundary type of the parent region, e.g. `city`
    pub scope: String,
    /// Parent region name, e.g. `seattle`
    pub region: String,
    #[serde(flatten)]
    pub layer: LayerConfig,
}

fn default_format() -> SourceFormat {
    SourceFormat::FeatureService
}

/// A validated descriptor together with the key of the layer it produces.
#[derive(Debug, Clone)]
pub struct PlannedLayer {
    pub key: LayerKey,
    pub descriptor: RequestDescriptor,
}

/// Validated fetch plan for one state.
#[derive(Debug, Clone)]
pub struct StatePlan {
    pub code: String,
    pub layers: Vec<PlannedLayer>,
}

impl StatePlan {
    pub fn global(&self) -> impl Iterator<Item = &PlannedLayer> {
        self.layers.iter().filter(|l| l.key.is_global())
    }

    pub fn scoped(&self) -> impl Iterator<Item = &PlannedLayer> {
        self.layers.iter().filter(|l| !l.key.is_global())
    }
}

impl StateConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read state config file")?;
        let config = Self::from_toml(&content).context("Failed to parse state config file")?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate every declared source into a [`StatePlan`].
    pub fn plan(&self) -> Result<StatePlan, ConfigError> {
        let code = self.state.code.trim();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidStateCode(self.state.code.clone()));
        }

        let mut layers: Vec<PlannedLayer> = Vec::new();
        let declared = self
            .layers
            .iter()
            .map(|layer| (None, layer))
            .chain(self.scoped.iter().map(|s| (Some(s), &s.layer)));

        for (scoped, layer) in declared {
            let descriptor = layer.descriptor()?;
            let key = match scoped {
                None => LayerKey::global(&layer.name),
                Some(s) => {
                    validate_name(&s.scope)?;
                    validate_name(&s.region)?;
                    LayerKey::scoped(&layer.name, Scope::new(&s.scope, &s.region))
                }
            };
            if layers.iter().any(|l| l.key == key) {
                return Err(ConfigError::DuplicateLayer(key.to_string()));
            }
            layers.push(PlannedLayer { key, descriptor });
        }

        Ok(StatePlan {
            code: code.to_uppercase(),
            layers,
        })
    }
}

impl LayerConfig {
    fn descriptor(&self) -> Result<RequestDescriptor, ConfigError> {
        let fields: FieldMap = self.fields.iter().cloned().collect();
        let descriptor = RequestDescriptor::new(
            &self.name,
            &self.url,
            self.format,
            fields,
            self.archive_layer.clone(),
        )?;
        match self.source_crs.map(Crs::epsg) {
            Some(crs) if !crs.is_known() => Err(ConfigError::UnknownCrs {
                layer: self.name.clone(),
                code: crs.code(),
            }),
            Some(crs) => Ok(descriptor.with_source_crs(crs)),
            None => Ok(descriptor),
        }
    }
}
