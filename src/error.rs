//! Error kinds for configuration, fetching and resolution.

use std::path::PathBuf;

use thiserror::Error;

/// A state configuration that cannot be turned into a fetch plan.
///
/// Raised while loading configuration, before any request is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("state codes must be two letters, got '{0}'")]
    InvalidStateCode(String),

    #[error("layer '{layer}': format {format} requires an archive layer name")]
    MissingArchiveLayer { layer: String, format: &'static str },

    #[error("layer '{layer}': archive layer name is only valid for archive formats")]
    UnexpectedArchiveLayer { layer: String },

    #[error("layer '{layer}': field map is empty")]
    EmptyFieldMap { layer: String },

    #[error("layer '{layer}': field map must produce an 'id' or 'name' field")]
    MissingIdentity { layer: String },

    #[error("layer '{layer}': output field '{field}' is mapped more than once")]
    DuplicateField { layer: String, field: String },

    #[error("layer '{0}' is declared more than once")]
    DuplicateLayer(String),

    #[error("layer '{layer}': invalid source url '{url}': {source}")]
    InvalidUrl {
        layer: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("layer '{layer}': unknown source CRS EPSG:{code}")]
    UnknownCrs { layer: String, code: u16 },

    #[error("invalid name '{0}': names must be non-empty and contain no path separators")]
    InvalidName(String),

    #[error("failed to parse state configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure to materialize one layer. Recorded per layer by the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not connect: {0}")]
    Network(#[source] reqwest::Error),

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("unreadable source data: {0}")]
    Format(String),

    #[error("source is missing required field '{field}'")]
    Schema { field: String },

    #[error("failed to reproject from EPSG:{code}: {reason}")]
    Reprojection { code: u16, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err)
        } else if err.is_connect() {
            FetchError::Network(err)
        } else {
            FetchError::Server(err.to_string())
        }
    }
}

impl From<zip::result::ZipError> for FetchError {
    fn from(err: zip::result::ZipError) -> Self {
        FetchError::Format(format!("bad archive: {}", err))
    }
}

/// Failure of a resolution run. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(
        "precinct {precinct} lies in {} '{boundary_type}' regions: {}",
        .regions.len(),
        .regions.join(", ")
    )]
    Ambiguous {
        precinct: String,
        boundary_type: String,
        regions: Vec<String>,
    },

    #[error("required input not found at {}; ensure it has been fetched", .0.display())]
    MissingInput(PathBuf),

    #[error("invalid layer artifact {}: {reason}", .path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
