//! Remote boundary sources and their format adapters.
//!
//! Each [`SourceFormat`] has one adapter that turns a [`RequestDescriptor`]
//! into a [`RawTable`]; [`fetch_raw`] dispatches on the format.

pub mod archive;
pub mod descriptor;
pub mod feature_service;
pub mod geodatabase;
pub mod shapefiles;
mod table;

pub use descriptor::{FieldMap, RequestDescriptor, SourceFormat};
pub use table::{RawRow, RawTable, SourceCrs};

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;

use crate::error::FetchError;

const USER_AGENT: &str = "precinct-mapper/0.1 (boundary ingest)";

/// HTTP client shared by every adapter of a run.
///
/// `timeout` applies to each request individually.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Retrieve a source into a raw table with the adapter for its format.
///
/// Archive formats are extracted below `temp_root`; decoding runs on the
/// blocking pool and the extraction directory is gone when this returns.
pub async fn fetch_raw(
    client: &Client,
    descriptor: &RequestDescriptor,
    temp_root: PathBuf,
) -> Result<RawTable, FetchError> {
    let read_layer: fn(&Path, &str) -> Result<RawTable, FetchError> = match descriptor.format() {
        SourceFormat::FeatureService => return feature_service::fetch(client, descriptor).await,
        SourceFormat::Shapefile => shapefiles::read_layer,
        SourceFormat::Geodatabase => geodatabase::read_layer,
    };
    let layer = descriptor
        .archive_layer()
        .ok_or_else(|| FetchError::Format("archive layer name missing".to_string()))?
        .to_string();

    let bytes = archive::download(client, descriptor).await?;
    tokio::task::spawn_blocking(move || {
        let extracted = archive::extract(&bytes, &temp_root)?;
        read_layer(extracted.root(), &layer)
    })
    .await
    .map_err(|e| FetchError::Io(std::io::Error::other(e)))?
}
