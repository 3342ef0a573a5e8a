//! Zip archive download and extraction.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use reqwest::Client;
use tempfile::{Builder, TempDir};
use tracing::{debug, info};

use super::RequestDescriptor;
use crate::error::FetchError;

/// An archive extracted into a private temporary directory.
///
/// The directory, and everything extracted into it, is removed when this
/// value is dropped.
pub struct ExtractedArchive {
    dir: TempDir,
    root: PathBuf,
}

impl ExtractedArchive {
    /// The first top-level subdirectory of the archive
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The temporary directory the archive was extracted into
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Download the archive a descriptor points at.
pub async fn download(client: &Client, descriptor: &RequestDescriptor) -> Result<Vec<u8>, FetchError> {
    info!("Downloading archive for {}", descriptor.layer_name());
    let response = client.get(descriptor.source_url().clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Server(format!(
            "HTTP {} from {}",
            status,
            descriptor.source_url()
        )));
    }
    let body = response.bytes().await?;
    debug!("Downloaded {} bytes", body.len());
    Ok(body.to_vec())
}

/// Extract a zip archive under `temp_root` and locate its top-level directory.
pub fn extract(bytes: &[u8], temp_root: &Path) -> Result<ExtractedArchive, FetchError> {
    fs::create_dir_all(temp_root)?;
    let dir = Builder::new()
        .prefix("precinct-fetch-")
        .tempdir_in(temp_root)?;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    archive.extract(dir.path())?;
    debug!(
        "Extracted {} entries into {}",
        archive.len(),
        dir.path().display()
    );

    let root = first_subdirectory(dir.path())?;
    Ok(ExtractedArchive { dir, root })
}

/// First subdirectory of `dir` in name order.
fn first_subdirectory(dir: &Path) -> Result<PathBuf, FetchError> {
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();
    subdirs
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Format("archive has no top-level directory".to_string()))
}
