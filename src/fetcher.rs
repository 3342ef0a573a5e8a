//! Fetch orchestration for a state's boundary layers.
//!
//! Every planned layer is fetched, normalized and written independently:
//! layers run concurrently up to the configured limit, a failure is recorded
//! against its layer and never stops the others, and layers whose artifact
//! already exists are skipped without touching the network unless
//! `overwrite` is set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{error, info, info_span, Instrument};

use crate::config::{PlannedLayer, StatePlan};
use crate::error::FetchError;
use crate::models::LayerKey;
use crate::normalize::{normalize, NormalizeOptions};
use crate::sources::{self, RequestDescriptor};
use crate::store::{self, DatasetLayout};

/// Everything a fetch run needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct FetchContext {
    client: Client,
    layout: DatasetLayout,
    temp_root: PathBuf,
    concurrency: usize,
    reproject: bool,
}

impl FetchContext {
    /// Context writing under `layout`, with a per-request `timeout`.
    pub fn new(layout: DatasetLayout, timeout: Duration) -> Result<Self, FetchError> {
        let client = sources::http_client(timeout)?;
        let temp_root = layout.root().join("temp");
        Ok(Self {
            client,
            layout,
            temp_root,
            concurrency: 4,
            reproject: false,
        })
    }

    /// Where archive extractions get their private directories
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    /// Maximum number of layers in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Force reprojection of every layer to WGS84
    pub fn with_reproject(mut self, reproject: bool) -> Self {
        self.reproject = reproject;
        self
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }
}

/// Result of one layer's fetch.
#[derive(Debug)]
pub enum LayerOutcome {
    Written {
        key: LayerKey,
        path: PathBuf,
        records: usize,
    },
    Skipped {
        key: LayerKey,
        path: PathBuf,
    },
    Failed {
        key: LayerKey,
        error: FetchError,
    },
}

impl LayerOutcome {
    pub fn key(&self) -> &LayerKey {
        match self {
            LayerOutcome::Written { key, .. }
            | LayerOutcome::Skipped { key, .. }
            | LayerOutcome::Failed { key, .. } => key,
        }
    }
}

/// Summary of a state fetch, each list ordered by layer key.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub written: Vec<LayerKey>,
    pub skipped: Vec<LayerKey>,
    pub failed: Vec<(LayerKey, FetchError)>,
}

impl FetchReport {
    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, outcome: LayerOutcome) {
        match outcome {
            LayerOutcome::Written { key, .. } => self.written.push(key),
            LayerOutcome::Skipped { key, .. } => self.skipped.push(key),
            LayerOutcome::Failed { key, error } => self.failed.push((key, error)),
        }
    }

    fn sort(&mut self) {
        self.written.sort();
        self.skipped.sort();
        self.failed.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

/// Fetches every layer of a state plan into the dataset tree.
pub struct StateFetcher {
    ctx: FetchContext,
}

impl StateFetcher {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &FetchContext {
        &self.ctx
    }

    /// Fetch all layers of `plan`.
    pub async fn fetch_state(&self, plan: &StatePlan, overwrite: bool) -> FetchReport {
        self.fetch_state_with(plan, overwrite, |_| {}).await
    }

    /// Fetch all layers of `plan`, calling `on_outcome` as each one finishes.
    pub async fn fetch_state_with<F>(
        &self,
        plan: &StatePlan,
        overwrite: bool,
        mut on_outcome: F,
    ) -> FetchReport
    where
        F: FnMut(&LayerOutcome),
    {
        info!(
            "Fetching {} layers for {} ({} in flight)",
            plan.layers.len(),
            plan.code,
            self.ctx.concurrency
        );

        let mut outcomes = stream::iter(plan.layers.iter())
            .map(|layer| self.fetch_layer(&plan.code, layer, overwrite))
            .buffer_unordered(self.ctx.concurrency);

        let mut report = FetchReport::default();
        while let Some(outcome) = outcomes.next().await {
            on_outcome(&outcome);
            report.record(outcome);
        }
        report.sort();

        info!(
            "{}: {} written, {} skipped, {} failed",
            plan.code,
            report.written.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    async fn fetch_layer(&self, state: &str, layer: &PlannedLayer, overwrite: bool) -> LayerOutcome {
        let span = info_span!("layer", key = %layer.key);
        async move {
            let key = layer.key.clone();
            let path = self.ctx.layout.artifact_path(state, &key);

            if !overwrite && path.exists() {
                info!("Artifact {} exists, skipping", path.display());
                return LayerOutcome::Skipped { key, path };
            }

            match self.materialize(&layer.descriptor, &path).await {
                Ok(records) => {
                    info!("Wrote {} records to {}", records, path.display());
                    LayerOutcome::Written { key, path, records }
                }
                Err(error) => {
                    error!("Failed to fetch layer: {}", error);
                    LayerOutcome::Failed { key, error }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fetch, normalize and write one layer, returning the record count.
    async fn materialize(&self, descriptor: &RequestDescriptor, path: &Path) -> Result<usize, FetchError> {
        let table =
            sources::fetch_raw(&self.ctx.client, descriptor, self.ctx.temp_root.clone()).await?;

        let options = NormalizeOptions {
            reproject: self.ctx.reproject,
            source_crs: descriptor.source_crs(),
        };
        let field_map = descriptor.field_map().clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let records = normalize(table, &field_map, &options)?;
            store::write_records(&path, &records)?;
            Ok(records.len())
        })
        .await
        .map_err(|e| FetchError::Io(std::io::Error::other(e)))?
    }
}
