//! Boundary ingest pipeline.
//!
//! Reads a state configuration, fetches every declared layer from its
//! source and writes one GeoJSON artifact per layer under the dataset root.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use precinct_mapper::fetcher::LayerOutcome;
use precinct_mapper::sources::{geodatabase, SourceFormat};
use precinct_mapper::{DatasetLayout, FetchContext, StateConfig, StateFetcher};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Fetch a state's precinct and district boundaries")]
#[command(long_about = "Fetch a state's precinct and district boundaries.\n\n\
Layers in file geodatabase format (`format = \"geodatabase\"`) are decoded \
with GDAL and need a build with `--features geodatabase`; without it those \
layers fail and the rest of the run continues.")]
struct Args {
    /// State configuration file
    #[arg(short, long, default_value = "config/wa.toml")]
    config: PathBuf,

    /// Refetch layers whose artifact already exists
    #[arg(long)]
    overwrite: bool,

    /// Dataset root (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Maximum layers fetched at once (overrides the config file)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds (overrides the config file)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Reproject every layer to WGS84, even when it already declares it
    #[arg(long)]
    reproject: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Precinct Mapper Ingest");
    info!("Config: {}", args.config.display());

    let config = StateConfig::load_from_file(&args.config)?;
    let plan = config.plan().context("Invalid state configuration")?;

    if !geodatabase::SUPPORTED {
        for layer in plan
            .layers
            .iter()
            .filter(|l| l.descriptor.format() == SourceFormat::Geodatabase)
        {
            warn!(
                "{} is a geodatabase layer; this build lacks the `geodatabase` feature and will fail it",
                layer.key
            );
        }
    }

    let fetch = &config.fetch;
    let data_dir = args.data_dir.clone().unwrap_or_else(|| fetch.data_dir.clone());
    let timeout = Duration::from_secs(args.timeout_secs.unwrap_or(fetch.timeout_secs));
    let layout = DatasetLayout::new(&data_dir);
    let temp_root = fetch
        .temp_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("temp"));

    let ctx = FetchContext::new(layout, timeout)
        .context("Failed to build HTTP client")?
        .with_temp_root(temp_root)
        .with_concurrency(args.concurrency.unwrap_or(fetch.concurrency))
        .with_reproject(args.reproject || fetch.reproject);
    let fetcher = StateFetcher::new(ctx);

    info!(
        "Fetching {} layers for {} into {}",
        plan.layers.len(),
        plan.code,
        data_dir.display()
    );

    let pb = ProgressBar::new(plan.layers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let run = fetcher.fetch_state_with(&plan, args.overwrite, |outcome: &LayerOutcome| {
        pb.set_message(outcome.key().to_string());
        pb.inc(1);
    });

    let report = tokio::select! {
        report = run => report,
        _ = tokio::signal::ctrl_c() => {
            pb.abandon_with_message("interrupted");
            // Finished layers were written atomically, a re-run picks up the rest
            warn!("Interrupted, outstanding requests aborted");
            anyhow::bail!("ingest interrupted");
        }
    };
    pb.finish_with_message("done");

    info!(
        "{} layers written, {} already present",
        report.written_count(),
        report.skipped.len()
    );

    if !report.is_complete() {
        for (key, err) in &report.failed {
            error!("{}: {}", key, err);
        }
        anyhow::bail!("{} of {} layers failed", report.failed.len(), plan.layers.len());
    }

    Ok(())
}
