//! Precinct hierarchy resolution.
//!
//! Loads a state's fetched layers, assigns every precinct the region it lies
//! in for each boundary type and writes the result as CSV.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use precinct_mapper::store::write_hierarchy_csv;
use precinct_mapper::{DatasetLayout, HierarchyResolver, StateConfig};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "resolve")]
#[command(about = "Resolve the region hierarchy of every precinct in a state")]
struct Args {
    /// State configuration file
    #[arg(short, long, default_value = "config/wa.toml")]
    config: PathBuf,

    /// Dataset root (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output CSV file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = StateConfig::load_from_file(&args.config)?;
    let plan = config.plan().context("Invalid state configuration")?;
    let data_dir = args.data_dir.unwrap_or_else(|| config.fetch.data_dir.clone());
    let layout = DatasetLayout::new(data_dir);

    info!("Resolving {} from {}", plan.code, layout.root().display());

    let dataset = layout.load_state(&plan.code, &config.state.excluded_layers)?;
    let resolver = HierarchyResolver::new(dataset.layers);
    let rows = resolver.resolve(dataset.precincts)?;
    let boundary_types: Vec<&str> = resolver.boundary_types().collect();

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_hierarchy_csv(BufWriter::new(file), &boundary_types, &rows)?;
            info!("Wrote {} rows to {}", rows.len(), path.display());
        }
        None => write_hierarchy_csv(io::stdout().lock(), &boundary_types, &rows)?,
    }

    Ok(())
}
