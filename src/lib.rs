//! Precinct Mapper - fetches precinct and district boundaries from public GIS
//! services and resolves which region of every layer each precinct lies in.
//!
//! This library provides shared types and modules for the ingest and resolve binaries.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod pip;
pub mod sources;
pub mod store;

pub use config::{StateConfig, StatePlan};
pub use error::{ConfigError, FetchError, ResolveError};
pub use fetcher::{FetchContext, FetchReport, StateFetcher};
pub use models::{BoundaryRecord, BoundaryShape, HierarchyRow, Layer, LayerKey, Scope};
pub use pip::{resolve, HierarchyResolver};
pub use store::DatasetLayout;
