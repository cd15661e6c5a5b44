//! Sentinel-2 Point Export
//!
//! Submits one Earth Engine table export per point in a point table. Each export
//! produces a CSV time series of spectral indices computed over a small buffer
//! around the point.
//!
//! # Architecture
//!
//! The run consists of:
//!
//! - **Table**: point table loading from local disk or S3
//! - **Request**: per-point region, collection query and export descriptor
//! - **Expr**: expression graphs, band math and spectral indices
//! - **Earth Engine**: REST task submission (or plan files for dry runs)
//! - **Pipeline**: the sequential submission loop
//!
//! # Usage
//!
//! ```no_run
//! use s2_point_export::{Config, run_export};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     run_export(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod earthengine;
pub mod expr;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod request;
pub mod table;

pub use config::{Config, IndexDefinition};
pub use earthengine::{PlanTaskService, RestTaskService, TaskHandle, TaskService};
pub use pipeline::{RunStats, Runner};
pub use request::{ExportDescriptor, RequestBuilder};
pub use table::{PointRecord, PointTable};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Submit an export for every point in the configured table.
pub async fn run_export(config: Config) -> Result<RunStats> {
    config.validate()?;

    tracing::info!("Starting point export");
    let service = Arc::new(RestTaskService::from_config(&config.earth_engine)?);
    let summary = Runner::drive_summary(&config.export.folder);
    run_with_service(&config, service, summary).await
}

/// Build every request and write it under `output` without submitting anything.
pub async fn plan_export(config: Config, output: &Path) -> Result<RunStats> {
    config.validate()?;

    tracing::info!("Planning point export");
    let store = io::create_plan_store(output)?;
    let service = Arc::new(PlanTaskService::new(store));
    let summary = format!("All export requests have been written to {}.", output.display());
    run_with_service(&config, service, summary).await
}

/// Run the export loop against any task service, ending with `summary`.
pub async fn run_with_service(
    config: &Config,
    service: Arc<dyn TaskService>,
    summary: String,
) -> Result<RunStats> {
    tracing::info!("Loading point table from {}", config.input.path);
    let table = PointTable::open(&config.input).await?;

    let builder = RequestBuilder::new(config)?;
    let runner = Runner::new(builder, service, summary);
    runner.run(&table).await
}

/// Build a Tokio runtime for the CLI.
pub fn build_runtime() -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    Ok(builder.build()?)
}
