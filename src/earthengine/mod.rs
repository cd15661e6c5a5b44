//! Earth Engine export task submission.

mod client;
mod plan;
mod types;

pub use client::{RestTaskService, TaskService};
pub use plan::PlanTaskService;
pub use types::{DriveDestination, FileExportOptions, Operation, TableExportRequest, TaskHandle};
