//! REST request and response bodies for table exports.

use crate::expr::Expression;
use crate::request::ExportDescriptor;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/projects/{project}/table:export`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExportRequest {
    pub expression: Expression,
    pub description: String,
    pub selectors: Vec<String>,
    pub file_export_options: FileExportOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExportOptions {
    pub file_format: String,
    pub drive_destination: DriveDestination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveDestination {
    pub folder: String,
    pub filename_prefix: String,
}

impl From<&ExportDescriptor> for TableExportRequest {
    fn from(descriptor: &ExportDescriptor) -> Self {
        Self {
            expression: Expression::encode(&descriptor.collection),
            description: descriptor.description.clone(),
            selectors: descriptor.selectors.clone(),
            file_export_options: FileExportOptions {
                file_format: descriptor.file_format.clone(),
                drive_destination: DriveDestination {
                    folder: descriptor.folder.clone(),
                    filename_prefix: descriptor.file_name_prefix.clone(),
                },
            },
        }
    }
}

/// Long-running operation returned when a task starts.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
}

/// Handle of a started task. The run logs it and never polls it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Full operation name, e.g. `projects/p/operations/ABC`
    pub name: String,
}

impl TaskHandle {
    /// Trailing component of the operation name.
    pub fn task_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl From<Operation> for TaskHandle {
    fn from(op: Operation) -> Self {
        Self { name: op.name }
    }
}
