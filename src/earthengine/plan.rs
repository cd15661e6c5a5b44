//! Dry-run task service that writes request bodies instead of submitting them.

use super::client::TaskService;
use super::types::{TableExportRequest, TaskHandle};
use crate::geometry::Bounds;
use crate::request::ExportDescriptor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};
use serde::Serialize;
use std::sync::Arc;

/// One plan file: the request body plus what it was built from.
#[derive(Debug, Serialize)]
struct PlanEntry {
    point_index: i64,
    center: [f64; 2],
    bounds_wgs84: Bounds,
    scale: f64,
    request: TableExportRequest,
}

/// Writes `<file_name_prefix>.json` per export into a store.
pub struct PlanTaskService {
    store: Arc<dyn ObjectStore>,
}

impl PlanTaskService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskService for PlanTaskService {
    async fn start_table_export(&self, descriptor: &ExportDescriptor) -> Result<TaskHandle> {
        let entry = PlanEntry {
            point_index: descriptor.point_index,
            center: [descriptor.region.longitude, descriptor.region.latitude],
            bounds_wgs84: descriptor.region.bounds_wgs84(),
            scale: descriptor.scale,
            request: TableExportRequest::from(descriptor),
        };
        let json = serde_json::to_vec_pretty(&entry)?;

        let name = format!("{}.json", descriptor.file_name_prefix);
        let path = StorePath::from(name.as_str());
        self.store
            .put(&path, PutPayload::from(json))
            .await
            .with_context(|| format!("Failed to write plan file {}", name))?;

        Ok(TaskHandle {
            name: format!("plan/{}", name),
        })
    }
}
