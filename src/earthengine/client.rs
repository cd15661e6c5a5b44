//! Export task submission.

use super::types::{Operation, TableExportRequest, TaskHandle};
use crate::config::EarthEngineConfig;
use crate::request::ExportDescriptor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Project used when none is configured.
const DEFAULT_PROJECT: &str = "earthengine-legacy";

/// Starts table export tasks.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Start an export. Returns once the task is queued, not when it finishes.
    async fn start_table_export(&self, descriptor: &ExportDescriptor) -> Result<TaskHandle>;
}

/// Earth Engine REST API client.
pub struct RestTaskService {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl RestTaskService {
    /// Create a client, reading the access token from the configured environment variable.
    pub fn from_config(config: &EarthEngineConfig) -> Result<Self> {
        let access_token = std::env::var(&config.access_token_env).with_context(|| {
            format!(
                "Earth Engine access token not found in ${} (e.g. export {}=$(gcloud auth print-access-token))",
                config.access_token_env, config.access_token_env
            )
        })?;
        Self::new(config, access_token)
    }

    /// Create a client with an explicit access token.
    pub fn new(config: &EarthEngineConfig, access_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let project = config.project.as_deref().unwrap_or(DEFAULT_PROJECT);
        let endpoint = format!(
            "{}/v1/projects/{}/table:export",
            config.api_base_url.trim_end_matches('/'),
            project
        );

        tracing::info!("Submitting exports to {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            access_token,
        })
    }

    /// URL export requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TaskService for RestTaskService {
    async fn start_table_export(&self, descriptor: &ExportDescriptor) -> Result<TaskHandle> {
        let body = TableExportRequest::from(descriptor);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Export request for '{}' failed", descriptor.description))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Export request for '{}' rejected with {}: {}",
                descriptor.description,
                status,
                text.trim()
            );
        }

        let operation: Operation = response
            .json()
            .await
            .context("Unexpected export response body")?;
        Ok(operation.into())
    }
}
