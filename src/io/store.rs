//! Object store configuration for S3 and local filesystem access.
//!
//! Point tables may live on local disk or in S3. Plan output is always local.

use anyhow::{Context, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use std::sync::Arc;
use std::time::Duration;

/// Parse an S3 URI into bucket and key components.
///
/// Accepts URIs in the format `s3://bucket/key/path`.
///
/// # Errors
/// Returns an error if the URI is malformed (missing scheme, bucket, or key).
pub fn parse_s3_uri(uri: &str) -> Result<(&str, &str)> {
    let without_scheme = uri
        .strip_prefix("s3://")
        .with_context(|| format!("Invalid S3 URI: expected 's3://' prefix in '{}'", uri))?;

    without_scheme
        .split_once('/')
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .with_context(|| format!("Invalid S3 URI: expected 's3://bucket/key' format in '{}'", uri))
}

/// Whether a location refers to S3 rather than the local filesystem.
pub fn is_s3_uri(location: &str) -> bool {
    location.starts_with("s3://")
}

fn create_client_options() -> ClientOptions {
    ClientOptions::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(30))
}

fn create_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        backoff: object_store::BackoffConfig {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            base: 2.0,
        },
        retry_timeout: Duration::from_secs(60),
    }
}

/// Create an S3 client for reading a point table.
///
/// Credentials and region are loaded from the environment
/// (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION, or instance profile).
pub fn create_s3_store(bucket: &str) -> Result<Arc<dyn ObjectStore>> {
    tracing::info!("Creating S3 client for bucket: {}", bucket);

    let builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_client_options(create_client_options())
        .with_retry(create_retry_config());

    Ok(Arc::new(builder.build()?))
}

/// Resolve a table location into a store and the object path within it.
pub fn create_input_store(location: &str) -> Result<(Arc<dyn ObjectStore>, StorePath)> {
    if is_s3_uri(location) {
        let (bucket, key) = parse_s3_uri(location)?;
        let store = create_s3_store(bucket)?;
        Ok((store, StorePath::from(key)))
    } else {
        let path = std::path::Path::new(location);
        let store = LocalFileSystem::new();
        let store_path = StorePath::from_filesystem_path(path)
            .with_context(|| format!("Point table not found: {}", location))?;
        Ok((Arc::new(store), store_path))
    }
}

/// Create a local store rooted at `dir` for writing plan files.
pub fn create_plan_store(dir: &std::path::Path) -> Result<Arc<dyn ObjectStore>> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create plan directory: {}", dir.display()))?;
    }
    tracing::info!("Writing plan files to: {}", dir.display());
    Ok(Arc::new(LocalFileSystem::new_with_prefix(dir)?))
}
