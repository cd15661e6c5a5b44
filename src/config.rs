//! Configuration for the point export run.
//!
//! Every default mirrors the values the export workflow has always used. A run
//! needs the input path plus formulas for any selected band without a default.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration for an export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Point table location and layout
    pub input: InputConfig,

    /// Image collection query
    #[serde(default)]
    pub query: QueryConfig,

    /// Spectral index definitions, keyed by output band name
    #[serde(default = "default_indices")]
    pub indices: BTreeMap<String, IndexDefinition>,

    /// Export task parameters
    #[serde(default)]
    pub export: ExportConfig,

    /// Earth Engine connection settings
    #[serde(default)]
    pub earth_engine: EarthEngineConfig,
}

/// Point table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Local path or `s3://bucket/key` URI of the point table
    pub path: String,

    /// Field delimiter (a single byte, default tab)
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Column holding the point identifier
    #[serde(default = "default_index_column")]
    pub index_column: String,

    /// Column holding latitude in decimal degrees
    #[serde(default = "default_lat_column")]
    pub lat_column: String,

    /// Column holding longitude in decimal degrees
    #[serde(default = "default_lon_column")]
    pub lon_column: String,
}

impl InputConfig {
    /// Delimiter as the byte the csv reader expects.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}

/// Image collection query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Image collection identifier
    #[serde(default = "default_collection")]
    pub collection: String,

    /// First day of the date window (inclusive, YYYY-MM-DD)
    #[serde(default = "default_start_date")]
    pub start_date: String,

    /// End of the date window (exclusive, YYYY-MM-DD)
    #[serde(default = "default_end_date")]
    pub end_date: String,

    /// Buffer radius around each point, in meters
    #[serde(default = "default_buffer_radius")]
    pub buffer_radius_m: f64,

    /// Maximum buffer error, in meters
    #[serde(default)]
    pub buffer_max_error_m: f64,

    /// Restrict scenes to these MGRS tiles (e.g. "30TVK")
    #[serde(default)]
    pub tiles: Option<Vec<String>>,

    /// Restrict scenes to these relative orbit numbers
    #[serde(default)]
    pub orbits: Option<Vec<u32>>,

    /// Per-pixel quality mask applied to each scene before indices are computed
    #[serde(default)]
    pub mask: Option<QualityMask>,
}

/// Masks out pixels whose classification band holds any of `exclude`.
///
/// For `COPERNICUS/S2_SR_HARMONIZED` this is typically `SCL` with
/// `[3, 8, 9, 10]` (cloud shadow, medium/high cloud, cirrus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMask {
    /// Classification band read from the scene
    pub band: String,

    /// Class values to drop
    pub exclude: Vec<u32>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            start_date: default_start_date(),
            end_date: default_end_date(),
            buffer_radius_m: default_buffer_radius(),
            buffer_max_error_m: 0.0,
            tiles: None,
            orbits: None,
            mask: None,
        }
    }
}

/// How an output band is derived from a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexDefinition {
    /// `(a - b) / (a + b)` over two source bands
    NormalizedDifference { bands: [String; 2] },

    /// Band-math expression, e.g. `(B8 - B11) / (B8 + B11)`
    Expression { expression: String },
}

/// Export task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Bands written as CSV columns, in order
    #[serde(default = "default_selectors")]
    pub selectors: Vec<String>,

    /// Sampling scale in meters
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Output file format
    #[serde(default = "default_file_format")]
    pub file_format: String,

    /// File name prefix; the point index is appended
    #[serde(default = "default_file_name_prefix")]
    pub file_name_prefix: String,

    /// Drive folder receiving the exports
    #[serde(default = "default_folder")]
    pub folder: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            selectors: default_selectors(),
            scale: default_scale(),
            file_format: default_file_format(),
            file_name_prefix: default_file_name_prefix(),
            folder: default_folder(),
        }
    }
}

/// Earth Engine REST connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarthEngineConfig {
    /// Cloud project the export tasks are billed to
    #[serde(default)]
    pub project: Option<String>,

    /// REST API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Environment variable holding an OAuth access token
    #[serde(default = "default_token_env")]
    pub access_token_env: String,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for EarthEngineConfig {
    fn default() -> Self {
        Self {
            project: None,
            api_base_url: default_api_base_url(),
            access_token_env: default_token_env(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Configuration with defaults for everything but the input path.
    pub fn with_input(path: impl Into<String>) -> Self {
        Self {
            input: InputConfig {
                path: path.into(),
                delimiter: default_delimiter(),
                index_column: default_index_column(),
                lat_column: default_lat_column(),
                lon_column: default_lon_column(),
            },
            query: QueryConfig::default(),
            indices: default_indices(),
            export: ExportConfig::default(),
            earth_engine: EarthEngineConfig::default(),
        }
    }

    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input.path.is_empty() {
            anyhow::bail!("input.path must be set");
        }
        if !self.input.delimiter.is_ascii() {
            anyhow::bail!("input.delimiter must be a single ASCII character");
        }

        let start = parse_date(&self.query.start_date)?;
        let end = parse_date(&self.query.end_date)?;
        if end < start {
            anyhow::bail!(
                "query.end_date ({}) is before query.start_date ({})",
                self.query.end_date,
                self.query.start_date
            );
        }
        if !self.query.buffer_radius_m.is_finite() || self.query.buffer_radius_m < 0.0 {
            anyhow::bail!("query.buffer_radius_m must be >= 0");
        }
        if !self.query.buffer_max_error_m.is_finite() || self.query.buffer_max_error_m < 0.0 {
            anyhow::bail!("query.buffer_max_error_m must be >= 0");
        }
        if let Some(mask) = &self.query.mask {
            if mask.band.is_empty() {
                anyhow::bail!("query.mask.band must be set");
            }
            if mask.exclude.is_empty() {
                anyhow::bail!("query.mask.exclude must list at least one class value");
            }
        }

        if self.export.selectors.is_empty() {
            anyhow::bail!("export.selectors must name at least one band");
        }
        let undefined: Vec<&str> = self
            .export
            .selectors
            .iter()
            .filter(|band| !self.indices.contains_key(band.as_str()))
            .map(String::as_str)
            .collect();
        if !undefined.is_empty() {
            anyhow::bail!(
                "No index definition for selected band(s): {} (add them under `indices`)",
                undefined.join(", ")
            );
        }
        if !self.export.scale.is_finite() || self.export.scale <= 0.0 {
            anyhow::bail!("export.scale must be > 0");
        }
        if self.export.folder.is_empty() {
            anyhow::bail!("export.folder must be set");
        }
        Ok(())
    }
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{}': {} (expected YYYY-MM-DD)", value, e))
}

/// Default index set: NDVI only. The remaining exported bands have no agreed
/// formula and must be supplied in the config.
fn default_indices() -> BTreeMap<String, IndexDefinition> {
    let mut indices = BTreeMap::new();
    indices.insert(
        "NDVI".to_string(),
        IndexDefinition::NormalizedDifference {
            bands: ["B8".to_string(), "B4".to_string()],
        },
    );
    indices
}

// Default value functions for serde
fn default_delimiter() -> char { '\t' }
fn default_index_column() -> String { "Index".to_string() }
fn default_lat_column() -> String { "lat_decimal".to_string() }
fn default_lon_column() -> String { "lon_decimal".to_string() }
fn default_collection() -> String { "COPERNICUS/S2_SR_HARMONIZED".to_string() }
fn default_start_date() -> String { "2017-01-01".to_string() }
fn default_end_date() -> String { "2024-12-31".to_string() }
fn default_buffer_radius() -> f64 { 50.0 }
fn default_selectors() -> Vec<String> {
    vec!["NDVI".to_string(), "AR".to_string(), "AS1".to_string()]
}
fn default_scale() -> f64 { 10.0 }
fn default_file_format() -> String { "CSV".to_string() }
fn default_file_name_prefix() -> String { "time_series_point_".to_string() }
fn default_folder() -> String { "EarthEngineExports".to_string() }
fn default_api_base_url() -> String { "https://earthengine.googleapis.com".to_string() }
fn default_token_env() -> String { "EARTHENGINE_TOKEN".to_string() }
fn default_connect_timeout() -> u64 { 10 }
fn default_request_timeout() -> u64 { 60 }

#[cfg(test)]
pub(crate) fn test_config(path: &str) -> Config {
    let mut config = Config::with_input(path);
    config.indices.insert(
        "AR".to_string(),
        IndexDefinition::Expression { expression: "B11 / B8".to_string() },
    );
    config.indices.insert(
        "AS1".to_string(),
        IndexDefinition::Expression { expression: "(B8 - B11) / (B8 + B11)".to_string() },
    );
    config
}
