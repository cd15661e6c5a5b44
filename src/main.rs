//! Sentinel-2 Point Export CLI
//!
//! Submits per-point spectral index time series exports to Earth Engine.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use s2_point_export::{build_runtime, plan_export, run_export, Config};

#[derive(Parser)]
#[command(name = "s2-point-export")]
#[command(about = "Export per-point Sentinel-2 index time series to CSV via Earth Engine", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override the point table location
    #[arg(long, global = true)]
    input: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one export task per point (default if no command specified)
    Run,

    /// Build every request and write it to disk without submitting
    Plan {
        /// Directory receiving one JSON file per point
        #[arg(short, long, default_value = "plan")]
        output: PathBuf,
    },

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => {
            let config = load_config(&cli.config, cli.input)?;
            let runtime = build_runtime()?;
            runtime.block_on(run_export(config))?;
        }

        Some(Commands::Plan { output }) => {
            let config = load_config(&cli.config, cli.input)?;
            let runtime = build_runtime()?;
            let stats = runtime.block_on(plan_export(config, &output))?;
            println!("Wrote {} plan files to {}", stats.tasks_submitted, output.display());
        }

        Some(Commands::Validate) => {
            let config = load_config(&cli.config, cli.input)?;
            config.validate()?;
            println!("Configuration is valid");
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

fn load_config(path: &PathBuf, input: Option<String>) -> Result<Config> {
    let mut config = Config::from_file(path)?;
    if let Some(input) = input {
        config.input.path = input;
    }
    Ok(config)
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    let yaml = r#"# Sentinel-2 Point Export Configuration

# === INPUT: Point table ===
input:
  # Local path or s3://bucket/key
  path: "points.tsv"

  # Field delimiter ("\t" for tab-separated, "," for CSV)
  delimiter: "\t"

  # Column names
  index_column: "Index"
  lat_column: "lat_decimal"
  lon_column: "lon_decimal"

# === QUERY: Scenes sampled for each point ===
query:
  collection: "COPERNICUS/S2_SR_HARMONIZED"

  # Date window, end exclusive
  start_date: "2017-01-01"
  end_date: "2024-12-31"

  # Buffer around each point, in meters
  buffer_radius_m: 50.0
  buffer_max_error_m: 0.0

  # Optional: only scenes from these MGRS tiles / relative orbits
  # tiles: ["30TWN"]
  # orbits: [51]

  # Optional: drop pixels by scene classification before computing indices
  # (SCL 3 = cloud shadow, 8/9 = cloud, 10 = cirrus)
  # mask:
  #   band: "SCL"
  #   exclude: [3, 8, 9, 10]

# === INDICES: How each exported band is computed ===
# kind: normalized_difference -> (a - b) / (a + b)
# kind: expression            -> band math over source bands, e.g. "(B8 - B11) / (B8 + B11)"
indices:
  NDVI:
    kind: normalized_difference
    bands: ["B8", "B4"]

  # AR and AS1 have no built-in formula. Fill these in before running.
  # AR:
  #   kind: expression
  #   expression: "..."
  # AS1:
  #   kind: expression
  #   expression: "..."

# === EXPORT: One CSV per point on Google Drive ===
export:
  selectors: ["NDVI", "AR", "AS1"]
  scale: 10.0
  file_format: "CSV"
  file_name_prefix: "time_series_point_"
  folder: "EarthEngineExports"

# === EARTH ENGINE: REST connection ===
earth_engine:
  # Cloud project the tasks run under
  # project: "my-project"

  # Environment variable holding an OAuth access token
  # e.g. export EARTHENGINE_TOKEN=$(gcloud auth print-access-token)
  access_token_env: "EARTHENGINE_TOKEN"

  connect_timeout_secs: 10
  request_timeout_secs: 60
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        let cli = Cli::try_parse_from(["s2-point-export"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().command.is_none());
    }

    #[test]
    fn test_cli_parse_plan_with_input() {
        let cli = Cli::try_parse_from(["s2-point-export", "plan", "-o", "out", "--input", "pts.csv"]).unwrap();
        assert_eq!(cli.input.as_deref(), Some("pts.csv"));
        assert!(matches!(cli.command, Some(Commands::Plan { .. })));
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["s2-point-export", "validate", "-c", "test.json"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_generated_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(path.clone()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.input.delimiter, '\t');
        assert_eq!(config.export.selectors, vec!["NDVI", "AR", "AS1"]);
        // AR and AS1 are left for the user to define.
        assert!(config.validate().is_err());
    }
}
