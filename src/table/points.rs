//! Load the point table that drives the export run.

use crate::config::InputConfig;
use anyhow::{Context, Result};
use bytes::Bytes;
use csv::{ReaderBuilder, StringRecord, Trim};
use object_store::path::Path as StorePath;
use object_store::ObjectStore;
use std::io::Read;
use std::sync::Arc;

/// One input point. Coordinates are WGS84 decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Point identifier, truncated toward zero when written as a decimal
    pub index: i64,

    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,
}

/// Column layout of a point table.
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub delimiter: u8,
    pub index_column: String,
    pub lat_column: String,
    pub lon_column: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            index_column: "Index".to_string(),
            lat_column: "lat_decimal".to_string(),
            lon_column: "lon_decimal".to_string(),
        }
    }
}

impl From<&InputConfig> for TableLayout {
    fn from(input: &InputConfig) -> Self {
        Self {
            delimiter: input.delimiter_byte(),
            index_column: input.index_column.clone(),
            lat_column: input.lat_column.clone(),
            lon_column: input.lon_column.clone(),
        }
    }
}

/// A point table whose header has been checked.
///
/// Rows are held as raw text. Numeric conversion happens row by row in
/// [`PointTable::records`], so a bad value only surfaces when its row is reached.
pub struct PointTable {
    rows: Vec<StringRecord>,
    index_col: usize,
    lat_col: usize,
    lon_col: usize,
    layout: TableLayout,
}

impl PointTable {
    /// Open a table from a local path or `s3://` URI.
    pub async fn open(input: &InputConfig) -> Result<Self> {
        let (store, path) = crate::io::create_input_store(&input.path)?;
        Self::from_store(store, &path, TableLayout::from(input))
            .await
            .with_context(|| format!("Failed to load point table: {}", input.path))
    }

    /// Load a table from an object store.
    pub async fn from_store(
        store: Arc<dyn ObjectStore>,
        path: &StorePath,
        layout: TableLayout,
    ) -> Result<Self> {
        let bytes = store.get(path).await?.bytes().await?;
        Self::from_bytes(bytes, layout)
    }

    /// Load a table from in-memory bytes.
    pub fn from_bytes(bytes: Bytes, layout: TableLayout) -> Result<Self> {
        Self::from_reader(bytes.as_ref(), layout)
    }

    /// Load a table from any reader.
    pub fn from_reader<R: Read>(reader: R, layout: TableLayout) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(layout.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers().context("Failed to read table header")?.clone();
        let index_col = Self::find_column(&headers, &layout.index_column)?;
        let lat_col = Self::find_column(&headers, &layout.lat_column)?;
        let lon_col = Self::find_column(&headers, &layout.lon_column)?;

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            // Line numbers are 1-based and the header occupies line 1.
            let record = record.with_context(|| format!("Malformed table row at line {}", i + 2))?;
            rows.push(record);
        }

        tracing::info!("Loaded {} rows from point table", rows.len());

        Ok(Self {
            rows,
            index_col,
            lat_col,
            lon_col,
            layout,
        })
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert rows to point records, in file order.
    pub fn records(&self) -> impl Iterator<Item = Result<PointRecord>> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(move |(i, row)| self.parse_row(row).with_context(|| format!("Invalid point at line {}", i + 2)))
    }

    /// Convert every row, failing on the first bad one.
    pub fn load_points(&self) -> Result<Vec<PointRecord>> {
        self.records().collect()
    }

    fn parse_row(&self, row: &StringRecord) -> Result<PointRecord> {
        let index = self.parse_number(row, self.index_col, &self.layout.index_column)?;
        let latitude = self.parse_number(row, self.lat_col, &self.layout.lat_column)?;
        let longitude = self.parse_number(row, self.lon_col, &self.layout.lon_column)?;

        // i64::MAX is not representable; its nearest f64 is 2^63, which is out of range.
        let index = index.trunc();
        if index < i64::MIN as f64 || index >= i64::MAX as f64 {
            anyhow::bail!("Index {} in column '{}' is out of range", index, self.layout.index_column);
        }

        Ok(PointRecord {
            index: index as i64,
            latitude,
            longitude,
        })
    }

    fn parse_number(&self, row: &StringRecord, col: usize, name: &str) -> Result<f64> {
        let raw = row.get(col).unwrap_or("");
        if raw.is_empty() {
            anyhow::bail!("Missing value in column '{}'", name);
        }
        let value: f64 = raw
            .parse()
            .with_context(|| format!("Non-numeric value '{}' in column '{}'", raw, name))?;
        if !value.is_finite() {
            anyhow::bail!("Non-finite value '{}' in column '{}'", raw, name);
        }
        Ok(value)
    }

    fn find_column(headers: &StringRecord, name: &str) -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("Required column '{}' not found in table header", name))
    }
}
