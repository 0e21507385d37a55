//! CSV assembly, sanitization and export hand-off
//!
//! [`assemble`] writes mapped rows under the fixed [`COLUMNS`] header.
//! [`sanitize`] then re-parses the text and normalizes the numeric columns the
//! listing site is strict about; running it twice changes nothing.

use crate::error::{Error, Result};
use crate::mapper::FALLBACK_CATEGORY;
use crate::types::{COLUMNS, MappingFailure, OutputRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Default written when a price is missing or unparseable
pub const DEFAULT_PRICE: &str = "0.00";

/// Default written when a quantity is missing or unparseable
pub const DEFAULT_QUANTITY: &str = "1";

/// Header of the failure report
pub const FAILURE_COLUMNS: [&str; 2] = ["Lot Number", "Failure Message"];

fn writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::Other(format!("export is not valid UTF-8: {e}")))
}

/// Write rows under the fixed header; unset columns are written as empty strings
pub fn assemble(rows: &[OutputRow]) -> Result<String> {
    let mut writer = writer();
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record(row.values())?;
    }
    finish(writer)
}

/// Normalize Price, Quantity and Category in an assembled export
///
/// - Price: two decimals, `0.00` when missing or unparseable
/// - Quantity: integer, `1` when missing or unparseable
/// - Category: integer, the fallback category when missing or unparseable
///
/// Every other cell is passed through untouched.
pub fn sanitize(csv_text: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let headers = reader.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let price_col = position("Price");
    let quantity_col = position("Quantity");
    let category_col = position("Category");
    let fallback_category = FALLBACK_CATEGORY.to_string();

    let mut writer = writer();
    writer.write_record(&headers)?;

    for record in reader.records() {
        let record = record?;
        let mut cells: Vec<String> = (0..headers.len())
            .map(|i| record.get(i).unwrap_or("").to_string())
            .collect();

        if let Some(i) = price_col {
            cells[i] = normalize_price(&cells[i]).unwrap_or_else(|| DEFAULT_PRICE.to_string());
        }
        if let Some(i) = quantity_col {
            cells[i] = normalize_integer(&cells[i]).unwrap_or_else(|| DEFAULT_QUANTITY.to_string());
        }
        if let Some(i) = category_col {
            cells[i] = normalize_integer(&cells[i]).unwrap_or_else(|| fallback_category.clone());
        }

        writer.write_record(&cells)?;
    }

    finish(writer)
}

fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let value = value.strip_prefix('$').unwrap_or(value);
    value
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

fn normalize_price(value: &str) -> Option<String> {
    parse_number(value).map(|n| format!("{n:.2}"))
}

fn normalize_integer(value: &str) -> Option<String> {
    parse_number(value).map(|n| format!("{}", n.trunc() as i64))
}

/// Two-column report of records that could not be mapped
pub fn failures_csv(failures: &[MappingFailure]) -> Result<String> {
    let mut writer = writer();
    writer.write_record(FAILURE_COLUMNS)?;
    for failure in failures {
        writer.write_record([failure.lot_number.as_str(), failure.message.as_str()])?;
    }
    finish(writer)
}

/// Finished output of one run
#[derive(Clone, Debug)]
pub struct ExportArtifact {
    /// Business event the export belongs to
    pub event_id: String,
    /// Run that produced it
    pub run_id: String,
    /// Sanitized export
    pub csv: String,
    /// Records left out of the export
    pub failures: Vec<MappingFailure>,
    /// When the export was assembled
    pub created_at: DateTime<Utc>,
}

impl ExportArtifact {
    /// Number of data rows in the export
    pub fn row_count(&self) -> usize {
        csv::Reader::from_reader(self.csv.as_bytes())
            .records()
            .count()
    }
}

/// Persists finished exports
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Store the export of a run
    async fn persist(&self, artifact: &ExportArtifact) -> Result<()>;
}

/// Hands a finished export to the listing site
///
/// Implementations own all site-specific automation and report success only
/// once the site has confirmed the import.
#[async_trait]
pub trait SiteUploader: Send + Sync {
    /// Submit the export for an event
    async fn upload(&self, event_id: &str, csv: &str) -> Result<()>;
}

/// Writes `<dir>/<event>.csv` and, when needed, `<dir>/<event>-FAILED.csv`
#[derive(Clone, Debug)]
pub struct FileExportSink {
    dir: PathBuf,
}

impl FileExportSink {
    /// Sink writing into `dir` (created on first use)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the export for an event
    pub fn export_path(&self, event_id: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", file_stem(event_id)))
    }

    /// Path of the failure report for an event
    pub fn failures_path(&self, event_id: &str) -> PathBuf {
        self.dir.join(format!("{}-FAILED.csv", file_stem(event_id)))
    }

    /// Directory exports are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn file_stem(event_id: &str) -> String {
    event_id
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect()
}

#[async_trait]
impl ExportSink for FileExportSink {
    async fn persist(&self, artifact: &ExportArtifact) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.export_path(&artifact.event_id);
        tokio::fs::write(&path, artifact.csv.as_bytes()).await?;

        if !artifact.failures.is_empty() {
            let failures_path = self.failures_path(&artifact.event_id);
            tokio::fs::write(&failures_path, failures_csv(&artifact.failures)?).await?;
            tracing::info!(
                path = %failures_path.display(),
                failures = artifact.failures.len(),
                "failure report written"
            );
        }

        tracing::info!(
            path = %path.display(),
            rows = artifact.row_count(),
            run_id = %artifact.run_id,
            "export written"
        );
        Ok(())
    }
}
