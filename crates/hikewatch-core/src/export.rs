//! Flattening accumulated records into a shareable text file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::metric::MetricKind;
use crate::store::Readings;
use crate::{Error, Result};

/// Header line of every export file.
pub const EXPORT_HEADER: &str = "Heart Rate, Oxygen Saturation, HRV, Altitude, Timestamp";

/// Default export file name.
pub const DEFAULT_EXPORT_FILE: &str = "HealthData.csv";

/// One row of exported data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub heart_rate_variability: f64,
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl ExportRecord {
    /// Creates a record.
    pub fn new(
        heart_rate: f64,
        oxygen_saturation: f64,
        heart_rate_variability: f64,
        altitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            heart_rate,
            oxygen_saturation,
            heart_rate_variability,
            altitude,
            timestamp,
        }
    }

    /// Captures the current readings. Returns `None` unless every metric
    /// has a sample.
    pub fn from_readings(readings: &Readings, timestamp: DateTime<Utc>) -> Option<Self> {
        let value = |kind: MetricKind| readings.get(kind).map(|sample| sample.value());
        Some(Self::new(
            value(MetricKind::HeartRate)?,
            value(MetricKind::OxygenSaturation)?,
            value(MetricKind::HeartRateVariability)?,
            value(MetricKind::Altitude)?,
            timestamp,
        ))
    }

    /// Formats the record as one export row, without the newline.
    pub fn to_row(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            self.heart_rate,
            self.oxygen_saturation,
            self.heart_rate_variability,
            self.altitude,
            self.timestamp
        )
    }
}

/// Records accumulated during one session.
#[derive(Debug, Default)]
pub struct RecordLog {
    records: Vec<ExportRecord>,
}

impl RecordLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn push(&mut self, record: ExportRecord) {
        self.records.push(record);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[ExportRecord] {
        &self.records
    }
}

/// Renders records as export text: header, then one row per record, each
/// line newline-terminated.
pub fn render(records: &[ExportRecord]) -> Result<String> {
    if records.is_empty() {
        return Err(Error::EmptyExport);
    }

    let mut text = String::with_capacity(EXPORT_HEADER.len() + 1 + records.len() * 64);
    text.push_str(EXPORT_HEADER);
    text.push('\n');
    for record in records {
        text.push_str(&record.to_row());
        text.push('\n');
    }
    Ok(text)
}

/// Writes export files into a fixed directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
    file_name: String,
}

impl Exporter {
    /// Creates an exporter writing `dir/file_name`.
    pub fn new<P: AsRef<Path>>(dir: P, file_name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            file_name: file_name.to_string(),
        }
    }

    /// Creates an exporter writing the default file into the system temp dir.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir(), DEFAULT_EXPORT_FILE)
    }

    /// Path of the export file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Writes the records and returns the file path.
    ///
    /// Returns `None` when there is nothing to export or the write fails;
    /// the reason is logged.
    pub fn export(&self, records: &[ExportRecord]) -> Option<PathBuf> {
        match self.try_export(records) {
            Ok(path) => {
                info!("Export file created at: {}", path.display());
                Some(path)
            }
            Err(Error::EmptyExport) => {
                info!("No data to export");
                None
            }
            Err(e) => {
                warn!("Failed to write export file: {}", e);
                None
            }
        }
    }

    /// Writes the records, replacing any previous file in one rename.
    pub fn try_export(&self, records: &[ExportRecord]) -> Result<PathBuf> {
        let text = render(records)?;
        let path = self.path();
        let staging = self.dir.join(format!(".{}.tmp", self.file_name));
        std::fs::write(&staging, text)?;
        std::fs::rename(&staging, &path)?;
        Ok(path)
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::in_temp_dir()
    }
}
