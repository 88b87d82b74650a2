//! Application state management.

use chrono::{DateTime, Utc};
use hikewatch_core::export::render;
use hikewatch_core::{
    ExportRecord, Exporter, MetricKind, MetricSample, MonitorHandle, MonitoringState, Readings,
    RecordLog, Transport,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::info;

use crate::config::{Config, Role};
use crate::peer::TcpTransport;

/// Errors from control requests.
#[derive(Debug, Error)]
pub enum StateError {
    /// The request needs the record log, which only the primary keeps.
    #[error("{0} is only available on the primary")]
    PrimaryOnly(&'static str),

    /// A snapshot was requested before every metric had a sample.
    #[error("No {0} reading yet")]
    MissingReading(MetricKind),

    /// A record value is not a finite number.
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },
}

/// One metric slot as shown to users.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingView {
    pub metric: &'static str,
    pub label: &'static str,
    pub value: Option<f64>,
    pub display: String,
    pub captured_at: Option<DateTime<Utc>>,
}

impl ReadingView {
    /// Builds the view of one slot.
    pub fn new(kind: MetricKind, sample: Option<MetricSample>) -> Self {
        Self {
            metric: kind.id(),
            label: kind.label(),
            value: sample.map(|s| s.value()),
            display: format_reading(kind, sample),
            captured_at: sample.map(|s| s.captured_at()),
        }
    }
}

/// Daemon status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub role: Role,
    pub state: MonitoringState,
    pub peer_reachable: bool,
    pub record_count: usize,
    pub readings: Vec<ReadingView>,
}

/// Formats one slot as `LABEL: value`, e.g. `HR: 75 bpm` or `SPO2: --`.
pub fn format_reading(kind: MetricKind, sample: Option<MetricSample>) -> String {
    match sample {
        Some(sample) => format!("{}: {}", kind.label(), kind.format_value(sample.value())),
        None => format!("{}: --", kind.label()),
    }
}

/// Shared application state.
pub struct AppState {
    config: Config,
    monitor: MonitorHandle,
    records: Mutex<RecordLog>,
    exporter: Exporter,
    peer: Option<Arc<TcpTransport>>,
}

impl AppState {
    /// Creates the state around a running monitor.
    pub fn new(config: Config, monitor: MonitorHandle, peer: Option<Arc<TcpTransport>>) -> Self {
        let exporter = config.export.exporter();
        if config.role == Role::Primary {
            info!("Exports go to {}", exporter.path().display());
        }
        Self {
            config,
            monitor,
            records: Mutex::new(RecordLog::new()),
            exporter,
            peer,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns this process's role.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Returns the monitor handle.
    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    /// Requests monitoring to start.
    pub fn start_monitoring(&self) {
        self.monitor.request_start();
    }

    /// Requests monitoring to stop.
    pub fn stop_monitoring(&self) {
        self.monitor.request_stop();
    }

    /// Current monitoring state.
    pub fn monitoring_state(&self) -> MonitoringState {
        self.monitor.state()
    }

    /// Latest sample for one metric.
    pub fn latest(&self, kind: MetricKind) -> Option<MetricSample> {
        self.monitor.latest(kind)
    }

    /// Every metric slot.
    pub fn readings(&self) -> Readings {
        self.monitor.readings()
    }

    /// Whether the paired peer currently answers probes.
    pub fn is_peer_reachable(&self) -> bool {
        self.peer.as_ref().is_some_and(|peer| peer.is_reachable())
    }

    fn records(&self) -> MutexGuard<'_, RecordLog> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_primary(&self, what: &'static str) -> Result<(), StateError> {
        match self.config.role {
            Role::Primary => Ok(()),
            Role::Companion => Err(StateError::PrimaryOnly(what)),
        }
    }

    /// Appends an explicit record stamped now. Returns the new record count.
    pub fn add_record(
        &self,
        heart_rate: f64,
        oxygen_saturation: f64,
        heart_rate_variability: f64,
        altitude: f64,
    ) -> Result<usize, StateError> {
        self.require_primary("Recording")?;
        for (field, value) in [
            ("heart rate", heart_rate),
            ("oxygen saturation", oxygen_saturation),
            ("heart rate variability", heart_rate_variability),
            ("altitude", altitude),
        ] {
            if !value.is_finite() {
                return Err(StateError::InvalidValue { field, value });
            }
        }

        let record = ExportRecord::new(
            heart_rate,
            oxygen_saturation,
            heart_rate_variability,
            altitude,
            Utc::now(),
        );
        Ok(self.push_record(record))
    }

    /// Records the current readings. Every metric must have a sample.
    pub fn snapshot_record(&self) -> Result<ExportRecord, StateError> {
        self.require_primary("Recording")?;
        let readings = self.readings();
        let record = ExportRecord::from_readings(&readings, Utc::now()).ok_or_else(|| {
            let missing = readings
                .iter()
                .find(|(_, sample)| sample.is_none())
                .map_or(MetricKind::HeartRate, |(kind, _)| kind);
            StateError::MissingReading(missing)
        })?;
        self.push_record(record);
        Ok(record)
    }

    fn push_record(&self, record: ExportRecord) -> usize {
        let mut records = self.records();
        records.push(record);
        info!("Recorded sample #{}", records.len());
        records.len()
    }

    /// Number of records kept this session.
    pub fn record_count(&self) -> usize {
        self.records().len()
    }

    /// Copy of the record log.
    pub fn record_list(&self) -> Vec<ExportRecord> {
        self.records().records().to_vec()
    }

    /// Writes the export file. `None` when there is nothing to export or the
    /// write failed.
    pub fn export(&self) -> Result<Option<PathBuf>, StateError> {
        self.require_primary("Export")?;
        let records = self.record_list();
        Ok(self.exporter.export(&records))
    }

    /// Export text without writing a file.
    pub fn export_text(&self) -> Result<Option<String>, StateError> {
        self.require_primary("Export")?;
        Ok(render(self.records().records()).ok())
    }

    /// Status snapshot for the web UI and API.
    pub fn status(&self) -> StatusView {
        let readings = self.readings();
        StatusView {
            role: self.role(),
            state: self.monitoring_state(),
            peer_reachable: self.is_peer_reachable(),
            record_count: self.record_count(),
            readings: readings
                .iter()
                .map(|(kind, sample)| ReadingView::new(kind, sample))
                .collect(),
        }
    }
}
