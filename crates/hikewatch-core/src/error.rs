//! Error types for the hikewatch core library.

use thiserror::Error;

use crate::metric::MetricKind;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by sensor sources, peer transports and the exporter.
///
/// None of these are fatal: every caller in the core degrades to
/// "no data this cycle" and logs the error.
#[derive(Error, Debug)]
pub enum Error {
    /// Sensor access was not authorized.
    #[error("Sensor authorization denied: {0}")]
    PermissionDenied(String),

    /// The sensor source failed to produce a reading.
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The source cannot deliver this metric in the requested mode.
    #[error("{kind} does not support {mode} acquisition")]
    Unsupported {
        kind: MetricKind,
        mode: &'static str,
    },

    /// Unknown metric identifier.
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    /// The paired peer could not be reached.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Malformed peer payload.
    #[error("Invalid peer message: {0}")]
    Codec(#[from] serde_json::Error),

    /// I/O error (export file, peer socket).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export requested with no records.
    #[error("No records to export")]
    EmptyExport,
}
