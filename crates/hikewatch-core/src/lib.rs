//! hikewatch core library
//!
//! Periodic health-sensor sampling and monitoring-state synchronization
//! shared by the primary (phone) and companion (wrist) processes.

pub mod error;
pub mod export;
pub mod metric;
pub mod monitor;
pub mod sensor;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use export::{ExportRecord, Exporter, RecordLog};
pub use metric::{Acquisition, MetricKind, MetricSample};
pub use monitor::{MonitorHandle, MonitorSettings, MonitoringController, MonitoringState};
pub use sensor::{SampleSink, SensorPoller, SensorSource};
pub use store::{MetricStore, Readings};
pub use sync::{SyncAck, SyncChannel, SyncMessage, Transport, Unpaired};

/// Default polling period for pull-based metrics, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Number of countdown ticks between a start request and active monitoring.
pub const DEFAULT_COUNTDOWN_TICKS: u32 = 3;

/// Length of one countdown tick in milliseconds.
pub const DEFAULT_COUNTDOWN_TICK_MS: u64 = 1000;
