//! Sensor sources backing the monitor's pollers.
//!
//! Heart rate, oxygen saturation and HRV are pulled; altitude is pushed.

mod file;
mod simulated;

pub use file::FileSource;
pub use simulated::SimulatedSource;

use hikewatch_core::SensorSource;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{SensorConfig, SensorSourceKind};

/// Bounds on the altitude update period.
const MIN_PUSH_INTERVAL: Duration = Duration::from_millis(100);
const MAX_PUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Clamps a push period to one tokio timers accept.
fn push_period(interval: Duration) -> Duration {
    interval.clamp(MIN_PUSH_INTERVAL, MAX_PUSH_INTERVAL)
}

/// Creates the configured sensor source.
pub fn create_source(config: &SensorConfig) -> Arc<dyn SensorSource> {
    let push_interval = Duration::from_millis(config.push_interval_ms);
    let source: Arc<dyn SensorSource> = match config.source {
        SensorSourceKind::Simulated => Arc::new(SimulatedSource::new(push_interval)),
        SensorSourceKind::File => Arc::new(FileSource::new(&config.path, push_interval)),
    };
    info!("Using sensor source: {}", source.name());
    source
}
