//! Monitoring state machine and its event loop.

mod controller;
mod handle;

pub use controller::MonitoringController;
pub use handle::MonitorHandle;

use serde::Serialize;
use std::time::Duration;

use crate::{DEFAULT_COUNTDOWN_TICKS, DEFAULT_COUNTDOWN_TICK_MS, DEFAULT_POLL_INTERVAL_SECS};

/// Monitoring lifecycle.
///
/// `Idle -> CountingDown` on a start request, `CountingDown -> Active` when
/// the countdown elapses, `Active -> Idle` on a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitoringState {
    #[default]
    Idle,
    CountingDown,
    Active,
}

impl MonitoringState {
    /// The bit mirrored to the peer.
    pub fn is_active(self) -> bool {
        self == MonitoringState::Active
    }
}

impl std::fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitoringState::Idle => write!(f, "idle"),
            MonitoringState::CountingDown => write!(f, "counting-down"),
            MonitoringState::Active => write!(f, "active"),
        }
    }
}

/// Timing of the monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Period of every pull poller.
    pub poll_interval: Duration,
    /// Ticks between a start request and active monitoring.
    pub countdown_ticks: u32,
    /// Length of one countdown tick.
    pub countdown_tick: Duration,
}

impl MonitorSettings {
    /// Total countdown delay, saturating at `Duration::MAX`.
    pub fn countdown(&self) -> Duration {
        self.countdown_tick.saturating_mul(self.countdown_ticks)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            countdown_ticks: DEFAULT_COUNTDOWN_TICKS,
            countdown_tick: Duration::from_millis(DEFAULT_COUNTDOWN_TICK_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_countdown_is_three_seconds() {
        assert_eq!(MonitorSettings::default().countdown(), Duration::from_secs(3));
    }

    #[test]
    fn test_countdown_saturates() {
        let settings = MonitorSettings {
            countdown_ticks: u32::MAX,
            countdown_tick: Duration::MAX,
            ..MonitorSettings::default()
        };
        assert_eq!(settings.countdown(), Duration::MAX);
    }

    #[test]
    fn test_only_active_is_monitoring() {
        assert!(MonitoringState::Active.is_active());
        assert!(!MonitoringState::CountingDown.is_active());
        assert!(!MonitoringState::Idle.is_active());
    }

    #[test]
    fn test_display() {
        assert_eq!(MonitoringState::CountingDown.to_string(), "counting-down");
        assert_eq!(MonitoringState::default().to_string(), "idle");
    }
}
