//! Tracked metrics and their samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Error, Result};

/// How a metric's readings reach the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Queried on a repeating timer.
    Pull,
    /// Delivered continuously by a subscription.
    Push,
}

/// The closed set of tracked metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Heart rate in beats per minute.
    HeartRate,
    /// Blood-oxygen saturation as a 0..1 fraction.
    OxygenSaturation,
    /// Heart-rate variability (SDNN) in milliseconds.
    HeartRateVariability,
    /// Relative altitude in meters.
    Altitude,
}

impl MetricKind {
    /// Number of tracked metrics.
    pub const COUNT: usize = 4;

    /// All metrics in slot order.
    pub const ALL: [MetricKind; Self::COUNT] = [
        MetricKind::HeartRate,
        MetricKind::OxygenSaturation,
        MetricKind::HeartRateVariability,
        MetricKind::Altitude,
    ];

    /// Slot index of this metric.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable identifier used in config files, D-Bus and the web API.
    pub fn id(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::OxygenSaturation => "oxygen_saturation",
            MetricKind::HeartRateVariability => "heart_rate_variability",
            MetricKind::Altitude => "altitude",
        }
    }

    /// Short display label.
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "HR",
            MetricKind::OxygenSaturation => "SPO2",
            MetricKind::HeartRateVariability => "HRV",
            MetricKind::Altitude => "ALT",
        }
    }

    /// Unit of the raw value.
    pub fn unit(self) -> &'static str {
        match self {
            MetricKind::HeartRate => "bpm",
            MetricKind::OxygenSaturation => "%",
            MetricKind::HeartRateVariability => "ms",
            MetricKind::Altitude => "m",
        }
    }

    /// Altitude is pushed by its source; everything else is polled.
    pub fn acquisition(self) -> Acquisition {
        match self {
            MetricKind::Altitude => Acquisition::Push,
            _ => Acquisition::Pull,
        }
    }

    /// Formats a raw value for display (e.g. "75 bpm", "98%").
    pub fn format_value(self, value: f64) -> String {
        match self {
            MetricKind::HeartRate => format!("{:.0} bpm", value),
            // Stored as a fraction, shown as a percentage
            MetricKind::OxygenSaturation => format!("{:.0}%", value * 100.0),
            MetricKind::HeartRateVariability => format!("{:.2} ms", value),
            MetricKind::Altitude => format!("{:.2} m", value),
        }
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "heart_rate" | "hr" => Ok(MetricKind::HeartRate),
            "oxygen_saturation" | "spo2" => Ok(MetricKind::OxygenSaturation),
            "heart_rate_variability" | "hrv" => Ok(MetricKind::HeartRateVariability),
            "altitude" | "alt" => Ok(MetricKind::Altitude),
            _ => Err(Error::InvalidMetric(s.to_string())),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One measured value and the time it was captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    value: f64,
    captured_at: DateTime<Utc>,
}

impl MetricSample {
    /// Creates a sample captured at the given time.
    pub fn new(value: f64, captured_at: DateTime<Utc>) -> Self {
        Self { value, captured_at }
    }

    /// Creates a sample stamped with the current local time.
    pub fn received_now(value: f64) -> Self {
        Self::new(value, Utc::now())
    }

    /// Returns the measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the capture time.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}
