//! Synthetic sensor readings.

use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use hikewatch_core::{Acquisition, Error, MetricKind, MetricSample, Result, SensorSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

/// Produces a slow, repeating walk of plausible readings.
pub struct SimulatedSource {
    push_interval: Duration,
    pulls: AtomicU64,
}

impl SimulatedSource {
    /// Creates a source pushing altitude every `push_interval`.
    pub fn new(push_interval: Duration) -> Self {
        Self {
            push_interval: super::push_period(push_interval),
            pulls: AtomicU64::new(0),
        }
    }

    /// Deterministic reading for the `step`-th sample of `kind`.
    pub fn reading(kind: MetricKind, step: u64) -> f64 {
        let phase = (step % 10) as f64;
        match kind {
            MetricKind::HeartRate => 72.0 + phase,
            MetricKind::OxygenSaturation => 0.95 + phase / 250.0,
            MetricKind::HeartRateVariability => 45.0 + phase * 1.5,
            MetricKind::Altitude => 120.0 + step as f64 * 0.5,
        }
    }
}

impl SensorSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn request_authorization(&self) -> BoxFuture<'static, Result<()>> {
        future::ready(Ok(())).boxed()
    }

    fn query_latest(&self, kind: MetricKind) -> BoxFuture<'static, Result<Option<MetricSample>>> {
        if kind.acquisition() != Acquisition::Pull {
            return future::ready(Err(Error::Unsupported { kind, mode: "pull" })).boxed();
        }
        let step = self.pulls.fetch_add(1, Ordering::Relaxed) / 3;
        let sample = MetricSample::new(Self::reading(kind, step), Utc::now());
        future::ready(Ok(Some(sample))).boxed()
    }

    fn subscribe(&self, kind: MetricKind) -> Result<BoxStream<'static, Result<f64>>> {
        if kind.acquisition() != Acquisition::Push {
            return Err(Error::Unsupported { kind, mode: "push" });
        }

        let mut ticker = interval_at(Instant::now() + self.push_interval, self.push_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut step = 0;
        let stream = IntervalStream::new(ticker).map(move |_| {
            let reading = Self::reading(kind, step);
            step += 1;
            Ok(reading)
        });
        Ok(stream.boxed())
    }

    fn unsubscribe(&self, kind: MetricKind) {
        debug!("Simulated {} updates stopped", kind);
    }
}
