//! Repeating per-metric sampling.

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::SensorSource;
use crate::metric::{Acquisition, MetricKind, MetricSample};
use crate::Result;

/// Shortest accepted polling period.
const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Longest accepted polling period.
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Receives every sample a poller produces.
pub type SampleSink = Arc<dyn Fn(MetricKind, MetricSample) + Send + Sync>;

/// Samples one metric while started.
///
/// Pull metrics are queried once per tick, the first tick one full interval
/// after `start`. Push metrics are subscribed on `start` and unsubscribed on
/// `stop`. Empty or failed reads skip the tick.
pub struct SensorPoller {
    kind: MetricKind,
    source: Arc<dyn SensorSource>,
    sink: SampleSink,
    task: Option<JoinHandle<()>>,
}

impl SensorPoller {
    /// Creates a stopped poller.
    pub fn new(kind: MetricKind, source: Arc<dyn SensorSource>, sink: SampleSink) -> Self {
        Self {
            kind,
            source,
            sink,
            task: None,
        }
    }

    /// Returns the polled metric.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Returns true while the timer or subscription is live.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts sampling. Does nothing if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, interval: Duration) {
        if self.is_running() {
            debug!("{} poller already running", self.kind);
            return;
        }

        let kind = self.kind;
        let sink = self.sink.clone();
        let task = match kind.acquisition() {
            Acquisition::Pull => {
                let period = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
                tokio::spawn(poll_loop(kind, self.source.clone(), sink, period))
            }
            Acquisition::Push => match self.source.subscribe(kind) {
                Ok(updates) => tokio::spawn(push_loop(kind, updates, sink)),
                Err(e) => {
                    warn!("{} updates are not available: {}", kind, e);
                    return;
                }
            },
        };

        self.task = Some(task);
        debug!("{} poller started", kind);
    }

    /// Stops sampling. No further samples reach the sink until `start`.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if self.kind.acquisition() == Acquisition::Push {
                self.source.unsubscribe(self.kind);
            }
            debug!("{} poller stopped", self.kind);
        }
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    kind: MetricKind,
    source: Arc<dyn SensorSource>,
    sink: SampleSink,
    period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match source.query_latest(kind).await {
            Ok(Some(sample)) => {
                info!(
                    "Latest {}: {} at {}",
                    kind.label(),
                    kind.format_value(sample.value()),
                    sample.captured_at()
                );
                sink(kind, sample);
            }
            Ok(None) => debug!("No {} sample available", kind),
            Err(e) => warn!("{} query failed: {}", kind, e),
        }
    }
}

async fn push_loop(kind: MetricKind, mut updates: BoxStream<'static, Result<f64>>, sink: SampleSink) {
    while let Some(update) = updates.next().await {
        match update {
            Ok(value) => {
                debug!("Detected {}: {}", kind.label(), kind.format_value(value));
                sink(kind, MetricSample::received_now(value));
            }
            Err(e) => warn!("Error receiving {} update: {}", kind, e),
        }
    }
    debug!("{} update stream ended", kind);
}
