//! The monitoring event loop.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{MonitorHandle, MonitorSettings, MonitoringState};
use crate::metric::{MetricKind, MetricSample};
use crate::sensor::{SampleSink, SensorPoller, SensorSource};
use crate::store::MetricStore;
use crate::sync::{SyncAck, SyncChannel, SyncMessage, Transport};

/// Work queued onto the controller's event loop.
pub(crate) enum Event {
    Start,
    Stop,
    CountdownElapsed,
    Sample {
        kind: MetricKind,
        sample: MetricSample,
    },
    Peer {
        message: SyncMessage,
        reply: Option<oneshot::Sender<SyncAck>>,
    },
    Shutdown,
}

/// Owns the monitoring state, the metric store, one poller per metric and
/// the peer channel.
///
/// Every timer, sensor and transport callback is funneled through a single
/// queue drained by [`run`](MonitoringController::run), which is the only
/// place any of this state changes.
pub struct MonitoringController {
    settings: MonitorSettings,
    state: watch::Sender<MonitoringState>,
    store: MetricStore,
    pollers: Vec<SensorPoller>,
    sync: SyncChannel,
    events: mpsc::UnboundedSender<Event>,
    inbox: mpsc::UnboundedReceiver<Event>,
}

impl MonitoringController {
    /// Creates an idle controller and requests sensor authorization.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        source: Arc<dyn SensorSource>,
        transport: Arc<dyn Transport>,
        settings: MonitorSettings,
    ) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();

        let sink_events = events.clone();
        let sink: SampleSink = Arc::new(move |kind, sample| {
            let _ = sink_events.send(Event::Sample { kind, sample });
        });
        let pollers = MetricKind::ALL
            .iter()
            .map(|&kind| SensorPoller::new(kind, source.clone(), sink.clone()))
            .collect();

        let authorization = source.request_authorization();
        let source_name = source.name().to_string();
        tokio::spawn(async move {
            match authorization.await {
                Ok(()) => info!("Sensor authorization succeeded ({})", source_name),
                Err(e) => warn!("Sensor authorization failed ({}): {}", source_name, e),
            }
        });

        let (state, _) = watch::channel(MonitoringState::Idle);

        Self {
            settings,
            state,
            store: MetricStore::new(),
            pollers,
            sync: SyncChannel::new(transport),
            events,
            inbox,
        }
    }

    /// Returns a handle for requesting transitions and reading state.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle::new(
            self.events.clone(),
            self.state.subscribe(),
            self.store.subscribe(),
        )
    }

    /// Current state.
    pub fn state(&self) -> MonitoringState {
        *self.state.borrow()
    }

    /// The metric store.
    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// Drains the event queue until shutdown.
    pub async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            if matches!(event, Event::Shutdown) {
                break;
            }
            self.dispatch(event);
        }
        for poller in &mut self.pollers {
            poller.stop();
        }
        info!("Monitor event loop stopped");
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Start => self.request_start(),
            Event::Stop => self.request_stop(),
            Event::CountdownElapsed => self.finish_countdown(),
            Event::Sample { kind, sample } => self.record_sample(kind, sample),
            Event::Peer { message, reply } => self.apply_peer_message(message, reply),
            Event::Shutdown => {}
        }
    }

    fn set_state(&self, next: MonitoringState) {
        let previous = self.state.send_replace(next);
        info!("Monitoring state: {} -> {}", previous, next);
    }

    fn request_start(&mut self) {
        let state = self.state();
        if state != MonitoringState::Idle {
            debug!("Start request ignored while {}", state);
            return;
        }

        self.set_state(MonitoringState::CountingDown);

        // One scheduled transition; the state guard in finish_countdown
        // makes a late or duplicate firing harmless.
        let delay = self.settings.countdown();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::CountdownElapsed);
        });
        info!("Starting in {}...", self.settings.countdown_ticks);
    }

    fn finish_countdown(&mut self) {
        if self.state() != MonitoringState::CountingDown {
            debug!("Stale countdown completion ignored");
            return;
        }

        self.set_state(MonitoringState::Active);
        for poller in &mut self.pollers {
            poller.start(self.settings.poll_interval);
        }
        self.sync.send(true);
        info!("Monitoring started.");
    }

    fn request_stop(&mut self) {
        let state = self.state();
        if state != MonitoringState::Active {
            debug!("Stop request ignored while {}", state);
            return;
        }

        self.set_state(MonitoringState::Idle);
        for poller in &mut self.pollers {
            poller.stop();
        }
        self.sync.send(false);
        info!("Monitoring stopped.");
    }

    fn record_sample(&mut self, kind: MetricKind, sample: MetricSample) {
        // Samples still queued when monitoring stopped are dropped
        if !self.state().is_active() {
            debug!("Discarding {} sample received while {}", kind, self.state());
            return;
        }
        self.store.set(kind, sample);
    }

    fn apply_peer_message(&mut self, message: SyncMessage, reply: Option<oneshot::Sender<SyncAck>>) {
        let local = self.state().is_active();
        if message.is_monitoring != local {
            info!("Peer requested monitoring={}", message.is_monitoring);
            if message.is_monitoring {
                self.request_start();
            } else {
                self.request_stop();
            }
        } else {
            debug!("Peer monitoring={} matches local state", message.is_monitoring);
        }

        if let Some(reply) = reply {
            let _ = reply.send(SyncAck::received());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample, LoopbackTransport, RecordingTransport, Script, ScriptedSource};
    use std::time::Duration;
    use tokio::time::{self, Instant};

    const PULL_KINDS: [MetricKind; 3] = [
        MetricKind::HeartRate,
        MetricKind::OxygenSaturation,
        MetricKind::HeartRateVariability,
    ];

    fn spawn_controller(
        source: Arc<ScriptedSource>,
        transport: Arc<dyn Transport>,
    ) -> MonitorHandle {
        let controller = MonitoringController::new(source, transport, MonitorSettings::default());
        let handle = controller.handle();
        tokio::spawn(controller.run());
        handle
    }

    async fn settle() {
        time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_then_active_then_first_fetch() {
        let source = Arc::new(ScriptedSource::new());
        source.script(MetricKind::HeartRate, [Script::Sample(sample(76.0, 60))]);
        let transport = Arc::new(RecordingTransport::new());
        let handle = spawn_controller(source.clone(), transport.clone());

        let t0 = Instant::now();
        handle.request_start();
        settle().await;
        assert_eq!(handle.state(), MonitoringState::CountingDown);

        time::sleep_until(t0 + Duration::from_millis(2_900)).await;
        assert_eq!(handle.state(), MonitoringState::CountingDown);
        assert_eq!(source.subscribe_count(), 0);

        time::sleep_until(t0 + Duration::from_millis(3_100)).await;
        assert_eq!(handle.state(), MonitoringState::Active);
        assert_eq!(source.subscribe_count(), 1);
        assert_eq!(transport.sent(), vec![SyncMessage::new(true)]);
        assert!(handle.latest(MetricKind::HeartRate).is_none());

        time::sleep_until(t0 + Duration::from_millis(63_100)).await;
        for kind in PULL_KINDS {
            assert_eq!(source.query_count(kind), 1);
        }
        assert_eq!(handle.latest(MetricKind::HeartRate), Some(sample(76.0, 60)));
        // Nothing scripted for these, so the slots stay unset
        assert!(handle.latest(MetricKind::OxygenSaturation).is_none());
        assert!(handle.latest(MetricKind::HeartRateVariability).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_start_is_a_no_op() {
        let source = Arc::new(ScriptedSource::new());
        let transport = Arc::new(RecordingTransport::new());
        let handle = spawn_controller(source.clone(), transport.clone());

        let t0 = Instant::now();
        handle.request_start();
        handle.request_start();
        time::sleep_until(t0 + Duration::from_millis(1_500)).await;
        handle.request_start();

        time::sleep_until(t0 + Duration::from_millis(3_100)).await;
        assert_eq!(handle.state(), MonitoringState::Active);
        handle.request_start();

        time::sleep_until(t0 + Duration::from_millis(63_100)).await;
        assert_eq!(handle.state(), MonitoringState::Active);
        assert_eq!(source.subscribe_count(), 1);
        for kind in PULL_KINDS {
            assert_eq!(source.query_count(kind), 1);
        }
        assert_eq!(transport.sent(), vec![SyncMessage::new(true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_idle_or_counting_down_is_a_no_op() {
        let source = Arc::new(ScriptedSource::new());
        let transport = Arc::new(RecordingTransport::new());
        let handle = spawn_controller(source.clone(), transport.clone());

        handle.request_stop();
        settle().await;
        assert_eq!(handle.state(), MonitoringState::Idle);
        assert!(transport.sent().is_empty());

        handle.request_start();
        handle.request_stop();
        settle().await;
        assert_eq!(handle.state(), MonitoringState::CountingDown);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_pollers_and_notifies_peer() {
        let source = Arc::new(ScriptedSource::new());
        let transport = Arc::new(RecordingTransport::new());
        let handle = spawn_controller(source.clone(), transport.clone());

        handle.request_start();
        time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(handle.state(), MonitoringState::Active);

        handle.request_stop();
        settle().await;
        assert_eq!(handle.state(), MonitoringState::Idle);
        assert_eq!(source.unsubscribe_count(), 1);
        assert_eq!(
            transport.sent(),
            vec![SyncMessage::new(true), SyncMessage::new(false)]
        );

        time::sleep(Duration::from_secs(600)).await;
        for kind in PULL_KINDS {
            assert_eq!(source.query_count(kind), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_after_stop_are_discarded() {
        let source = Arc::new(ScriptedSource::new());
        let mut controller = MonitoringController::new(
            source,
            Arc::new(RecordingTransport::new()),
            MonitorSettings::default(),
        );

        controller.dispatch(Event::Sample {
            kind: MetricKind::HeartRate,
            sample: sample(90.0, 0),
        });
        assert!(controller.store().get(MetricKind::HeartRate).is_none());

        controller.dispatch(Event::Start);
        controller.dispatch(Event::CountdownElapsed);
        assert_eq!(controller.state(), MonitoringState::Active);
        controller.dispatch(Event::Sample {
            kind: MetricKind::HeartRate,
            sample: sample(91.0, 60),
        });
        assert_eq!(
            controller.store().get(MetricKind::HeartRate),
            Some(sample(91.0, 60))
        );

        controller.dispatch(Event::Stop);
        controller.dispatch(Event::Sample {
            kind: MetricKind::HeartRate,
            sample: sample(92.0, 120),
        });
        assert_eq!(
            controller.store().get(MetricKind::HeartRate),
            Some(sample(91.0, 60))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_countdown_completion_is_ignored() {
        let source = Arc::new(ScriptedSource::new());
        let mut controller = MonitoringController::new(
            source.clone(),
            Arc::new(RecordingTransport::new()),
            MonitorSettings::default(),
        );

        controller.dispatch(Event::CountdownElapsed);
        assert_eq!(controller.state(), MonitoringState::Idle);
        assert_eq!(source.subscribe_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_message_acts_only_on_difference() {
        let source = Arc::new(ScriptedSource::new());
        let mut controller = MonitoringController::new(
            source,
            Arc::new(RecordingTransport::new()),
            MonitorSettings::default(),
        );

        let (tx, rx) = oneshot::channel();
        controller.dispatch(Event::Peer {
            message: SyncMessage::new(false),
            reply: Some(tx),
        });
        assert_eq!(controller.state(), MonitoringState::Idle);
        assert_eq!(rx.await.unwrap(), SyncAck::received());

        controller.dispatch(Event::Peer {
            message: SyncMessage::new(true),
            reply: None,
        });
        assert_eq!(controller.state(), MonitoringState::CountingDown);

        controller.dispatch(Event::CountdownElapsed);
        controller.dispatch(Event::Peer {
            message: SyncMessage::new(true),
            reply: None,
        });
        assert_eq!(controller.state(), MonitoringState::Active);

        controller.dispatch(Event::Peer {
            message: SyncMessage::new(false),
            reply: None,
        });
        assert_eq!(controller.state(), MonitoringState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_authorization_does_not_block_start() {
        let source = Arc::new(ScriptedSource::denied());
        let handle = spawn_controller(source, Arc::new(RecordingTransport::new()));

        handle.request_start();
        time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(handle.state(), MonitoringState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paired_controllers_converge_without_ping_pong() {
        let phone_link = Arc::new(LoopbackTransport::new());
        let watch_link = Arc::new(LoopbackTransport::new());
        let phone = spawn_controller(Arc::new(ScriptedSource::new()), phone_link.clone());
        let watch = spawn_controller(Arc::new(ScriptedSource::new()), watch_link.clone());
        phone_link.connect(watch.clone());
        watch_link.connect(phone.clone());

        let t0 = Instant::now();
        watch.request_start();

        time::sleep_until(t0 + Duration::from_millis(3_100)).await;
        assert_eq!(watch.state(), MonitoringState::Active);
        assert_eq!(phone.state(), MonitoringState::CountingDown);

        time::sleep_until(t0 + Duration::from_millis(6_100)).await;
        assert_eq!(phone.state(), MonitoringState::Active);
        assert_eq!(watch_link.send_count(), 1);
        assert_eq!(phone_link.send_count(), 1);

        phone.request_stop();
        time::sleep_until(t0 + Duration::from_millis(6_200)).await;
        assert_eq!(phone.state(), MonitoringState::Idle);
        assert_eq!(watch.state(), MonitoringState::Idle);
        assert_eq!(phone_link.send_count(), 2);
        assert_eq!(watch_link.send_count(), 2);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(phone_link.send_count(), 2);
        assert_eq!(watch_link.send_count(), 2);
    }
}
