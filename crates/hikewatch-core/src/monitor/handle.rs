//! Cloneable front end to a running controller.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use super::controller::Event;
use super::MonitoringState;
use crate::metric::{MetricKind, MetricSample};
use crate::store::Readings;
use crate::sync::{SyncAck, SyncMessage};

/// Requests transitions and reads published state.
///
/// Requests are queued onto the controller's event loop and applied there;
/// reads come from watch channels and never block.
#[derive(Clone)]
pub struct MonitorHandle {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<MonitoringState>,
    readings: watch::Receiver<Readings>,
}

impl MonitorHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<Event>,
        state: watch::Receiver<MonitoringState>,
        readings: watch::Receiver<Readings>,
    ) -> Self {
        Self {
            events,
            state,
            readings,
        }
    }

    /// Requests a start. No-op unless idle.
    pub fn request_start(&self) {
        self.send(Event::Start);
    }

    /// Requests a stop. No-op unless active.
    pub fn request_stop(&self) {
        self.send(Event::Stop);
    }

    /// Hands an inbound peer message to the controller. The reply, if given,
    /// is answered once the message has been applied.
    pub fn deliver(&self, message: SyncMessage, reply: Option<oneshot::Sender<SyncAck>>) {
        self.send(Event::Peer { message, reply });
    }

    /// Stops every poller and ends the event loop.
    pub fn shutdown(&self) {
        self.send(Event::Shutdown);
    }

    /// Current monitoring state.
    pub fn state(&self) -> MonitoringState {
        *self.state.borrow()
    }

    /// Latest sample for `kind`.
    pub fn latest(&self, kind: MetricKind) -> Option<MetricSample> {
        self.readings.borrow().get(kind)
    }

    /// Copy of every metric slot.
    pub fn readings(&self) -> Readings {
        self.readings.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<MonitoringState> {
        self.state.clone()
    }

    /// Subscribes to metric updates.
    pub fn subscribe_readings(&self) -> watch::Receiver<Readings> {
        self.readings.clone()
    }

    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            warn!("Monitor event loop has stopped, request ignored");
        }
    }
}
