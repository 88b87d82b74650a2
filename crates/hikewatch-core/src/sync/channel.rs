//! Outbound half of the peer link.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{SyncMessage, Transport};

/// Sends the local monitoring flag to the peer.
///
/// A send goes out only when the flag differs from the last value this side
/// sent. The peer's actual state is never confirmed, so a lost message can
/// leave the two sides diverged until the flag changes again.
pub struct SyncChannel {
    transport: Arc<dyn Transport>,
    last_sent: bool,
}

impl SyncChannel {
    /// Creates a channel; the peer is assumed idle.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            last_sent: false,
        }
    }

    /// Returns the last flag handed to the transport.
    pub fn last_sent(&self) -> bool {
        self.last_sent
    }

    /// Returns the transport's advisory reachability.
    pub fn is_peer_reachable(&self) -> bool {
        self.transport.is_reachable()
    }

    /// Attempts a best-effort send. Returns true if the transport was called.
    ///
    /// Delivery runs on its own task; its outcome is only logged. Must be
    /// called from within a Tokio runtime.
    pub fn send(&mut self, is_monitoring: bool) -> bool {
        if self.last_sent == is_monitoring {
            debug!("Peer already told monitoring={}", is_monitoring);
            return false;
        }
        if !self.transport.is_reachable() {
            warn!(
                "Peer is not reachable, dropping monitoring={} update",
                is_monitoring
            );
            return false;
        }

        self.last_sent = is_monitoring;
        let delivery = self.transport.send(SyncMessage::new(is_monitoring));
        tokio::spawn(async move {
            match delivery.await {
                Ok(Some(ack)) => debug!("Peer acknowledged update (received: {})", ack.received),
                Ok(None) => debug!("Peer sent no acknowledgment"),
                Err(e) => warn!("Error sending monitoring update: {}", e),
            }
        });
        info!("Sent monitoring={} to peer", is_monitoring);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;

    #[tokio::test]
    async fn test_duplicate_send_is_suppressed() {
        let transport = Arc::new(RecordingTransport::new());
        let mut channel = SyncChannel::new(transport.clone());

        assert!(channel.send(true));
        assert!(!channel.send(true));
        assert_eq!(transport.sent(), vec![SyncMessage::new(true)]);
    }

    #[tokio::test]
    async fn test_initial_false_is_not_sent() {
        let transport = Arc::new(RecordingTransport::new());
        let mut channel = SyncChannel::new(transport.clone());

        assert!(!channel.send(false));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer_drops_without_remembering() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_reachable(false);
        let mut channel = SyncChannel::new(transport.clone());

        assert!(!channel.send(true));
        assert!(!channel.last_sent());
        assert!(transport.sent().is_empty());

        transport.set_reachable(true);
        assert!(channel.send(true));
        assert!(channel.last_sent());
    }

    #[tokio::test]
    async fn test_alternating_flags_all_go_out() {
        let transport = Arc::new(RecordingTransport::new());
        let mut channel = SyncChannel::new(transport.clone());

        channel.send(true);
        channel.send(false);
        channel.send(true);
        assert_eq!(
            transport.sent(),
            vec![
                SyncMessage::new(true),
                SyncMessage::new(false),
                SyncMessage::new(true)
            ]
        );
    }
}
