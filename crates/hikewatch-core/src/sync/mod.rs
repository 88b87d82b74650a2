//! Peer synchronization of the monitoring flag.
//!
//! Messages travel as single JSON lines, e.g. `{"isMonitoring":true}`,
//! answered by `{"received":true}`.

mod channel;

pub use channel::SyncChannel;

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Monitoring flag sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub is_monitoring: bool,
}

impl SyncMessage {
    /// Creates a message carrying the given flag.
    pub fn new(is_monitoring: bool) -> Self {
        Self { is_monitoring }
    }

    /// Encodes as a newline-terminated JSON line.
    pub fn encode(&self) -> Result<String> {
        encode_line(self)
    }

    /// Decodes one JSON line.
    pub fn decode(line: &str) -> Result<Self> {
        decode_line(line)
    }
}

/// Acknowledgment returned by the peer. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAck {
    pub received: bool,
}

impl SyncAck {
    /// Positive acknowledgment.
    pub fn received() -> Self {
        Self { received: true }
    }

    /// Reply to a payload that could not be understood.
    pub fn rejected() -> Self {
        Self { received: false }
    }

    /// Encodes as a newline-terminated JSON line.
    pub fn encode(&self) -> Result<String> {
        encode_line(self)
    }

    /// Decodes one JSON line.
    pub fn decode(line: &str) -> Result<Self> {
        decode_line(line)
    }
}

fn encode_line<T: Serialize>(value: &T) -> Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Best-effort link to the paired peer.
pub trait Transport: Send + Sync + 'static {
    /// Advisory reachability of the peer.
    fn is_reachable(&self) -> bool;

    /// Sends one message. The returned future resolves to the peer's
    /// acknowledgment, if it sent one.
    fn send(&self, message: SyncMessage) -> BoxFuture<'static, Result<Option<SyncAck>>>;
}

/// Transport for a process running without a peer.
pub struct Unpaired;

impl Transport for Unpaired {
    fn is_reachable(&self) -> bool {
        false
    }

    fn send(&self, _message: SyncMessage) -> BoxFuture<'static, Result<Option<SyncAck>>> {
        future::ready(Err(Error::PeerUnreachable("no peer configured".into()))).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        assert_eq!(
            SyncMessage::new(true).encode().unwrap(),
            "{\"isMonitoring\":true}\n"
        );
        assert_eq!(
            SyncMessage::decode("{\"isMonitoring\":false}\r\n").unwrap(),
            SyncMessage::new(false)
        );
    }

    #[test]
    fn test_unknown_payload_is_rejected() {
        assert!(SyncMessage::decode("{\"isMonitoring\":\"yes\"}").is_err());
        assert!(SyncMessage::decode("{\"start\":true}").is_err());
        assert!(matches!(
            SyncMessage::decode("not json"),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_ack_wire_format() {
        assert_eq!(SyncAck::received().encode().unwrap(), "{\"received\":true}\n");
        assert_eq!(
            SyncAck::decode("{\"received\":false}").unwrap(),
            SyncAck::rejected()
        );
    }
}
