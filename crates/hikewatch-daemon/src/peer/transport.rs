//! Outbound peer connections.

use futures::future::{BoxFuture, FutureExt};
use hikewatch_core::{Error, Result, SyncAck, SyncMessage, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

/// Connect and reply timeout for a single exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends monitoring updates to the peer's listener.
///
/// Reachability is advisory: it is refreshed by the probe task and by the
/// outcome of every send.
pub struct TcpTransport {
    address: String,
    reachable: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Creates a transport for `address`. The peer counts as unreachable
    /// until the first probe succeeds.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            reachable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the peer address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Probes the peer every `interval`, logging reachability changes.
    pub fn spawn_probe(&self, interval: Duration) -> JoinHandle<()> {
        let address = self.address.clone();
        let reachable = self.reachable.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let ok = matches!(
                    timeout(EXCHANGE_TIMEOUT, TcpStream::connect(&address)).await,
                    Ok(Ok(_))
                );
                update_reachability(&reachable, &address, ok);
            }
        })
    }
}

fn update_reachability(reachable: &AtomicBool, address: &str, now: bool) {
    let before = reachable.swap(now, Ordering::Relaxed);
    if before != now {
        info!("Peer reachability changed: {} reachable={}", address, now);
    }
}

async fn exchange(address: &str, message: SyncMessage) -> Result<Option<SyncAck>> {
    let stream = timeout(EXCHANGE_TIMEOUT, TcpStream::connect(address))
        .await
        .map_err(|_| Error::PeerUnreachable(format!("{}: connect timed out", address)))??;
    let (read_half, mut write_half) = stream.into_split();

    write_half.write_all(message.encode()?.as_bytes()).await?;
    write_half.flush().await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let read = timeout(EXCHANGE_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| Error::PeerUnreachable(format!("{}: no reply", address)))??;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(SyncAck::decode(&line)?))
}

impl Transport for TcpTransport {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    fn send(&self, message: SyncMessage) -> BoxFuture<'static, Result<Option<SyncAck>>> {
        let address = self.address.clone();
        let reachable = self.reachable.clone();
        async move {
            debug!("Sending {:?} to {}", message, address);
            let result = exchange(&address, message).await;
            if let Err(Error::Io(_) | Error::PeerUnreachable(_)) = &result {
                update_reachability(&reachable, &address, false);
            }
            result
        }
        .boxed()
    }
}
