//! Inbound peer messages.

use hikewatch_core::{MonitorHandle, SyncAck, SyncMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Accepts peer connections and hands each message to the monitor.
pub async fn serve(listener: TcpListener, handle: MonitorHandle) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Peer connection from {}", addr);
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &handle).await {
                        warn!("Peer connection from {} failed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                warn!("Peer accept error: {}", e);
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, handle: &MonitorHandle) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let ack = apply_line(&line, handle).await;
        write_half.write_all(ack.encode()?.as_bytes()).await?;
    }
    Ok(())
}

/// Decodes one line and waits until the monitor has applied it.
async fn apply_line(line: &str, handle: &MonitorHandle) -> SyncAck {
    let message = match SyncMessage::decode(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unrecognized peer message {:?}: {}", line, e);
            return SyncAck::rejected();
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    handle.deliver(message, Some(reply_tx));
    reply_rx.await.unwrap_or_else(|_| SyncAck::rejected())
}
