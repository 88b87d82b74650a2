//! Test doubles for sensor sources and peer transports.

use chrono::{TimeZone, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::sync::{mpsc, oneshot};

use crate::metric::{MetricKind, MetricSample};
use crate::monitor::MonitorHandle;
use crate::sensor::SensorSource;
use crate::sync::{SyncAck, SyncMessage, Transport};
use crate::{Error, Result};

/// Builds a sample captured `secs` after a fixed epoch.
pub(crate) fn sample(value: f64, secs: i64) -> MetricSample {
    MetricSample::new(value, Utc.timestamp_opt(1_728_288_000 + secs, 0).unwrap())
}

/// Scripted answer to one `query_latest` call.
pub(crate) enum Script {
    Sample(MetricSample),
    Empty,
    Fail,
}

/// Sensor source answering queries from per-metric scripts.
///
/// Unscripted queries return no sample. Altitude values are pushed by the
/// test through [`ScriptedSource::push`].
pub(crate) struct ScriptedSource {
    scripts: Mutex<HashMap<MetricKind, VecDeque<Script>>>,
    queries: Mutex<HashMap<MetricKind, usize>>,
    altimeter: bool,
    authorized: AtomicBool,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    updates: Mutex<Option<mpsc::UnboundedSender<Result<f64>>>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            queries: Mutex::new(HashMap::new()),
            altimeter: true,
            authorized: AtomicBool::new(true),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            updates: Mutex::new(None),
        }
    }

    pub(crate) fn without_altimeter() -> Self {
        Self {
            altimeter: false,
            ..Self::new()
        }
    }

    pub(crate) fn denied() -> Self {
        let source = Self::new();
        source.authorized.store(false, Ordering::SeqCst);
        source
    }

    pub(crate) fn script(&self, kind: MetricKind, answers: impl IntoIterator<Item = Script>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .extend(answers);
    }

    pub(crate) fn push(&self, update: Result<f64>) {
        if let Some(tx) = self.updates.lock().unwrap().as_ref() {
            let _ = tx.send(update);
        }
    }

    pub(crate) fn query_count(&self, kind: MetricKind) -> usize {
        self.queries.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl SensorSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn request_authorization(&self) -> BoxFuture<'static, Result<()>> {
        let result = if self.authorized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::PermissionDenied("scripted".into()))
        };
        future::ready(result).boxed()
    }

    fn query_latest(&self, kind: MetricKind) -> BoxFuture<'static, Result<Option<MetricSample>>> {
        *self.queries.lock().unwrap().entry(kind).or_default() += 1;
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        let result = match next {
            Some(Script::Sample(sample)) => Ok(Some(sample)),
            Some(Script::Fail) => Err(Error::SensorUnavailable(kind.to_string())),
            Some(Script::Empty) | None => Ok(None),
        };
        future::ready(result).boxed()
    }

    fn subscribe(&self, kind: MetricKind) -> Result<BoxStream<'static, Result<f64>>> {
        if !self.altimeter {
            return Err(Error::Unsupported { kind, mode: "push" });
        }
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.updates.lock().unwrap() = Some(tx);
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|update| (update, rx)) }).boxed())
    }

    fn unsubscribe(&self, _kind: MetricKind) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.updates.lock().unwrap().take();
    }
}

/// Transport that records every send and acknowledges immediately.
pub(crate) struct RecordingTransport {
    reachable: AtomicBool,
    sent: Mutex<Vec<SyncMessage>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<SyncMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn send(&self, message: SyncMessage) -> BoxFuture<'static, Result<Option<SyncAck>>> {
        self.sent.lock().unwrap().push(message);
        future::ready(Ok(Some(SyncAck::received()))).boxed()
    }
}

/// In-process link delivering straight into another controller's queue.
pub(crate) struct LoopbackTransport {
    peer: OnceLock<MonitorHandle>,
    sends: AtomicUsize,
}

impl LoopbackTransport {
    pub(crate) fn new() -> Self {
        Self {
            peer: OnceLock::new(),
            sends: AtomicUsize::new(0),
        }
    }

    pub(crate) fn connect(&self, peer: MonitorHandle) {
        let _ = self.peer.set(peer);
    }

    pub(crate) fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

impl Transport for LoopbackTransport {
    fn is_reachable(&self) -> bool {
        self.peer.get().is_some()
    }

    fn send(&self, message: SyncMessage) -> BoxFuture<'static, Result<Option<SyncAck>>> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let Some(peer) = self.peer.get().cloned() else {
            return future::ready(Err(Error::PeerUnreachable("loopback".into()))).boxed();
        };
        let (tx, rx) = oneshot::channel();
        peer.deliver(message, Some(tx));
        async move { Ok(rx.await.ok()) }.boxed()
    }
}
