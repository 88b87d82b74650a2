//! Readings from plain files, one per metric.
//!
//! Each file under the source directory is named after the metric id
//! (`heart_rate`, `oxygen_saturation`, `heart_rate_variability`,
//! `altitude`) and holds one line: a value, optionally followed by an
//! RFC 3339 capture time. Without a time the file's modification time is
//! used.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use hikewatch_core::{Acquisition, Error, MetricKind, MetricSample, Result, SensorSource};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Reads metric files from a directory.
pub struct FileSource {
    dir: PathBuf,
    name: String,
    push_interval: Duration,
}

impl FileSource {
    /// Creates a source reading from `dir`; altitude is re-read every
    /// `push_interval` and pushed when it changes.
    pub fn new<P: AsRef<Path>>(dir: P, push_interval: Duration) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            name: format!("file:{}", dir.display()),
            dir,
            push_interval: super::push_period(push_interval),
        }
    }

    fn path_for(&self, kind: MetricKind) -> PathBuf {
        self.dir.join(kind.id())
    }
}

/// Parses `value [timestamp]`.
fn parse_reading(content: &str) -> Result<(f64, Option<DateTime<Utc>>)> {
    let mut parts = content.split_whitespace();
    let value = parts
        .next()
        .ok_or_else(|| Error::SensorUnavailable("empty reading".to_string()))?;
    let value: f64 = value
        .parse()
        .map_err(|_| Error::SensorUnavailable(format!("invalid value '{}'", value)))?;

    let captured_at = match parts.next() {
        Some(ts) => Some(
            DateTime::parse_from_rfc3339(ts)
                .map_err(|e| Error::SensorUnavailable(format!("invalid timestamp '{}': {}", ts, e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    Ok((value, captured_at))
}

/// Reads one metric file. A missing file means no sample yet.
async fn read_sample(path: PathBuf) -> Result<Option<MetricSample>> {
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let (value, captured_at) = parse_reading(&content)?;
    let captured_at = match captured_at {
        Some(ts) => ts,
        None => tokio::fs::metadata(&path)
            .await?
            .modified()
            .map(DateTime::<Utc>::from)?,
    };
    Ok(Some(MetricSample::new(value, captured_at)))
}

impl SensorSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_authorization(&self) -> BoxFuture<'static, Result<()>> {
        let dir = self.dir.clone();
        async move {
            tokio::fs::read_dir(&dir)
                .await
                .map(|_| ())
                .map_err(|e| Error::PermissionDenied(format!("{}: {}", dir.display(), e)))
        }
        .boxed()
    }

    fn query_latest(&self, kind: MetricKind) -> BoxFuture<'static, Result<Option<MetricSample>>> {
        let path = self.path_for(kind);
        async move {
            if kind.acquisition() != Acquisition::Pull {
                return Err(Error::Unsupported { kind, mode: "pull" });
            }
            read_sample(path).await
        }
        .boxed()
    }

    fn subscribe(&self, kind: MetricKind) -> Result<BoxStream<'static, Result<f64>>> {
        if kind.acquisition() != Acquisition::Push {
            return Err(Error::Unsupported { kind, mode: "push" });
        }

        let path = self.path_for(kind);
        let mut ticker = interval_at(Instant::now(), self.push_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Emits only when the file's content changes
        let updates = stream::unfold(
            (ticker, None::<String>),
            move |(mut ticker, mut last)| {
                let path = path.clone();
                async move {
                    loop {
                        ticker.tick().await;
                        let content = match tokio::fs::read_to_string(&path).await {
                            Ok(content) => content,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(e) => return Some((Err(Error::from(e)), (ticker, last))),
                        };
                        if last.as_deref() == Some(content.as_str()) {
                            continue;
                        }
                        let reading = parse_reading(&content).map(|(value, _)| value);
                        last = Some(content);
                        return Some((reading, (ticker, last)));
                    }
                }
            },
        );
        Ok(updates.boxed())
    }

    fn unsubscribe(&self, kind: MetricKind) {
        debug!("Stopped watching {}", self.path_for(kind).display());
    }
}
