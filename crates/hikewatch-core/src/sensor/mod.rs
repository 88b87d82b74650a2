//! Sensor sources and per-metric pollers.

mod poller;

pub use poller::{SampleSink, SensorPoller};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::metric::{MetricKind, MetricSample};
use crate::Result;

/// A platform health-sensor framework.
///
/// Pull metrics are read with [`query_latest`](SensorSource::query_latest);
/// push metrics are read from the stream returned by
/// [`subscribe`](SensorSource::subscribe). Both produce zero or one sample
/// per call or event. Futures and streams are `'static` so pollers can run
/// them on their own tasks.
pub trait SensorSource: Send + Sync + 'static {
    /// Returns the source name used in logs.
    fn name(&self) -> &str;

    /// Requests read access. A denial is not fatal; later queries simply
    /// return no sample.
    fn request_authorization(&self) -> BoxFuture<'static, Result<()>>;

    /// Fetches the most recent sample of a pull metric.
    fn query_latest(&self, kind: MetricKind) -> BoxFuture<'static, Result<Option<MetricSample>>>;

    /// Starts continuous updates for a push metric. Values carry no capture
    /// time; the receiver stamps them on arrival.
    fn subscribe(&self, kind: MetricKind) -> Result<BoxStream<'static, Result<f64>>>;

    /// Ends continuous updates started by `subscribe`.
    fn unsubscribe(&self, kind: MetricKind);
}
