use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    builder::StatsdClientBuilder,
    event::{Event, ServiceCheck},
    forwarder::Delivery,
    format::{LineFormatter, MetricKind, MetricValue},
    lifecycle::{Lifecycle, LifecycleState},
    recorder::StatsdRecorder,
    resolver::RefreshTask,
    sink::SharedErrorHandler,
    telemetry::{Telemetry, TelemetrySnapshot},
    transport::Transport,
};

/// The running half of a client: everything between `submit` and the socket.
pub(crate) struct Pipeline {
    pub delivery: Box<dyn Delivery>,
    pub transport: Arc<Transport>,
    pub refresh: Option<RefreshTask>,
    pub lifecycle: Lifecycle,
    pub errors: SharedErrorHandler,
    pub telemetry: Arc<Telemetry>,
    pub shutdown_timeout: Duration,
}

/// State shared by every handle to one client.
///
/// Dropping the last handle closes the client.
pub(crate) struct ClientCore {
    formatter: LineFormatter,
    pipeline: Option<Pipeline>,
}

impl ClientCore {
    pub fn new(formatter: LineFormatter, pipeline: Option<Pipeline>) -> Self {
        ClientCore { formatter, pipeline }
    }

    pub fn metric<T: AsRef<str>>(
        &self,
        name: &str,
        value: MetricValue,
        kind: MetricKind,
        sample_rate: Option<f64>,
        tags: &[T],
    ) {
        if sampled_out(sample_rate) {
            return;
        }
        self.submit(|f| f.metric(name, value, kind, sample_rate, tags));
    }

    pub fn metric_raw<T: AsRef<str>>(
        &self,
        name: &str,
        value: &str,
        kind: MetricKind,
        sample_rate: Option<f64>,
        tags: &[T],
    ) {
        if sampled_out(sample_rate) {
            return;
        }
        self.submit(|f| f.metric_raw(name, value, kind, sample_rate, tags));
    }

    /// Renders and submits a line, if the client is still accepting lines.
    ///
    /// Rendering is skipped entirely once the client is shutting down.
    fn submit(&self, render: impl FnOnce(&LineFormatter) -> String) {
        let Some(pipeline) = &self.pipeline else { return };
        if pipeline.lifecycle.is_running() {
            pipeline.delivery.submit(render(&self.formatter));
        }
    }

    fn close(&self) {
        let Some(pipeline) = &self.pipeline else { return };
        if !pipeline.lifecycle.begin_shutdown() {
            return;
        }
        debug!("Closing client.");

        if let Some(refresh) = &pipeline.refresh {
            refresh.stop();
        }

        if let Err(e) = pipeline.delivery.shutdown(pipeline.shutdown_timeout) {
            pipeline.errors.handle(e);
        }

        pipeline.transport.close();
        pipeline.lifecycle.mark_closed();
        debug!("Client closed.");
    }

    fn state(&self) -> LifecycleState {
        self.pipeline.as_ref().map_or(LifecycleState::Running, |p| p.lifecycle.state())
    }

    fn telemetry(&self) -> TelemetrySnapshot {
        self.pipeline.as_ref().map(|p| p.telemetry.snapshot()).unwrap_or_default()
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Returns `true` if a call with the given sample rate should be skipped.
///
/// Calls without a rate, or with a rate of one or more, are never skipped.
fn sampled_out(sample_rate: Option<f64>) -> bool {
    match sample_rate {
        Some(rate) if rate < 1.0 => rand::random::<f64>() > rate,
        _ => false,
    }
}

/// A StatsD client.
///
/// Every recording method formats a single line and hands it to the delivery pipeline, which batches
/// lines into datagrams and sends them from a background thread. Recording never blocks beyond a bounded
/// enqueue, never returns an error and never panics: failures inside the pipeline go to the configured
/// [`ErrorHandler`](crate::ErrorHandler) and the affected data is dropped.
///
/// `StatsdClient` is cheap to clone; all clones share one pipeline. The client is closed by
/// [`close`](Self::close), or when the last clone is dropped.
#[derive(Clone)]
pub struct StatsdClient {
    core: Arc<ClientCore>,
}

impl StatsdClient {
    pub(crate) fn from_core(core: ClientCore) -> Self {
        StatsdClient { core: Arc::new(core) }
    }

    /// Creates a builder with the default configuration.
    pub fn builder() -> StatsdClientBuilder {
        StatsdClientBuilder::default()
    }

    /// Creates a client that does nothing.
    ///
    /// It owns no socket and runs no thread; every call returns immediately.
    pub fn noop() -> Self {
        StatsdClient::from_core(ClientCore::new(LineFormatter::default(), None))
    }

    /// Adjusts a counter by `delta`.
    pub fn count(&self, name: &str, delta: i64, tags: &[&str]) {
        self.core.metric(name, delta.into(), MetricKind::Counter, None, tags);
    }

    /// Adjusts a counter by `delta`, sampled at `sample_rate`.
    pub fn count_with_rate(&self, name: &str, delta: i64, sample_rate: f64, tags: &[&str]) {
        self.core.metric(name, delta.into(), MetricKind::Counter, Some(sample_rate), tags);
    }

    /// Increments a counter by one.
    pub fn increment(&self, name: &str, tags: &[&str]) {
        self.count(name, 1, tags);
    }

    /// Decrements a counter by one.
    pub fn decrement(&self, name: &str, tags: &[&str]) {
        self.count(name, -1, tags);
    }

    /// Records the current value of a gauge.
    pub fn gauge(&self, name: &str, value: impl Into<MetricValue>, tags: &[&str]) {
        self.core.metric(name, value.into(), MetricKind::Gauge, None, tags);
    }

    /// Records the current value of a gauge, sampled at `sample_rate`.
    pub fn gauge_with_rate(
        &self,
        name: &str,
        value: impl Into<MetricValue>,
        sample_rate: f64,
        tags: &[&str],
    ) {
        self.core.metric(name, value.into(), MetricKind::Gauge, Some(sample_rate), tags);
    }

    /// Records an execution time in milliseconds.
    pub fn time(&self, name: &str, millis: u64, tags: &[&str]) {
        self.core.metric(name, millis.into(), MetricKind::Timer, None, tags);
    }

    /// Records an execution time in milliseconds, sampled at `sample_rate`.
    pub fn time_with_rate(&self, name: &str, millis: u64, sample_rate: f64, tags: &[&str]) {
        self.core.metric(name, millis.into(), MetricKind::Timer, Some(sample_rate), tags);
    }

    /// Records a value in a histogram.
    pub fn histogram(&self, name: &str, value: impl Into<MetricValue>, tags: &[&str]) {
        self.core.metric(name, value.into(), MetricKind::Histogram, None, tags);
    }

    /// Records a value in a histogram, sampled at `sample_rate`.
    pub fn histogram_with_rate(
        &self,
        name: &str,
        value: impl Into<MetricValue>,
        sample_rate: f64,
        tags: &[&str],
    ) {
        self.core.metric(name, value.into(), MetricKind::Histogram, Some(sample_rate), tags);
    }

    /// Records an occurrence of `value` in a set of unique values.
    pub fn set(&self, name: &str, value: &str, tags: &[&str]) {
        self.core.metric_raw(name, value, MetricKind::Set, None, tags);
    }

    /// Records an event.
    pub fn event(&self, event: &Event, tags: &[&str]) {
        self.core.submit(|f| f.event(event, tags));
    }

    /// Records the result of a service check.
    pub fn service_check(&self, check: &ServiceCheck) {
        self.core.submit(|f| f.service_check(check));
    }

    /// Returns a [`metrics::Recorder`] that records through this client.
    pub fn recorder(&self) -> StatsdRecorder {
        StatsdRecorder::new(Arc::clone(&self.core))
    }

    /// Returns the client's lifecycle state.
    ///
    /// A no-op client is always running.
    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Returns a snapshot of the delivery counters.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.core.telemetry()
    }

    /// Closes the client.
    ///
    /// Lines already accepted are delivered, waiting at most the configured shutdown timeout for the
    /// consumers to drain; the socket is then closed. Anything recorded from this point on is silently
    /// dropped. Only the first call does anything.
    pub fn close(&self) {
        self.core.close();
    }
}
