use std::sync::Arc;

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Label, Metadata,
    Recorder, SharedString, Unit,
};

use crate::{
    client::ClientCore,
    format::{write_float, MetricKind, MetricValue},
};

/// A recorder that forwards `metrics` calls to a StatsD client.
///
/// Nothing is aggregated: every counter increment, gauge update and histogram sample becomes one line.
/// Counters are sent as `|c`, with absolute values sent as gauges. Gauges are sent as `|g`, with
/// increments and decrements sent as signed deltas. Histograms are sent as `|h`. Labels become tags.
pub struct StatsdRecorder {
    core: Arc<ClientCore>,
}

impl StatsdRecorder {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        StatsdRecorder { core }
    }

    fn handle(&self, key: &Key) -> Arc<MetricHandle> {
        Arc::new(MetricHandle {
            core: Arc::clone(&self.core),
            name: key.name().to_string(),
            tags: key.labels().map(label_to_tag).collect(),
        })
    }
}

impl Recorder for StatsdRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.handle(key))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.handle(key))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.handle(key))
    }
}

fn label_to_tag(label: &Label) -> String {
    if label.value().is_empty() {
        label.key().to_string()
    } else {
        format!("{}:{}", label.key(), label.value())
    }
}

/// Renders a gauge delta with an explicit sign, which StatsD reads as an adjustment rather than a value.
fn signed_delta(delta: f64) -> String {
    let mut out = String::with_capacity(16);
    out.push(if delta.is_sign_negative() { '-' } else { '+' });
    write_float(&mut out, delta.abs());
    out
}

struct MetricHandle {
    core: Arc<ClientCore>,
    name: String,
    tags: Vec<String>,
}

impl MetricHandle {
    fn emit(&self, value: MetricValue, kind: MetricKind) {
        self.core.metric(&self.name, value, kind, None, &self.tags);
    }
}

impl CounterFn for MetricHandle {
    fn increment(&self, value: u64) {
        self.emit(value.into(), MetricKind::Counter);
    }

    fn absolute(&self, value: u64) {
        self.emit(value.into(), MetricKind::Gauge);
    }
}

impl GaugeFn for MetricHandle {
    fn increment(&self, value: f64) {
        self.core.metric_raw(&self.name, &signed_delta(value), MetricKind::Gauge, None, &self.tags);
    }

    fn decrement(&self, value: f64) {
        self.core.metric_raw(&self.name, &signed_delta(-value), MetricKind::Gauge, None, &self.tags);
    }

    fn set(&self, value: f64) {
        self.emit(value.into(), MetricKind::Gauge);
    }
}

impl HistogramFn for MetricHandle {
    fn record(&self, value: f64) {
        self.emit(value.into(), MetricKind::Histogram);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_become_tags() {
        assert_eq!(label_to_tag(&Label::new("env", "prod")), "env:prod");
        assert_eq!(label_to_tag(&Label::new("canary", "")), "canary");
    }

    #[test]
    fn deltas_carry_a_sign() {
        assert_eq!(signed_delta(1.5), "+1.5");
        assert_eq!(signed_delta(-2.0), "-2");
        assert_eq!(signed_delta(0.0), "+0");
    }
}
