//! Telemetry sink contract and the sinks shipped with the engine.
//!
//! Observations are fire-and-forget: recording must never fail the caller,
//! so `record` has no error channel.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tags attached to an observation (ordered for stable output).
pub type Tags = BTreeMap<String, String>;

/// Build a tag map from `(key, value)` pairs.
pub fn tags<I, K, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect()
}

/// A single recorded metric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub tags: Tags,
    pub recorded_at: DateTime<Utc>,
}

/// Receives latency and outcome observations.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record(&self, metric: &str, value: f64, unit: &str, tags: Tags);
}

/// Emits every observation as a `tracing` event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, metric: &str, value: f64, unit: &str, tags: Tags) {
        tracing::debug!(metric, value, unit, tags = ?tags, "telemetry");
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTelemetrySink {
    inner: Mutex<Vec<Observation>>,
}

impl InMemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Observation> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Observations recorded under `metric`, in recording order.
    pub fn by_metric(&self, metric: &str) -> Vec<Observation> {
        self.all().into_iter().filter(|o| o.metric == metric).collect()
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn record(&self, metric: &str, value: f64, unit: &str, tags: Tags) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Observation {
                metric: metric.to_string(),
                value,
                unit: unit.to_string(),
                tags,
                recorded_at: Utc::now(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_filters_by_metric() {
        let sink = InMemoryTelemetrySink::new();
        sink.record("inference.latency", 1.5, "ms", tags([("model_id", "a")]));
        sink.record("automation.tick", 3.0, "rules", Tags::new());
        sink.record("inference.latency", 2.5, "ms", tags([("model_id", "b")]));

        let latencies = sink.by_metric("inference.latency");
        assert_eq!(latencies.len(), 2);
        assert_eq!(latencies[1].tags.get("model_id").map(String::as_str), Some("b"));
        assert_eq!(sink.all().len(), 3);
    }

    #[test]
    fn tags_stringify_values() {
        let t = tags([("confidence", 0.5), ("attempt", 2.0)]);
        assert_eq!(t.get("confidence").map(String::as_str), Some("0.5"));
        assert_eq!(t.get("attempt").map(String::as_str), Some("2"));
    }
}
