//! Tracing, logging, telemetry (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Telemetry sink contract and sinks.
pub mod metrics;

pub use metrics::{
    tags, InMemoryTelemetrySink, Observation, Tags, TelemetrySink, TracingTelemetrySink,
};
