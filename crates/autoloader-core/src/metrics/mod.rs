//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and HTTP endpoint
//!
//! Events are recorded through a [`MetricsSink`] that is passed explicitly to
//! the components that emit them, so tests can observe emitted metrics
//! without a process-wide recorder.

pub mod events;
pub mod server;

use std::time::Duration;

pub use server::{DEFAULT_METRICS_ADDR, MetricsController, init_global, init_test};

/// Label set attached to a metric observation.
pub type Labels = Vec<(&'static str, String)>;

/// Destination for metric observations.
pub trait MetricsSink: Send + Sync {
    /// Record a duration in a histogram.
    fn observe_duration(&self, name: &'static str, labels: Labels, duration: Duration);

    /// Increment a counter by one.
    fn increment_counter(&self, name: &'static str, labels: Labels);

    /// Set a gauge to an absolute value.
    fn set_gauge(&self, name: &'static str, labels: Labels, value: f64);
}

/// Sink that forwards observations to the installed `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

fn to_labels(labels: Labels) -> Vec<metrics::Label> {
    labels
        .into_iter()
        .map(|(key, value)| metrics::Label::new(key, value))
        .collect()
}

impl MetricsSink for PrometheusSink {
    fn observe_duration(&self, name: &'static str, labels: Labels, duration: Duration) {
        metrics::histogram!(name, to_labels(labels)).record(duration.as_secs_f64());
    }

    fn increment_counter(&self, name: &'static str, labels: Labels) {
        metrics::counter!(name, to_labels(labels)).increment(1);
    }

    fn set_gauge(&self, name: &'static str, labels: Labels, value: f64) {
        metrics::gauge!(name, to_labels(labels)).set(value);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn observe_duration(&self, _name: &'static str, _labels: Labels, _duration: Duration) {}
    fn increment_counter(&self, _name: &'static str, _labels: Labels) {}
    fn set_gauge(&self, _name: &'static str, _labels: Labels, _value: f64) {}
}

/// Macro for emitting metric events (Vector-style pattern).
///
/// Calls `InternalEvent::emit()` on the given event with the given sink.
///
/// # Example
///
/// ```ignore
/// use autoloader_core::metrics::events::{AutoloadCompleted, OperationStatus};
///
/// emit!(sink, AutoloadCompleted { experiment, datatype, status, duration });
/// ```
#[macro_export]
macro_rules! emit {
    ($sink:expr, $event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event, &*$sink)
    };
}

// Re-export the macro at module level
pub use emit;
