//! Tagged metric registries.
//!
//! A registry maps a [`MetricName`] to exactly one [`Metric`] for the
//! lifetime of that entry. Two implementations are provided: an unbounded
//! [`DefaultTaggedMetricRegistry`] and a [`SlidingWindowTaggedMetricRegistry`]
//! that evicts series which have not been touched within a window.

pub mod default;
pub mod listener;
pub mod metric;
pub mod name;
pub mod sliding_window;

pub use default::DefaultTaggedMetricRegistry;
pub use listener::TaggedMetricRegistryListener;
pub use metric::{
    Counter, Gauge, Histogram, HistogramSnapshot, Meter, MeterRates, Metric, MetricKind,
    MetricSnapshot, Timer, TimerContext,
};
pub use name::{MetricName, MetricNameBuilder, REDACTED};
pub use sliding_window::SlidingWindowTaggedMetricRegistry;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Creates the metric stored under a name on first access.
pub type MetricFactory<'a> = &'a dyn Fn() -> Metric;

/// Concurrent store of tagged metrics.
pub trait TaggedMetricRegistry: Send + Sync {
    /// Get the metric stored under `name`, creating it with `factory` if
    /// absent. Creation happens at most once per name even under concurrent
    /// first access. Fails with [`Error::TypeMismatch`] if the stored metric
    /// (or the factory's product) is not of `kind`.
    fn metric(&self, name: &MetricName, kind: MetricKind, factory: MetricFactory<'_>)
    -> Result<Metric>;

    /// Register a gauge, replacing whatever is stored under `name`.
    fn gauge(&self, name: &MetricName, gauge: Gauge) -> Arc<Gauge>;

    /// A consistent snapshot of every registered metric.
    fn get_metrics(&self) -> HashMap<MetricName, Metric>;

    /// Remove a metric, notifying listeners.
    fn remove(&self, name: &MetricName) -> Option<Metric>;

    fn add_listener(&self, listener: Arc<dyn TaggedMetricRegistryListener>);

    /// Returns `false` if the listener was not subscribed.
    fn remove_listener(&self, listener: &Arc<dyn TaggedMetricRegistryListener>) -> bool;

    fn counter(&self, name: &MetricName) -> Result<Arc<Counter>> {
        let metric = self.metric(name, MetricKind::Counter, &|| {
            Metric::Counter(Arc::new(Counter::new()))
        })?;
        metric
            .as_counter()
            .cloned()
            .ok_or_else(|| mismatch(name, &metric, MetricKind::Counter))
    }

    fn meter(&self, name: &MetricName) -> Result<Arc<Meter>> {
        let metric = self.metric(name, MetricKind::Meter, &|| {
            Metric::Meter(Arc::new(Meter::new()))
        })?;
        metric
            .as_meter()
            .cloned()
            .ok_or_else(|| mismatch(name, &metric, MetricKind::Meter))
    }

    fn histogram(&self, name: &MetricName) -> Result<Arc<Histogram>> {
        let metric = self.metric(name, MetricKind::Histogram, &|| {
            Metric::Histogram(Arc::new(Histogram::new()))
        })?;
        metric
            .as_histogram()
            .cloned()
            .ok_or_else(|| mismatch(name, &metric, MetricKind::Histogram))
    }

    fn timer(&self, name: &MetricName) -> Result<Arc<Timer>> {
        let metric = self.metric(name, MetricKind::Timer, &|| {
            Metric::Timer(Arc::new(Timer::new()))
        })?;
        metric
            .as_timer()
            .cloned()
            .ok_or_else(|| mismatch(name, &metric, MetricKind::Timer))
    }
}

pub(crate) fn mismatch(name: &MetricName, existing: &Metric, requested: MetricKind) -> Error {
    Error::TypeMismatch {
        name: name.clone(),
        existing: existing.kind(),
        requested,
    }
}
