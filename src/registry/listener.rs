//! Registry change notifications.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::metric::{Counter, Gauge, Histogram, Meter, Metric, Timer};
use super::name::MetricName;

/// Observer of metrics being added to or removed from a registry.
///
/// Callbacks run synchronously while the registry holds its write lock,
/// so they must not call back into the same registry.
#[allow(unused_variables)]
pub trait TaggedMetricRegistryListener: Send + Sync {
    fn on_gauge_added(&self, name: &MetricName, gauge: &Arc<Gauge>) {}
    fn on_gauge_removed(&self, name: &MetricName) {}
    fn on_counter_added(&self, name: &MetricName, counter: &Arc<Counter>) {}
    fn on_counter_removed(&self, name: &MetricName) {}
    fn on_meter_added(&self, name: &MetricName, meter: &Arc<Meter>) {}
    fn on_meter_removed(&self, name: &MetricName) {}
    fn on_histogram_added(&self, name: &MetricName, histogram: &Arc<Histogram>) {}
    fn on_histogram_removed(&self, name: &MetricName) {}
    fn on_timer_added(&self, name: &MetricName, timer: &Arc<Timer>) {}
    fn on_timer_removed(&self, name: &MetricName) {}
}

/// Identity of a listener handle (data pointer only, vtables may differ).
pub(crate) fn same_listener(
    a: &Arc<dyn TaggedMetricRegistryListener>,
    b: &Arc<dyn TaggedMetricRegistryListener>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn notify_added(
    listeners: &[Arc<dyn TaggedMetricRegistryListener>],
    name: &MetricName,
    metric: &Metric,
) {
    for listener in listeners {
        guarded(name, || match metric {
            Metric::Counter(c) => listener.on_counter_added(name, c),
            Metric::Meter(m) => listener.on_meter_added(name, m),
            Metric::Histogram(h) => listener.on_histogram_added(name, h),
            Metric::Timer(t) => listener.on_timer_added(name, t),
            Metric::Gauge(g) => listener.on_gauge_added(name, g),
        });
    }
}

pub(crate) fn notify_removed(
    listeners: &[Arc<dyn TaggedMetricRegistryListener>],
    name: &MetricName,
    metric: &Metric,
) {
    for listener in listeners {
        guarded(name, || match metric {
            Metric::Counter(_) => listener.on_counter_removed(name),
            Metric::Meter(_) => listener.on_meter_removed(name),
            Metric::Histogram(_) => listener.on_histogram_removed(name),
            Metric::Timer(_) => listener.on_timer_removed(name),
            Metric::Gauge(_) => listener.on_gauge_removed(name),
        });
    }
}

fn guarded(name: &MetricName, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(metric = %name, "registry listener panicked");
    }
}
