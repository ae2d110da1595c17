//! Unbounded registry backed by a lock-protected hash map.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use super::listener::{TaggedMetricRegistryListener, notify_added, notify_removed, same_listener};
use super::metric::{Gauge, Metric, MetricKind};
use super::name::MetricName;
use super::{MetricFactory, TaggedMetricRegistry, mismatch};
use crate::error::Result;

/// Registry that keeps every metric until it is explicitly removed.
///
/// Listener callbacks run under the map's write lock, so add and remove
/// notifications for one name are never reordered.
#[derive(Default)]
pub struct DefaultTaggedMetricRegistry {
    metrics: RwLock<HashMap<MetricName, Metric>>,
    listeners: RwLock<Vec<Arc<dyn TaggedMetricRegistryListener>>>,
}

impl DefaultTaggedMetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaggedMetricRegistry for DefaultTaggedMetricRegistry {
    fn metric(
        &self,
        name: &MetricName,
        kind: MetricKind,
        factory: MetricFactory<'_>,
    ) -> Result<Metric> {
        if let Some(existing) = self.metrics.read().get(name) {
            return check_kind(name, existing, kind);
        }

        let mut metrics = self.metrics.write();
        match metrics.entry(name.clone()) {
            Entry::Occupied(entry) => check_kind(name, entry.get(), kind),
            Entry::Vacant(entry) => {
                let created = factory();
                if created.kind() != kind {
                    return Err(mismatch(name, &created, kind));
                }
                entry.insert(created.clone());
                notify_added(&self.listeners.read(), name, &created);
                tracing::trace!(metric = %name, %kind, "registered metric");
                Ok(created)
            }
        }
    }

    fn gauge(&self, name: &MetricName, gauge: Gauge) -> Arc<Gauge> {
        let gauge = Arc::new(gauge);
        let metric = Metric::Gauge(Arc::clone(&gauge));
        let mut metrics = self.metrics.write();
        let listeners = self.listeners.read();
        if let Some(replaced) = metrics.insert(name.clone(), metric.clone()) {
            notify_removed(&listeners, name, &replaced);
        }
        notify_added(&listeners, name, &metric);
        gauge
    }

    fn get_metrics(&self) -> HashMap<MetricName, Metric> {
        self.metrics.read().clone()
    }

    fn remove(&self, name: &MetricName) -> Option<Metric> {
        let mut metrics = self.metrics.write();
        let removed = metrics.remove(name)?;
        notify_removed(&self.listeners.read(), name, &removed);
        Some(removed)
    }

    fn add_listener(&self, listener: Arc<dyn TaggedMetricRegistryListener>) {
        self.listeners.write().push(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn TaggedMetricRegistryListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }
}

fn check_kind(name: &MetricName, existing: &Metric, kind: MetricKind) -> Result<Metric> {
    if existing.kind() == kind {
        Ok(existing.clone())
    } else {
        Err(mismatch(name, existing, kind))
    }
}
