//! Registry decorator that evicts idle metrics.
//!
//! Tag cardinality (per endpoint, per caller, ...) can grow without bound.
//! Every access through this registry touches the name's last-used instant,
//! and names idle for longer than the window are removed from the backing
//! registry, which notifies its listeners as usual.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::listener::TaggedMetricRegistryListener;
use super::metric::{Gauge, Metric, MetricKind};
use super::name::MetricName;
use super::{DefaultTaggedMetricRegistry, MetricFactory, TaggedMetricRegistry};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

pub struct SlidingWindowTaggedMetricRegistry {
    backing: Arc<dyn TaggedMetricRegistry>,
    window: Duration,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<WindowState>,
}

struct WindowState {
    touched: HashMap<MetricName, Instant>,
    next_sweep: Instant,
}

impl SlidingWindowTaggedMetricRegistry {
    /// Evict metrics idle for longer than `window`.
    pub fn new(window: Duration) -> Self {
        Self::with_backing(
            Arc::new(DefaultTaggedMetricRegistry::new()),
            window,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::with_backing(Arc::new(DefaultTaggedMetricRegistry::new()), window, clock)
    }

    /// Decorate an existing registry. Metrics already in `backing` are
    /// considered touched now.
    pub fn with_backing(
        backing: Arc<dyn TaggedMetricRegistry>,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let touched = backing
            .get_metrics()
            .into_keys()
            .map(|name| (name, now))
            .collect();
        let sweep_interval = window / 4;
        Self {
            backing,
            window,
            sweep_interval,
            clock,
            state: Mutex::new(WindowState {
                touched,
                next_sweep: now + sweep_interval,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Evict every metric idle past the window. Returns how many were
    /// removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.sweep(&mut state, now)
    }

    fn sweep_if_due(&self, state: &mut WindowState, now: Instant) {
        if now >= state.next_sweep {
            self.sweep(state, now);
        }
    }

    /// Runs with the state lock held, so a touch cannot interleave between
    /// the staleness check and the removal.
    fn sweep(&self, state: &mut WindowState, now: Instant) -> usize {
        state.next_sweep = now + self.sweep_interval;
        let Some(cutoff) = now.checked_sub(self.window) else {
            return 0;
        };
        let stale: Vec<MetricName> = state
            .touched
            .iter()
            .filter(|(_, last_used)| **last_used < cutoff)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            state.touched.remove(name);
            self.backing.remove(name);
        }
        if !stale.is_empty() {
            tracing::debug!(evicted = stale.len(), "evicted idle metrics");
        }
        stale.len()
    }
}

impl TaggedMetricRegistry for SlidingWindowTaggedMetricRegistry {
    fn metric(
        &self,
        name: &MetricName,
        kind: MetricKind,
        factory: MetricFactory<'_>,
    ) -> Result<Metric> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.sweep_if_due(&mut state, now);
        let metric = self.backing.metric(name, kind, factory)?;
        state.touched.insert(name.clone(), now);
        Ok(metric)
    }

    fn gauge(&self, name: &MetricName, gauge: Gauge) -> Arc<Gauge> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.sweep_if_due(&mut state, now);
        let gauge = self.backing.gauge(name, gauge);
        state.touched.insert(name.clone(), now);
        gauge
    }

    fn get_metrics(&self) -> HashMap<MetricName, Metric> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.sweep(&mut state, now);
        self.backing.get_metrics()
    }

    fn remove(&self, name: &MetricName) -> Option<Metric> {
        let mut state = self.state.lock();
        state.touched.remove(name);
        self.backing.remove(name)
    }

    fn add_listener(&self, listener: Arc<dyn TaggedMetricRegistryListener>) {
        self.backing.add_listener(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn TaggedMetricRegistryListener>) -> bool {
        self.backing.remove_listener(listener)
    }
}
