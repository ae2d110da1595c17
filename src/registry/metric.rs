//! Metric variants held by a registry.
//!
//! All variants are internally synchronized and shared through `Arc`, so
//! a handle obtained from the registry can be updated from any thread.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of samples a histogram reservoir retains.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Kind + enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Meter,
    Histogram,
    Timer,
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Counter => "counter",
            Self::Meter => "meter",
            Self::Histogram => "histogram",
            Self::Timer => "timer",
            Self::Gauge => "gauge",
        };
        write!(f, "{s}")
    }
}

/// A metric owned by a registry.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Meter(Arc<Meter>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
    Gauge(Arc<Gauge>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Meter(_) => MetricKind::Meter,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Timer(_) => MetricKind::Timer,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// A fresh metric of the given kind. Gauges have no default value
    /// source, so `None` is returned for them.
    pub fn new_of_kind(kind: MetricKind) -> Option<Self> {
        match kind {
            MetricKind::Counter => Some(Self::Counter(Arc::new(Counter::new()))),
            MetricKind::Meter => Some(Self::Meter(Arc::new(Meter::new()))),
            MetricKind::Histogram => Some(Self::Histogram(Arc::new(Histogram::new()))),
            MetricKind::Timer => Some(Self::Timer(Arc::new(Timer::new()))),
            MetricKind::Gauge => None,
        }
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Self::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_meter(&self) -> Option<&Arc<Meter>> {
        match self {
            Self::Meter(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Self::Histogram(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_timer(&self) -> Option<&Arc<Timer>> {
        match self {
            Self::Timer(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            Self::Gauge(g) => Some(g),
            _ => None,
        }
    }

    /// True if both handles point at the same metric instance.
    pub fn ptr_eq(&self, other: &Metric) -> bool {
        match (self, other) {
            (Self::Counter(a), Self::Counter(b)) => Arc::ptr_eq(a, b),
            (Self::Meter(a), Self::Meter(b)) => Arc::ptr_eq(a, b),
            (Self::Histogram(a), Self::Histogram(b)) => Arc::ptr_eq(a, b),
            (Self::Timer(a), Self::Timer(b)) => Arc::ptr_eq(a, b),
            (Self::Gauge(a), Self::Gauge(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Point-in-time values, for diagnostics.
    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            Self::Counter(c) => MetricSnapshot::Counter { count: c.count() },
            Self::Meter(m) => MetricSnapshot::Meter(m.rates()),
            Self::Histogram(h) => MetricSnapshot::Histogram(h.snapshot()),
            Self::Timer(t) => MetricSnapshot::Timer {
                rates: t.rates(),
                durations_nanos: t.snapshot(),
            },
            Self::Gauge(g) => MetricSnapshot::Gauge { value: g.value() },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricSnapshot {
    Counter { count: i64 },
    Meter(MeterRates),
    Histogram(HistogramSnapshot),
    Timer {
        rates: MeterRates,
        durations_nanos: HistogramSnapshot,
    },
    Gauge { value: f64 },
}

// ---------------------------------------------------------------------------
// Counter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.dec_by(1);
    }

    pub fn dec_by(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Meter
// ---------------------------------------------------------------------------

/// Exponentially weighted moving average over a fixed tick interval.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    rate: Option<f64>,
}

impl Ewma {
    fn minutes(minutes: f64) -> Self {
        let interval_secs = TICK_INTERVAL.as_secs_f64();
        Self {
            alpha: 1.0 - (-interval_secs / 60.0 / minutes).exp(),
            rate: None,
        }
    }

    fn tick(&mut self, count: u64) {
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();
        self.rate = Some(match self.rate {
            Some(rate) => rate + self.alpha * (instant_rate - rate),
            None => instant_rate,
        });
    }

    fn per_second(&self) -> f64 {
        self.rate.unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct MovingRates {
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

/// Occurrence count plus mean and moving-average rates.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    uncounted: AtomicU64,
    start: Instant,
    /// Nanoseconds since `start` of the last applied tick.
    last_tick: AtomicU64,
    rates: Mutex<MovingRates>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MeterRates {
    pub count: u64,
    pub mean_rate: f64,
    pub m1_rate: f64,
    pub m5_rate: f64,
    pub m15_rate: f64,
}

impl Meter {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            start: Instant::now(),
            last_tick: AtomicU64::new(0),
            rates: Mutex::new(MovingRates {
                m1: Ewma::minutes(1.0),
                m5: Ewma::minutes(5.0),
                m15: Ewma::minutes(15.0),
            }),
        }
    }

    pub fn mark(&self) {
        self.mark_n(1);
    }

    pub fn mark_n(&self, n: u64) {
        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::Relaxed);
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_rate(&self) -> f64 {
        let count = self.count();
        let elapsed = self.start.elapsed().as_secs_f64();
        if count == 0 || elapsed <= 0.0 {
            0.0
        } else {
            count as f64 / elapsed
        }
    }

    pub fn rates(&self) -> MeterRates {
        self.tick_if_necessary();
        let rates = self.rates.lock();
        MeterRates {
            count: self.count(),
            mean_rate: self.mean_rate(),
            m1_rate: rates.m1.per_second(),
            m5_rate: rates.m5.per_second(),
            m15_rate: rates.m15.per_second(),
        }
    }

    fn tick_if_necessary(&self) {
        let interval = TICK_INTERVAL.as_nanos() as u64;
        let now = self.start.elapsed().as_nanos() as u64;
        let old = self.last_tick.load(Ordering::Relaxed);
        let age = now.saturating_sub(old);
        if age < interval {
            return;
        }
        let new_tick = now - age % interval;
        // Only the thread that advances the tick applies the pending ticks.
        if self
            .last_tick
            .compare_exchange(old, new_tick, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let required = age / interval;
        let mut rates = self.rates.lock();
        let mut pending = self.uncounted.swap(0, Ordering::Relaxed);
        for _ in 0..required {
            rates.m1.tick(pending);
            rates.m5.tick(pending);
            rates.m15.tick(pending);
            pending = 0;
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Value distribution over the most recent samples.
#[derive(Debug)]
pub struct Histogram {
    count: AtomicU64,
    capacity: usize,
    reservoir: Mutex<VecDeque<i64>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p98: f64,
    pub p99: f64,
    pub p999: f64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RESERVOIR_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            count: AtomicU64::new(0),
            capacity,
            reservoir: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn update(&self, value: i64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut reservoir = self.reservoir.lock();
        if reservoir.len() == self.capacity {
            reservoir.pop_front();
        }
        reservoir.push_back(value);
    }

    /// Total number of updates, including samples already rotated out.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut values: Vec<i64> = self.reservoir.lock().iter().copied().collect();
        let count = self.count();
        if values.is_empty() {
            return HistogramSnapshot {
                count,
                ..HistogramSnapshot::default()
            };
        }
        values.sort_unstable();

        let n = values.len() as f64;
        let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
        let variance = if values.len() > 1 {
            values
                .iter()
                .map(|v| (*v as f64 - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0)
        } else {
            0.0
        };

        HistogramSnapshot {
            count,
            min: values.first().copied().unwrap_or_default(),
            max: values.last().copied().unwrap_or_default(),
            mean,
            stddev: variance.sqrt(),
            p50: quantile(&values, 0.5),
            p75: quantile(&values, 0.75),
            p95: quantile(&values, 0.95),
            p98: quantile(&values, 0.98),
            p99: quantile(&values, 0.99),
            p999: quantile(&values, 0.999),
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear-interpolated quantile over sorted values.
fn quantile(sorted: &[i64], q: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };
    let pos = q * last as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let (Some(lo), Some(hi)) = (sorted.get(lower), sorted.get(upper)) else {
        return sorted.get(last).copied().unwrap_or_default() as f64;
    };
    let weight = pos - lower as f64;
    *lo as f64 + (*hi as f64 - *lo as f64) * weight
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// A meter of events plus a histogram of their durations in nanoseconds.
#[derive(Debug, Default)]
pub struct Timer {
    meter: Meter,
    histogram: Histogram,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark();
    }

    /// Start timing; the elapsed time is recorded when the context is
    /// stopped or dropped.
    pub fn time(&self) -> TimerContext<'_> {
        TimerContext {
            timer: self,
            start: Instant::now(),
            stopped: false,
        }
    }

    pub fn time_fn<R>(&self, f: impl FnOnce() -> R) -> R {
        let _context = self.time();
        f()
    }

    pub fn count(&self) -> u64 {
        self.histogram.count()
    }

    pub fn rates(&self) -> MeterRates {
        self.meter.rates()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.histogram.snapshot()
    }
}

pub struct TimerContext<'a> {
    timer: &'a Timer,
    start: Instant,
    stopped: bool,
}

impl TimerContext<'_> {
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if !self.stopped {
            self.stopped = true;
            self.timer.update(elapsed);
        }
        elapsed
    }
}

impl Drop for TimerContext<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

// ---------------------------------------------------------------------------
// Gauge
// ---------------------------------------------------------------------------

type GaugeFn = dyn Fn() -> f64 + Send + Sync;

/// A read-only value computed by the caller on every read.
pub struct Gauge {
    supplier: Box<GaugeFn>,
}

impl Gauge {
    pub fn new(supplier: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        Self {
            supplier: Box::new(supplier),
        }
    }

    pub fn value(&self) -> f64 {
        (self.supplier)()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").finish_non_exhaustive()
    }
}
