//! Per-trace sampling policies.

use std::sync::atomic::{AtomicU64, Ordering};

/// Decides, once per root span, whether a trace is emitted to observers.
pub trait Sampler: Send + Sync {
    fn sample(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSampler;

impl Sampler for AlwaysSampler {
    fn sample(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSampler;

impl Sampler for NeverSampler {
    fn sample(&self) -> bool {
        false
    }
}

/// Samples a fixed fraction of traces, deterministically spread over the
/// sequence of root spans.
#[derive(Debug)]
pub struct RateSampler {
    numerator: u64,
    denominator: u64,
    counter: AtomicU64,
}

impl RateSampler {
    /// `rate` is clamped to `0.0..=1.0`; precision is one part per million.
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 1.0 };
        let denominator = 1_000_000;
        Self {
            numerator: (rate * denominator as f64).round() as u64,
            denominator,
            counter: AtomicU64::new(0),
        }
    }
}

impl Sampler for RateSampler {
    fn sample(&self) -> bool {
        if self.numerator == 0 {
            return false;
        }
        if self.numerator >= self.denominator {
            return true;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        // Sample when the running total of `rate` crosses an integer.
        (n + 1) * self.numerator / self.denominator != n * self.numerator / self.denominator
    }
}
