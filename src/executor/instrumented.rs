//! Decorators that record executor, scheduling and thread metrics around a
//! delegate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::metrics::*;
use super::scheduled::{ScheduledExecutor, ScheduledHandle};
use super::thread::{ThreadFactory, UnstartedThread};
use super::{Executor, RepeatingTask, Task};
use crate::error::Result;
use crate::registry::{Counter, TaggedMetricRegistry};

#[derive(Clone, Copy)]
enum RunKind {
    Task,
    Repeated { period: Duration },
    Thread,
}

/// Increments the running counter on creation and settles everything else
/// on drop, so an unwinding body is still accounted for.
///
/// The running counter is decremented through the handle that was
/// incremented, so an entry evicted and recreated while the body runs never
/// goes negative. The other metrics are resolved at the end of the run.
struct Running<'a> {
    metrics: &'a ExecutorMetrics,
    kind: RunKind,
    running: Option<Arc<Counter>>,
    start: Instant,
}

impl<'a> Running<'a> {
    fn start(metrics: &'a ExecutorMetrics, kind: RunKind) -> Self {
        let running = metrics.counter(match kind {
            RunKind::Thread => THREADS_RUNNING,
            _ => RUNNING,
        });
        if let Some(running) = &running {
            running.inc();
        }
        Self {
            metrics,
            kind,
            running,
            start: Instant::now(),
        }
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(running) = self.running.take() {
            running.dec();
        }
        let m = self.metrics;
        match self.kind {
            RunKind::Thread => {
                if let Some(terminated) = m.meter(THREADS_TERMINATED) {
                    terminated.mark();
                }
            }
            RunKind::Task | RunKind::Repeated { .. } => {
                if let Some(completed) = m.meter(COMPLETED) {
                    completed.mark();
                }
                if let Some(duration) = m.timer(DURATION) {
                    duration.update(elapsed);
                }
            }
        }
        if let RunKind::Repeated { period } = self.kind {
            if let Some(percent) = m.histogram(SCHEDULED_PERCENT_OF_PERIOD) {
                percent.update(percent_of_period(elapsed, period));
            }
            if elapsed > period
                && let Some(overrun) = m.counter(SCHEDULED_OVERRUN)
            {
                overrun.inc();
            }
        }
    }
}

fn percent_of_period(elapsed: Duration, period: Duration) -> i64 {
    (100.0 * elapsed.as_secs_f64() / period.as_secs_f64()).round() as i64
}

fn running_task(metrics: &Arc<ExecutorMetrics>, task: Task) -> Task {
    let metrics = Arc::clone(metrics);
    task.decorate(move |body| {
        let _running = Running::start(&metrics, RunKind::Task);
        body();
    })
}

fn submitted_task(metrics: &Arc<ExecutorMetrics>, task: Task) -> Task {
    if let Some(submitted) = metrics.meter(SUBMITTED) {
        submitted.mark();
    }
    let submitted_at = Instant::now();
    let queued = Arc::clone(metrics);
    running_task(metrics, task).decorate(move |body| {
        if let Some(timer) = queued.timer(QUEUED_DURATION) {
            timer.update(submitted_at.elapsed());
        }
        body();
    })
}

/// Records `executor.submitted`, `running`, `completed`, `duration` and
/// `queued-duration` for every task.
pub struct TaggedMetricsExecutor<E> {
    delegate: E,
    metrics: Arc<ExecutorMetrics>,
}

impl<E: Executor> TaggedMetricsExecutor<E> {
    /// Registers the executor's metrics at zero.
    pub fn new(
        delegate: E,
        registry: Arc<dyn TaggedMetricRegistry>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let metrics = ExecutorMetrics::new(registry, name);
        metrics.register_executor()?;
        Ok(Self {
            delegate,
            metrics: Arc::new(metrics),
        })
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }
}

impl<E: Executor> Executor for TaggedMetricsExecutor<E> {
    fn execute(&self, task: Task) -> Result<()> {
        self.delegate.execute(submitted_task(&self.metrics, task))
    }
}

/// Adds `executor.scheduled.*` metrics on top of [`TaggedMetricsExecutor`].
pub struct TaggedMetricsScheduledExecutor<S> {
    delegate: S,
    metrics: Arc<ExecutorMetrics>,
}

impl<S: ScheduledExecutor> TaggedMetricsScheduledExecutor<S> {
    pub fn new(
        delegate: S,
        registry: Arc<dyn TaggedMetricRegistry>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let metrics = ExecutorMetrics::new(registry, name);
        metrics.register_scheduled()?;
        Ok(Self {
            delegate,
            metrics: Arc::new(metrics),
        })
    }

    pub fn delegate(&self) -> &S {
        &self.delegate
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }
}

impl<S: ScheduledExecutor> Executor for TaggedMetricsScheduledExecutor<S> {
    fn execute(&self, task: Task) -> Result<()> {
        self.delegate.execute(submitted_task(&self.metrics, task))
    }
}

impl<S: ScheduledExecutor> ScheduledExecutor for TaggedMetricsScheduledExecutor<S> {
    fn schedule(&self, task: Task, delay: Duration) -> Result<ScheduledHandle> {
        if let Some(once) = self.metrics.meter(SCHEDULED_ONCE) {
            once.mark();
        }
        self.delegate
            .schedule(running_task(&self.metrics, task), delay)
    }

    fn schedule_at_fixed_rate(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle> {
        if let Some(repetitively) = self.metrics.meter(SCHEDULED_REPETITIVELY) {
            repetitively.mark();
        }
        let metrics = Arc::clone(&self.metrics);
        let wrapped: RepeatingTask = Arc::new(move || {
            let _running = Running::start(&metrics, RunKind::Repeated { period });
            task();
        });
        self.delegate
            .schedule_at_fixed_rate(wrapped, initial_delay, period)
    }

    /// Fixed-delay runs have no period to overrun, so they record the plain
    /// task metrics only.
    fn schedule_with_fixed_delay(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<ScheduledHandle> {
        if let Some(repetitively) = self.metrics.meter(SCHEDULED_REPETITIVELY) {
            repetitively.mark();
        }
        let metrics = Arc::clone(&self.metrics);
        let wrapped: RepeatingTask = Arc::new(move || {
            let _running = Running::start(&metrics, RunKind::Task);
            task();
        });
        self.delegate
            .schedule_with_fixed_delay(wrapped, initial_delay, delay)
    }
}

/// Records `executor.threads.created` when a thread is made, and
/// `threads.running` / `threads.terminated` around its body.
pub struct TaggedMetricsThreadFactory<F> {
    delegate: F,
    metrics: Arc<ExecutorMetrics>,
}

impl<F: ThreadFactory> TaggedMetricsThreadFactory<F> {
    pub fn new(
        delegate: F,
        registry: Arc<dyn TaggedMetricRegistry>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let metrics = ExecutorMetrics::new(registry, name);
        metrics.register_threads()?;
        Ok(Self {
            delegate,
            metrics: Arc::new(metrics),
        })
    }

    pub fn delegate(&self) -> &F {
        &self.delegate
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }
}

impl<F: ThreadFactory> ThreadFactory for TaggedMetricsThreadFactory<F> {
    fn new_thread(&self, body: Task) -> Result<UnstartedThread> {
        let thread = self.delegate.new_thread(body)?;
        if let Some(created) = self.metrics.meter(THREADS_CREATED) {
            created.mark();
        }
        let metrics = Arc::clone(&self.metrics);
        Ok(thread.decorate(move |body| {
            let _running = Running::start(&metrics, RunKind::Thread);
            body();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_period_rounds() {
        assert_eq!(percent_of_period(Duration::from_millis(50), Duration::from_millis(100)), 50);
        assert_eq!(percent_of_period(Duration::from_millis(250), Duration::from_millis(100)), 250);
        assert_eq!(percent_of_period(Duration::ZERO, Duration::from_secs(1)), 0);
    }
}
