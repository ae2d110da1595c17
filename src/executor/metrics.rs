//! Metric names recorded by the executor decorators, all tagged with
//! `executor: <name>`.

use std::sync::Arc;

use crate::error::Result;
use crate::registry::{Counter, Histogram, Meter, MetricName, TaggedMetricRegistry, Timer};

pub const EXECUTOR_TAG: &str = "executor";

pub const SUBMITTED: &str = "executor.submitted";
pub const RUNNING: &str = "executor.running";
pub const COMPLETED: &str = "executor.completed";
pub const DURATION: &str = "executor.duration";
pub const QUEUED_DURATION: &str = "executor.queued-duration";

pub const SCHEDULED_ONCE: &str = "executor.scheduled.once";
pub const SCHEDULED_REPETITIVELY: &str = "executor.scheduled.repetitively";
pub const SCHEDULED_OVERRUN: &str = "executor.scheduled.overrun";
pub const SCHEDULED_PERCENT_OF_PERIOD: &str = "executor.scheduled.percent-of-period";

pub const THREADS_CREATED: &str = "executor.threads.created";
pub const THREADS_RUNNING: &str = "executor.threads.running";
pub const THREADS_TERMINATED: &str = "executor.threads.terminated";

/// `metric{executor=<executor>}`.
pub fn executor_metric_name(metric: &str, executor: &str) -> MetricName {
    MetricName::builder()
        .safe_name(metric)
        .put_safe_tag(EXECUTOR_TAG, executor)
        .build()
}

/// Resolves one executor's metrics through a registry on every use.
///
/// Lookups that fail (a name already taken by another metric kind) are
/// logged and yield `None`, so recording never disturbs the task.
#[derive(Clone)]
pub struct ExecutorMetrics {
    registry: Arc<dyn TaggedMetricRegistry>,
    executor: String,
}

impl ExecutorMetrics {
    pub fn new(registry: Arc<dyn TaggedMetricRegistry>, executor: impl Into<String>) -> Self {
        Self {
            registry,
            executor: executor.into(),
        }
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<dyn TaggedMetricRegistry> {
        &self.registry
    }

    pub fn name(&self, metric: &str) -> MetricName {
        executor_metric_name(metric, &self.executor)
    }

    pub fn meter(&self, metric: &str) -> Option<Arc<Meter>> {
        self.logged(metric, |r, n| r.meter(n))
    }

    pub fn counter(&self, metric: &str) -> Option<Arc<Counter>> {
        self.logged(metric, |r, n| r.counter(n))
    }

    pub fn histogram(&self, metric: &str) -> Option<Arc<Histogram>> {
        self.logged(metric, |r, n| r.histogram(n))
    }

    pub fn timer(&self, metric: &str) -> Option<Arc<Timer>> {
        self.logged(metric, |r, n| r.timer(n))
    }

    /// Metrics of a plain executor.
    pub(crate) fn register_executor(&self) -> Result<()> {
        self.registry.meter(&self.name(SUBMITTED))?;
        self.registry.counter(&self.name(RUNNING))?;
        self.registry.meter(&self.name(COMPLETED))?;
        self.registry.timer(&self.name(DURATION))?;
        self.registry.timer(&self.name(QUEUED_DURATION))?;
        Ok(())
    }

    /// Plain executor metrics plus the scheduling ones.
    pub(crate) fn register_scheduled(&self) -> Result<()> {
        self.register_executor()?;
        self.registry.meter(&self.name(SCHEDULED_ONCE))?;
        self.registry.meter(&self.name(SCHEDULED_REPETITIVELY))?;
        self.registry.counter(&self.name(SCHEDULED_OVERRUN))?;
        self.registry.histogram(&self.name(SCHEDULED_PERCENT_OF_PERIOD))?;
        Ok(())
    }

    pub(crate) fn register_threads(&self) -> Result<()> {
        self.registry.meter(&self.name(THREADS_CREATED))?;
        self.registry.counter(&self.name(THREADS_RUNNING))?;
        self.registry.meter(&self.name(THREADS_TERMINATED))?;
        Ok(())
    }

    fn logged<T>(
        &self,
        metric: &str,
        resolve: impl FnOnce(&dyn TaggedMetricRegistry, &MetricName) -> Result<Arc<T>>,
    ) -> Option<Arc<T>> {
        let name = self.name(metric);
        match resolve(self.registry.as_ref(), &name) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(metric = %name, "cannot record executor metric: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for ExecutorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorMetrics")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
