use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::AbortHandle;

use super::{Executor, RepeatingTask, Task};
use crate::error::Result;

/// Executor that can also run tasks after a delay or periodically.
pub trait ScheduledExecutor: Executor {
    /// Run `task` once after `delay`.
    fn schedule(&self, task: Task, delay: Duration) -> Result<ScheduledHandle>;

    /// Run `task` every `period`, measured start to start. Runs never
    /// overlap; missed periods are run back to back.
    fn schedule_at_fixed_rate(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle>;

    /// Run `task` repeatedly, waiting `delay` between the end of one run and
    /// the start of the next.
    fn schedule_with_fixed_delay(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<ScheduledHandle>;
}

impl<S: ScheduledExecutor + ?Sized> ScheduledExecutor for Arc<S> {
    fn schedule(&self, task: Task, delay: Duration) -> Result<ScheduledHandle> {
        (**self).schedule(task, delay)
    }

    fn schedule_at_fixed_rate(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle> {
        (**self).schedule_at_fixed_rate(task, initial_delay, period)
    }

    fn schedule_with_fixed_delay(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<ScheduledHandle> {
        (**self).schedule_with_fixed_delay(task, initial_delay, delay)
    }
}

/// Cancels a scheduled task. A run already in progress finishes.
#[derive(Debug, Clone)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl ScheduledHandle {
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            abort: None,
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the schedule has ended, by cancellation or otherwise.
    pub fn is_finished(&self) -> bool {
        self.is_cancelled() || self.abort.as_ref().is_some_and(AbortHandle::is_finished)
    }
}
