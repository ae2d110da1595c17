//! Executors backed by a tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};

use super::scheduled::{ScheduledExecutor, ScheduledHandle};
use super::{Executor, RepeatingTask, Task};
use crate::error::{Error, Result};

/// Runs task bodies on the runtime's blocking pool and uses tokio timers for
/// scheduling.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::Rejected(format!("no tokio runtime: {e}")))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Run one repetition on the blocking pool. `false` stops the schedule.
async fn run_repetition(task: &RepeatingTask) -> bool {
    let task = Arc::clone(task);
    match tokio::task::spawn_blocking(move || task()).await {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            tracing::warn!("repeated task panicked, cancelling later runs");
            false
        }
        Err(_) => false,
    }
}

fn check_period(period: Duration) -> Result<()> {
    if period.is_zero() {
        return Err(Error::Rejected("period must be positive".to_string()));
    }
    Ok(())
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        self.handle.spawn_blocking(move || task.run());
        Ok(())
    }
}

impl ScheduledExecutor for TokioExecutor {
    fn schedule(&self, task: Task, delay: Duration) -> Result<ScheduledHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::Acquire) {
                return;
            }
            if let Err(e) = tokio::task::spawn_blocking(move || task.run()).await {
                tracing::warn!(error = %e, "scheduled task did not complete");
            }
        });
        Ok(ScheduledHandle::new(cancelled).with_abort(join.abort_handle()))
    }

    fn schedule_at_fixed_rate(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle> {
        check_period(period)?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = self.handle.spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + initial_delay, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticks.tick().await;
                if flag.load(Ordering::Acquire) || !run_repetition(&task).await {
                    break;
                }
            }
        });
        Ok(ScheduledHandle::new(cancelled).with_abort(join.abort_handle()))
    }

    fn schedule_with_fixed_delay(
        &self,
        task: RepeatingTask,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<ScheduledHandle> {
        check_period(delay)?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                if flag.load(Ordering::Acquire) || !run_repetition(&task).await {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        });
        Ok(ScheduledHandle::new(cancelled).with_abort(join.abort_handle()))
    }
}
