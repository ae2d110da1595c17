//! Executor, scheduled executor and thread factory seams, with concrete
//! implementations and metric-recording decorators.

pub mod direct;
pub mod instrumented;
pub mod metrics;
pub mod runtime;
pub mod scheduled;
pub mod thread;

pub use direct::DirectExecutor;
pub use instrumented::{
    TaggedMetricsExecutor, TaggedMetricsScheduledExecutor, TaggedMetricsThreadFactory,
};
pub use metrics::ExecutorMetrics;
pub use runtime::TokioExecutor;
pub use scheduled::{ScheduledExecutor, ScheduledHandle};
pub use thread::{NamedThreadFactory, ThreadFactory, UnstartedThread};

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::event::context::panic_message;

/// Body of a repeated scheduled task.
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync>;

type Body = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug)]
struct Gate(AtomicU8);

impl Gate {
    fn open(&self) -> bool {
        self.0
            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cancel(&self) -> bool {
        self.0
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn state(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

/// A unit of work handed to an executor.
///
/// Tasks created by [`Task::submission`] carry a cancellation gate. The gate
/// is checked before any decoration runs, so a task cancelled before it
/// starts never reaches its decorators.
pub struct Task {
    body: Body,
    gate: Option<Arc<Gate>>,
}

impl Task {
    pub fn new(body: impl FnOnce() + Send + 'static) -> Self {
        Self {
            body: Box::new(body),
            gate: None,
        }
    }

    /// A cancellable task whose result (or panic) is delivered to the
    /// returned handle.
    pub fn submission<R, F>(f: F) -> (Task, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let gate = Arc::new(Gate(AtomicU8::new(PENDING)));
        let (tx, rx) = oneshot::channel();
        let task = Task {
            body: Box::new(move || {
                let outcome = catch_unwind(AssertUnwindSafe(f))
                    .map_err(|payload| panic_message(payload.as_ref()));
                // The handle may already be gone.
                let _ = tx.send(outcome);
            }),
            gate: Some(Arc::clone(&gate)),
        };
        (task, TaskHandle { gate, rx })
    }

    /// Wrap the body. `f` receives the current body and must call it at
    /// most once.
    pub fn decorate<F>(self, f: F) -> Task
    where
        F: FnOnce(Box<dyn FnOnce() + Send>) + Send + 'static,
    {
        let body = self.body;
        Task {
            body: Box::new(move || f(body)),
            gate: self.gate,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.as_ref().is_some_and(|g| g.state() == CANCELLED)
    }

    /// Run the task on the current thread, unless it was cancelled.
    pub fn run(self) {
        if let Some(gate) = &self.gate
            && !gate.open()
        {
            tracing::debug!("skipping cancelled task");
            return;
        }
        (self.body)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("cancellable", &self.gate.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<R> {
    gate: Arc<Gate>,
    rx: oneshot::Receiver<std::result::Result<R, String>>,
}

impl<R> TaskHandle<R> {
    /// Cancel the task if it has not started. Returns `false` once it has.
    pub fn cancel(&self) -> bool {
        self.gate.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.state() == CANCELLED
    }

    pub fn is_started(&self) -> bool {
        self.gate.state() == STARTED
    }

    /// Block until the task finishes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`TaskHandle::joined`] there.
    pub fn join(self) -> Result<R> {
        let gate = self.gate;
        settle(&gate, self.rx.blocking_recv())
    }

    /// Wait for the task without blocking the runtime.
    pub async fn joined(self) -> Result<R> {
        let gate = self.gate;
        settle(&gate, self.rx.await)
    }

    /// The outcome if the task has finished, `None` while it is pending or
    /// running.
    pub fn try_join(&mut self) -> Option<Result<R>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome.map_err(Error::TaskPanicked)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(dropped(&self.gate))),
        }
    }
}

fn settle<R>(
    gate: &Gate,
    received: std::result::Result<std::result::Result<R, String>, oneshot::error::RecvError>,
) -> Result<R> {
    match received {
        Ok(outcome) => outcome.map_err(Error::TaskPanicked),
        Err(_) => Err(dropped(gate)),
    }
}

fn dropped(gate: &Gate) -> Error {
    if gate.state() == CANCELLED {
        Error::Cancelled
    } else {
        Error::Rejected("task was dropped before completing".to_string())
    }
}

/// Runs tasks.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> Result<()>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }
}

pub trait ExecutorExt: Executor {
    /// Execute `f` and return a handle to its result.
    fn submit<R, F>(&self, f: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, handle) = Task::submission(f);
        self.execute(task)?;
        Ok(handle)
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn cancelled_task_skips_decorators() {
        let decorated = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&decorated);
        let (task, handle) = Task::submission(|| 1);
        let task = task.decorate(move |body| {
            seen.store(true, Ordering::SeqCst);
            body()
        });

        assert!(handle.cancel());
        task.run();

        assert!(!decorated.load(Ordering::SeqCst));
        assert!(matches!(handle.join(), Err(Error::Cancelled)));
    }

    #[test]
    fn panics_are_delivered_to_the_handle() {
        let (task, handle) = Task::submission(|| -> u32 { panic!("boom") });
        task.run();
        assert!(!handle.cancel());
        match handle.join() {
            Err(Error::TaskPanicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
