use super::{Executor, Task};
use crate::error::Result;

/// Runs each task to completion on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        task.run();
        Ok(())
    }
}
