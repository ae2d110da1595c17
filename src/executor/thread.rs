use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use super::Task;
use crate::error::Result;

/// Creates threads. Creation and start are separate steps.
pub trait ThreadFactory: Send + Sync {
    fn new_thread(&self, body: Task) -> Result<UnstartedThread>;
}

impl<F: ThreadFactory + ?Sized> ThreadFactory for std::sync::Arc<F> {
    fn new_thread(&self, body: Task) -> Result<UnstartedThread> {
        (**self).new_thread(body)
    }
}

/// A configured thread that has not been spawned yet.
#[derive(Debug)]
pub struct UnstartedThread {
    name: Option<String>,
    stack_size: Option<usize>,
    body: Task,
}

impl UnstartedThread {
    pub fn new(body: Task) -> Self {
        Self {
            name: None,
            stack_size: None,
            body,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Wrap the thread body; see [`Task::decorate`].
    pub fn decorate<F>(self, f: F) -> Self
    where
        F: FnOnce(Box<dyn FnOnce() + Send>) + Send + 'static,
    {
        Self {
            body: self.body.decorate(f),
            ..self
        }
    }

    pub fn start(self) -> Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        let body = self.body;
        Ok(builder.spawn(move || body.run())?)
    }
}

/// Names threads `<prefix>-<n>`, counting from 1.
#[derive(Debug)]
pub struct NamedThreadFactory {
    prefix: String,
    stack_size: Option<usize>,
    next: AtomicUsize,
}

impl NamedThreadFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
            next: AtomicUsize::new(1),
        }
    }

    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn new_thread(&self, body: Task) -> Result<UnstartedThread> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let thread = UnstartedThread::new(body).with_name(format!("{}-{n}", self.prefix));
        Ok(match self.stack_size {
            Some(size) => thread.with_stack_size(size),
            None => thread,
        })
    }
}
