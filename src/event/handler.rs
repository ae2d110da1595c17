//! The pre-invocation / success / failure lifecycle.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::context::{Cause, InvocationContext, Method};

/// Observes calls made through an instrumented decorator.
///
/// Implementations run on the caller's thread inside the call path. The
/// completion callbacks must treat `None` and disabled contexts as no-ops.
pub trait InvocationEventHandler: Send + Sync {
    /// Cheap check made once per call.
    fn is_enabled(&self) -> bool;

    fn pre_invocation<'a>(
        &self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> InvocationContext<'a>;

    fn on_success(&self, context: Option<&InvocationContext<'_>>, result: Option<&dyn fmt::Debug>);

    fn on_failure(&self, context: Option<&InvocationContext<'_>>, cause: &Cause);
}

/// Runs `f`, logging and swallowing any panic raised by handler code.
pub(crate) fn suppressed<R>(phase: &'static str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::warn!(
                phase,
                error = %super::context::panic_message(payload.as_ref()),
                "instrumentation handler panicked"
            );
            None
        }
    }
}

/// Handler that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpInvocationEventHandler;

impl InvocationEventHandler for NoOpInvocationEventHandler {
    fn is_enabled(&self) -> bool {
        false
    }

    fn pre_invocation<'a>(
        &self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> InvocationContext<'a> {
        InvocationContext::disabled(method, args)
    }

    fn on_success(&self, _context: Option<&InvocationContext<'_>>, _result: Option<&dyn fmt::Debug>) {}

    fn on_failure(&self, _context: Option<&InvocationContext<'_>>, _cause: &Cause) {}
}

/// Fans each lifecycle event out to several handlers, keeping one child
/// context per handler.
pub struct CompositeInvocationEventHandler {
    handlers: Vec<Arc<dyn InvocationEventHandler>>,
}

impl CompositeInvocationEventHandler {
    /// Collapse `handlers` into a single handler: no-op when empty, the
    /// handler itself when there is only one.
    pub fn of(mut handlers: Vec<Arc<dyn InvocationEventHandler>>) -> Arc<dyn InvocationEventHandler> {
        match handlers.len() {
            0 => Arc::new(NoOpInvocationEventHandler),
            1 => match handlers.pop() {
                Some(handler) => handler,
                None => Arc::new(NoOpInvocationEventHandler),
            },
            _ => Arc::new(Self { handlers }),
        }
    }

    fn children<'c, 'a>(
        &self,
        context: Option<&'c InvocationContext<'a>>,
    ) -> Option<&'c [InvocationContext<'a>]> {
        let children = context?.children()?;
        if children.len() != self.handlers.len() {
            tracing::warn!(
                expected = self.handlers.len(),
                actual = children.len(),
                "composite context does not match its handlers"
            );
            return None;
        }
        Some(children)
    }
}

impl InvocationEventHandler for CompositeInvocationEventHandler {
    fn is_enabled(&self) -> bool {
        self.handlers.iter().any(|h| h.is_enabled())
    }

    fn pre_invocation<'a>(
        &self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> InvocationContext<'a> {
        let children = self
            .handlers
            .iter()
            .map(|handler| {
                if handler.is_enabled() {
                    suppressed("pre_invocation", || handler.pre_invocation(method, args))
                        .unwrap_or_else(|| InvocationContext::disabled(method, args))
                } else {
                    InvocationContext::disabled(method, args)
                }
            })
            .collect();
        InvocationContext::composite(method, args, children)
    }

    fn on_success(&self, context: Option<&InvocationContext<'_>>, result: Option<&dyn fmt::Debug>) {
        let Some(children) = self.children(context) else {
            return;
        };
        for (handler, child) in self.handlers.iter().zip(children) {
            suppressed("on_success", || handler.on_success(Some(child), result));
        }
    }

    fn on_failure(&self, context: Option<&InvocationContext<'_>>, cause: &Cause) {
        let Some(children) = self.children(context) else {
            return;
        };
        for (handler, child) in self.handlers.iter().zip(children) {
            suppressed("on_failure", || handler.on_failure(Some(child), cause));
        }
    }
}
