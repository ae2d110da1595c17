//! Explicit decorator that runs every call through an invocation handler.

use std::fmt;
use std::sync::Arc;

use super::context::{Cause, InvocationContext, Method};
use super::filter::{InstrumentAll, InstrumentationFilter};
use super::handler::{CompositeInvocationEventHandler, InvocationEventHandler, suppressed};
use super::metrics::TaggedMetricsInvocationEventHandler;
use crate::registry::TaggedMetricRegistry;
use crate::trace::{Tracer, TracingInvocationEventHandler};

/// A delegate whose calls are observed by an [`InvocationEventHandler`].
///
/// ```
/// # use std::sync::Arc;
/// # use tritium_rs::event::Instrumented;
/// # use tritium_rs::registry::DefaultTaggedMetricRegistry;
/// struct Greeter;
/// impl Greeter {
///     fn greet(&self, who: &str) -> String { format!("hello {who}") }
/// }
///
/// let registry = Arc::new(DefaultTaggedMetricRegistry::new());
/// let greeter = Instrumented::builder(Greeter).with_metrics(registry, "greeter").build();
/// let who = "world";
/// assert_eq!(greeter.call("greet", &[&who], |g| g.greet(who)), "hello world");
/// ```
pub struct Instrumented<T> {
    delegate: T,
    handler: Arc<dyn InvocationEventHandler>,
    filter: Arc<dyn InstrumentationFilter>,
}

impl<T> Instrumented<T> {
    pub fn builder(delegate: T) -> InstrumentedBuilder<T> {
        InstrumentedBuilder {
            delegate,
            handlers: Vec::new(),
            filter: Arc::new(InstrumentAll),
        }
    }

    /// The wrapped delegate, for calls that should bypass instrumentation.
    pub fn delegate(&self) -> &T {
        &self.delegate
    }

    pub fn into_inner(self) -> T {
        self.delegate
    }

    pub fn handler(&self) -> &Arc<dyn InvocationEventHandler> {
        &self.handler
    }

    /// Invoke an infallible method. A panic in `f` is recorded as a failure
    /// and then continues to unwind.
    pub fn call<R>(
        &self,
        method: &'static str,
        args: &[&dyn fmt::Debug],
        f: impl FnOnce(&T) -> R,
    ) -> R {
        let method = Method::of::<T>(method);
        match self.begin(method, args) {
            Some(mut pending) => {
                let result = f(&self.delegate);
                pending.succeed();
                result
            }
            None => f(&self.delegate),
        }
    }

    /// Invoke a fallible method. `Err` is recorded as a failure classified
    /// by the error's type and returned unchanged.
    pub fn try_call<R, E>(
        &self,
        method: &'static str,
        args: &[&dyn fmt::Debug],
        f: impl FnOnce(&T) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: fmt::Display,
    {
        let method = Method::of::<T>(method);
        let Some(mut pending) = self.begin(method, args) else {
            return f(&self.delegate);
        };
        let result = f(&self.delegate);
        match &result {
            Ok(_) => pending.succeed(),
            Err(e) => pending.fail(&Cause::of(e)),
        }
        result
    }

    fn begin<'a>(
        &'a self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> Option<PendingInvocation<'a>> {
        if !self.handler.is_enabled() || !self.filter.should_instrument(&method, args) {
            return None;
        }
        let context = suppressed("pre_invocation", || self.handler.pre_invocation(method, args));
        Some(PendingInvocation {
            handler: self.handler.as_ref(),
            context,
            finished: false,
        })
    }
}

/// Guarantees exactly one completion callback per started call, including
/// when the delegate panics.
struct PendingInvocation<'a> {
    handler: &'a dyn InvocationEventHandler,
    context: Option<InvocationContext<'a>>,
    finished: bool,
}

impl PendingInvocation<'_> {
    fn succeed(&mut self) {
        self.finished = true;
        let context = self.context.as_ref();
        suppressed("on_success", || self.handler.on_success(context, None));
    }

    fn fail(&mut self, cause: &Cause) {
        self.finished = true;
        let context = self.context.as_ref();
        suppressed("on_failure", || self.handler.on_failure(context, cause));
    }
}

impl Drop for PendingInvocation<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.fail(&Cause::unwinding());
        }
    }
}

pub struct InstrumentedBuilder<T> {
    delegate: T,
    handlers: Vec<Arc<dyn InvocationEventHandler>>,
    filter: Arc<dyn InstrumentationFilter>,
}

impl<T> InstrumentedBuilder<T> {
    pub fn with_handler(mut self, handler: Arc<dyn InvocationEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Record per-endpoint success timers and failure meters under
    /// `service_prefix`.
    pub fn with_metrics(
        self,
        registry: Arc<dyn TaggedMetricRegistry>,
        service_prefix: impl Into<String>,
    ) -> Self {
        self.with_handler(Arc::new(TaggedMetricsInvocationEventHandler::new(
            registry,
            service_prefix,
        )))
    }

    /// Open a span per call, tagged with `component`.
    pub fn with_tracing(self, tracer: Arc<Tracer>, component: impl Into<String>) -> Self {
        self.with_handler(Arc::new(TracingInvocationEventHandler::new(tracer, component)))
    }

    pub fn with_filter(mut self, filter: impl InstrumentationFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn build(self) -> Instrumented<T> {
        Instrumented {
            delegate: self.delegate,
            handler: CompositeInvocationEventHandler::of(self.handlers),
            filter: self.filter,
        }
    }
}
