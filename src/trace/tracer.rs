//! Thread-scoped span stacks and observer fan-out.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::correlation::{self, TRACE_ID_KEY};
use super::observer::SpanObserver;
use super::sampler::{AlwaysSampler, Sampler};
use super::span::{Span, random_id};
use crate::event::context::panic_message;

struct OpenSpan {
    span_id: String,
    parent_span_id: Option<String>,
    operation: String,
    start_time: DateTime<Utc>,
    start: Instant,
    metadata: BTreeMap<String, String>,
}

struct Trace {
    trace_id: String,
    sampled: bool,
    stack: Vec<OpenSpan>,
    /// Carries `trace_id` onto every log event emitted while the trace is
    /// open. Exited when the trace ends.
    _log_span: tracing::span::EnteredSpan,
}

thread_local! {
    static TRACE: RefCell<Option<Trace>> = const { RefCell::new(None) };
}

/// Starts and completes spans on the calling thread's trace.
///
/// The active trace lives in thread-local storage and is shared by every
/// `Tracer` on that thread. The sampling decision is made once, when the
/// root span opens, and applies to the whole trace.
pub struct Tracer {
    observers: RwLock<BTreeMap<String, Arc<dyn SpanObserver>>>,
    sampler: RwLock<Arc<dyn Sampler>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    pub fn new() -> Self {
        Self::with_sampler(Arc::new(AlwaysSampler))
    }

    pub fn with_sampler(sampler: Arc<dyn Sampler>) -> Self {
        Self {
            observers: RwLock::new(BTreeMap::new()),
            sampler: RwLock::new(sampler),
        }
    }

    /// Process-wide tracer.
    pub fn global() -> Arc<Tracer> {
        static GLOBAL: OnceLock<Arc<Tracer>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Tracer::new())))
    }

    /// Applies to traces started after the call.
    pub fn set_sampler(&self, sampler: Arc<dyn Sampler>) {
        *self.sampler.write() = sampler;
    }

    /// Register `observer` under `name`, returning the observer it replaced.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn SpanObserver>,
    ) -> Option<Arc<dyn SpanObserver>> {
        self.observers.write().insert(name.into(), observer)
    }

    pub fn unsubscribe(&self, name: &str) -> Option<Arc<dyn SpanObserver>> {
        self.observers.write().remove(name)
    }

    pub fn observer_names(&self) -> Vec<String> {
        self.observers.read().keys().cloned().collect()
    }

    /// Open a span as a child of the thread's active span, starting a new
    /// trace when there is none. Returns the new span id.
    pub fn start_span<K, V>(
        &self,
        operation: impl Into<String>,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> String
    where
        K: Into<String>,
        V: Into<String>,
    {
        let span_id = random_id();
        let open = OpenSpan {
            span_id: span_id.clone(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Utc::now(),
            start: Instant::now(),
            metadata: tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        };

        let new_trace_id = TRACE.with(|t| {
            let mut slot = t.borrow_mut();
            match slot.as_mut() {
                Some(trace) => {
                    let parent = trace.stack.last().map(|s| s.span_id.clone());
                    trace.stack.push(OpenSpan {
                        parent_span_id: parent,
                        ..open
                    });
                    None
                }
                None => {
                    let trace_id = random_id();
                    let log_span = tracing::info_span!("trace", trace_id = %trace_id).entered();
                    *slot = Some(Trace {
                        trace_id: trace_id.clone(),
                        sampled: self.sampler.read().sample(),
                        stack: vec![open],
                        _log_span: log_span,
                    });
                    Some(trace_id)
                }
            }
        });
        if let Some(trace_id) = new_trace_id {
            correlation::put(TRACE_ID_KEY, trace_id);
        }
        span_id
    }

    /// Close `span_id`, adding `tags` to its metadata. Spans opened above it
    /// and never closed are discarded. Emits the span to observers when the
    /// trace is sampled, and ends the trace when the root span closes.
    ///
    /// Returns `None` when `span_id` is not open on this thread.
    pub fn complete_span<K, V>(
        &self,
        span_id: &str,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Option<Span>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (open, trace_id, sampled, finished) = TRACE.with(|t| {
            let mut slot = t.borrow_mut();
            let trace = slot.as_mut()?;
            let position = trace.stack.iter().rposition(|s| s.span_id == span_id)?;
            let abandoned = trace.stack.len() - position - 1;
            if abandoned > 0 {
                tracing::warn!(span_id, abandoned, "closing span with open children");
            }
            trace.stack.truncate(position + 1);
            let open = trace.stack.pop()?;
            let trace_id = trace.trace_id.clone();
            let sampled = trace.sampled;
            let finished = if trace.stack.is_empty() {
                slot.take()
            } else {
                None
            };
            Some((open, trace_id, sampled, finished))
        })
        .or_else(|| {
            tracing::debug!(span_id, "no open span to complete");
            None
        })?;

        if finished.is_some() {
            correlation::remove(TRACE_ID_KEY);
        }
        // Exits the log span outside the thread-local borrow.
        drop(finished);

        let mut metadata = open.metadata;
        metadata.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        let span = Span {
            trace_id,
            span_id: open.span_id,
            parent_span_id: open.parent_span_id,
            operation: open.operation,
            start_time: open.start_time,
            duration_nanos: u64::try_from(open.start.elapsed().as_nanos()).unwrap_or(u64::MAX),
            metadata,
        };
        if sampled {
            self.notify(&span);
        }
        Some(span)
    }

    /// Run `f` inside a span named `operation`.
    pub fn in_span<R>(&self, operation: impl Into<String>, f: impl FnOnce() -> R) -> R {
        let guard = SpanGuard {
            tracer: self,
            span_id: self.start_span(operation, std::iter::empty::<(String, String)>()),
        };
        let result = f();
        drop(guard);
        result
    }

    pub fn current_trace_id(&self) -> Option<String> {
        TRACE.with(|t| t.borrow().as_ref().map(|trace| trace.trace_id.clone()))
    }

    pub fn current_span_id(&self) -> Option<String> {
        TRACE.with(|t| {
            t.borrow()
                .as_ref()
                .and_then(|trace| trace.stack.last().map(|s| s.span_id.clone()))
        })
    }

    pub fn is_sampled(&self) -> bool {
        TRACE.with(|t| t.borrow().as_ref().is_some_and(|trace| trace.sampled))
    }

    /// Drop the thread's trace without emitting its open spans.
    pub fn clear_trace(&self) {
        let trace = TRACE.with(|t| t.borrow_mut().take());
        if trace.is_some() {
            correlation::remove(TRACE_ID_KEY);
        }
    }

    fn notify(&self, span: &Span) {
        let observers: Vec<(String, Arc<dyn SpanObserver>)> = self
            .observers
            .read()
            .iter()
            .map(|(name, o)| (name.clone(), Arc::clone(o)))
            .collect();
        for (name, observer) in observers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.consume(span))) {
                tracing::warn!(
                    observer = %name,
                    error = %panic_message(payload.as_ref()),
                    "span observer panicked"
                );
            }
        }
    }
}

struct SpanGuard<'a> {
    tracer: &'a Tracer,
    span_id: String,
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        let outcome = if std::thread::panicking() {
            "failure"
        } else {
            "success"
        };
        self.tracer
            .complete_span(&self.span_id, [("outcome", outcome)]);
    }
}
