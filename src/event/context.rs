//! Per-call invocation records.

use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};

/// Describes the method being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method {
    declaring_type: &'static str,
    name: &'static str,
}

impl Method {
    pub const fn new(declaring_type: &'static str, name: &'static str) -> Self {
        Self {
            declaring_type,
            name,
        }
    }

    /// A method declared on `T`.
    pub fn of<T: ?Sized>(name: &'static str) -> Self {
        Self::new(std::any::type_name::<T>(), name)
    }

    /// Fully-qualified name of the declaring type.
    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    /// Declaring type without module path or generic arguments.
    pub fn simple_type_name(&self) -> &'static str {
        simple_name(self.declaring_type)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.simple_type_name(), self.name)
    }
}

/// Pointer types looked through when naming a service.
const POINTERS: [&str; 4] = ["Arc", "Box", "Rc", "Pin"];

fn simple_name(type_name: &str) -> &str {
    let mut name = type_name.trim();
    loop {
        name = name.trim_start_matches('&');
        name = name.strip_prefix("mut ").unwrap_or(name);
        name = name.strip_prefix("dyn ").unwrap_or(name).trim_start();
        let Some(open) = name.find('<') else { break };
        let outer = name[..open].rsplit("::").next().unwrap_or_default();
        if !POINTERS.contains(&outer) {
            break;
        }
        name = first_type_argument(&name[open + 1..]);
    }
    let base = name.split(['<', ' ']).next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}

fn first_type_argument(args: &str) -> &str {
    let mut depth = 0usize;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' | ',' if depth == 0 => return &args[..i],
            '>' => depth -= 1,
            _ => {}
        }
    }
    args
}

/// Classification of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    type_name: &'static str,
    message: String,
}

impl Cause {
    pub const PANIC: &'static str = "panic";

    /// Classify an error by its fully-qualified type name.
    pub fn of<E: fmt::Display + ?Sized>(error: &E) -> Self {
        Self {
            type_name: std::any::type_name::<E>(),
            message: error.to_string(),
        }
    }

    /// Classify a panic payload.
    pub fn panic(payload: &(dyn Any + Send)) -> Self {
        Self {
            type_name: Self::PANIC,
            message: panic_message(payload),
        }
    }

    /// A panic observed while unwinding, where the payload is not available.
    pub fn unwinding() -> Self {
        Self {
            type_name: Self::PANIC,
            message: "delegate panicked".to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug)]
enum ContextState<'a> {
    Disabled,
    Recording,
    Span(String),
    Composite(Vec<InvocationContext<'a>>),
}

/// The record of a single call, created by `pre_invocation` and consumed by
/// exactly one `on_success` or `on_failure`.
///
/// Borrows the call's arguments, so it cannot outlive the call.
#[derive(Debug)]
pub struct InvocationContext<'a> {
    method: Method,
    args: &'a [&'a dyn fmt::Debug],
    start: Instant,
    state: ContextState<'a>,
}

impl<'a> InvocationContext<'a> {
    pub fn new(method: Method, args: &'a [&'a dyn fmt::Debug]) -> Self {
        Self {
            method,
            args,
            start: Instant::now(),
            state: ContextState::Recording,
        }
    }

    /// Sentinel for calls where the handler is switched off. Completion
    /// callbacks ignore it.
    pub fn disabled(method: Method, args: &'a [&'a dyn fmt::Debug]) -> Self {
        Self {
            state: ContextState::Disabled,
            ..Self::new(method, args)
        }
    }

    pub(crate) fn with_span(mut self, span_id: String) -> Self {
        self.state = ContextState::Span(span_id);
        self
    }

    pub(crate) fn composite(
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
        children: Vec<InvocationContext<'a>>,
    ) -> Self {
        Self {
            state: ContextState::Composite(children),
            ..Self::new(method, args)
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn args(&self) -> &'a [&'a dyn fmt::Debug] {
        self.args
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, ContextState::Disabled)
    }

    /// The span opened for this call, if a tracing handler created it.
    pub fn span_id(&self) -> Option<&str> {
        match &self.state {
            ContextState::Span(id) => Some(id),
            _ => None,
        }
    }

    /// Child contexts of a composite handler.
    pub fn children(&self) -> Option<&[InvocationContext<'a>]> {
        match &self.state {
            ContextState::Composite(children) => Some(children),
            _ => None,
        }
    }
}
