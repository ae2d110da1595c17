//! Thread-scoped correlation values.
//!
//! The tracer publishes the active trace id here for code that wants to read
//! it directly. Log lines get the same id from the `trace` span the tracer
//! enters for the lifetime of each trace.

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Key under which the active trace id is published.
pub const TRACE_ID_KEY: &str = "traceId";

thread_local! {
    static CONTEXT: RefCell<BTreeMap<String, String>> = const { RefCell::new(BTreeMap::new()) };
}

pub fn put(key: impl Into<String>, value: impl Into<String>) {
    CONTEXT.with(|c| {
        c.borrow_mut().insert(key.into(), value.into());
    });
}

pub fn get(key: &str) -> Option<String> {
    CONTEXT.with(|c| c.borrow().get(key).cloned())
}

pub fn remove(key: &str) -> Option<String> {
    CONTEXT.with(|c| c.borrow_mut().remove(key))
}

/// Everything published on this thread.
pub fn snapshot() -> BTreeMap<String, String> {
    CONTEXT.with(|c| c.borrow().clone())
}

pub fn clear() {
    CONTEXT.with(|c| c.borrow_mut().clear());
}

/// The trace id of the active trace on this thread, if any.
pub fn trace_id() -> Option<String> {
    get(TRACE_ID_KEY)
}
