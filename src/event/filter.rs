//! Per-call instrumentation filters.

use std::fmt;

use super::context::Method;

/// Decides whether a particular call is instrumented at all.
pub trait InstrumentationFilter: Send + Sync {
    fn should_instrument(&self, method: &Method, args: &[&dyn fmt::Debug]) -> bool;
}

impl<F> InstrumentationFilter for F
where
    F: Fn(&Method, &[&dyn fmt::Debug]) -> bool + Send + Sync,
{
    fn should_instrument(&self, method: &Method, args: &[&dyn fmt::Debug]) -> bool {
        self(method, args)
    }
}

/// Instruments every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstrumentAll;

impl InstrumentationFilter for InstrumentAll {
    fn should_instrument(&self, _method: &Method, _args: &[&dyn fmt::Debug]) -> bool {
        true
    }
}

/// Instruments only the named methods.
#[derive(Debug, Clone)]
pub struct MethodNames(Vec<&'static str>);

impl MethodNames {
    pub fn new(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self(names.into_iter().collect())
    }
}

impl InstrumentationFilter for MethodNames {
    fn should_instrument(&self, method: &Method, _args: &[&dyn fmt::Debug]) -> bool {
        self.0.contains(&method.name())
    }
}
