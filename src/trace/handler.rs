//! Opens a span around each instrumented call.

use std::fmt;
use std::sync::Arc;

use super::tracer::Tracer;
use crate::event::{Cause, EnabledSwitch, InvocationContext, InvocationEventHandler, Method};

pub const COMPONENT_TAG: &str = "component";
pub const METHOD_TAG: &str = "method";
pub const OUTCOME_TAG: &str = "outcome";
pub const ERROR_TYPE_TAG: &str = "error.type";

/// Spans are named `<SimpleType>.<method>` and nest under whatever span is
/// active on the calling thread.
pub struct TracingInvocationEventHandler {
    tracer: Arc<Tracer>,
    component: String,
    switch: EnabledSwitch,
}

impl TracingInvocationEventHandler {
    pub fn new(tracer: Arc<Tracer>, component: impl Into<String>) -> Self {
        Self {
            tracer,
            component: component.into(),
            switch: EnabledSwitch::for_handler("tracing"),
        }
    }

    pub fn with_switch(mut self, switch: EnabledSwitch) -> Self {
        self.switch = switch;
        self
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    fn complete(&self, context: Option<&InvocationContext<'_>>, tags: &[(&str, &str)]) {
        let Some(span_id) = context.filter(|c| !c.is_disabled()).and_then(|c| c.span_id()) else {
            return;
        };
        self.tracer
            .complete_span(span_id, tags.iter().map(|&(k, v)| (k, v)));
    }
}

impl InvocationEventHandler for TracingInvocationEventHandler {
    fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    fn pre_invocation<'a>(
        &self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> InvocationContext<'a> {
        if !self.is_enabled() {
            return InvocationContext::disabled(method, args);
        }
        let span_id = self.tracer.start_span(
            method.to_string(),
            [
                (COMPONENT_TAG, self.component.as_str()),
                (METHOD_TAG, method.name()),
            ],
        );
        InvocationContext::new(method, args).with_span(span_id)
    }

    fn on_success(&self, context: Option<&InvocationContext<'_>>, _result: Option<&dyn fmt::Debug>) {
        self.complete(context, &[(OUTCOME_TAG, "success")]);
    }

    fn on_failure(&self, context: Option<&InvocationContext<'_>>, cause: &Cause) {
        self.complete(
            context,
            &[(OUTCOME_TAG, "failure"), (ERROR_TYPE_TAG, cause.type_name())],
        );
    }
}
