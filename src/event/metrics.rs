//! Records per-endpoint success latency and failure counts into a tagged
//! registry.

use std::fmt;
use std::sync::Arc;

use super::context::{Cause, InvocationContext, Method};
use super::enabled::EnabledSwitch;
use super::handler::InvocationEventHandler;
use crate::registry::{MetricName, TaggedMetricRegistry};

pub const SERVICE_NAME_TAG: &str = "service-name";
pub const ENDPOINT_TAG: &str = "endpoint";
pub const CAUSE_TAG: &str = "cause";
pub const FAILURES_SUFFIX: &str = "-failures";

/// Success: timer `<prefix>{service-name, endpoint}`.
/// Failure: meter `<prefix>-failures{service-name, endpoint, cause}`.
pub struct TaggedMetricsInvocationEventHandler {
    registry: Arc<dyn TaggedMetricRegistry>,
    service_prefix: String,
    failures_name: String,
    switch: EnabledSwitch,
}

impl TaggedMetricsInvocationEventHandler {
    pub fn new(registry: Arc<dyn TaggedMetricRegistry>, service_prefix: impl Into<String>) -> Self {
        let service_prefix = service_prefix.into();
        Self {
            registry,
            failures_name: format!("{service_prefix}{FAILURES_SUFFIX}"),
            service_prefix,
            switch: EnabledSwitch::for_handler("metrics"),
        }
    }

    pub fn with_switch(mut self, switch: EnabledSwitch) -> Self {
        self.switch = switch;
        self
    }

    /// Name of the success timer for `method`.
    pub fn success_name(&self, method: &Method) -> MetricName {
        endpoint_name(&self.service_prefix, method).build()
    }

    /// Name of the failure meter for `method` failing with `cause`.
    pub fn failure_name(&self, method: &Method, cause: &Cause) -> MetricName {
        endpoint_name(&self.failures_name, method)
            .put_safe_tag(CAUSE_TAG, cause.type_name())
            .build()
    }
}

fn endpoint_name(prefix: &str, method: &Method) -> crate::registry::MetricNameBuilder {
    MetricName::builder()
        .safe_name(prefix)
        .put_safe_tag(SERVICE_NAME_TAG, method.simple_type_name())
        .put_safe_tag(ENDPOINT_TAG, method.name())
}

impl InvocationEventHandler for TaggedMetricsInvocationEventHandler {
    fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    fn pre_invocation<'a>(
        &self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> InvocationContext<'a> {
        if self.is_enabled() {
            InvocationContext::new(method, args)
        } else {
            InvocationContext::disabled(method, args)
        }
    }

    fn on_success(&self, context: Option<&InvocationContext<'_>>, _result: Option<&dyn fmt::Debug>) {
        let Some(context) = context.filter(|c| !c.is_disabled()) else {
            return;
        };
        let name = self.success_name(context.method());
        match self.registry.timer(&name) {
            Ok(timer) => timer.update(context.elapsed()),
            Err(e) => tracing::warn!(metric = %name, "cannot record invocation: {e}"),
        }
    }

    fn on_failure(&self, context: Option<&InvocationContext<'_>>, cause: &Cause) {
        let Some(context) = context.filter(|c| !c.is_disabled()) else {
            return;
        };
        let name = self.failure_name(context.method(), cause);
        match self.registry.meter(&name) {
            Ok(meter) => meter.mark(),
            Err(e) => tracing::warn!(metric = %name, "cannot record invocation failure: {e}"),
        }
    }
}
