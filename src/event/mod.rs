//! Invocation instrumentation: a pre-call / success / failure lifecycle
//! observed by pluggable handlers around an explicit decorator.

pub mod context;
pub mod enabled;
pub mod filter;
pub mod handler;
pub mod instrumented;
pub mod metrics;

pub use context::{Cause, InvocationContext, Method};
pub use enabled::EnabledSwitch;
pub use filter::{InstrumentAll, InstrumentationFilter, MethodNames};
pub use handler::{
    CompositeInvocationEventHandler, InvocationEventHandler, NoOpInvocationEventHandler,
};
pub use instrumented::{Instrumented, InstrumentedBuilder};
pub use metrics::TaggedMetricsInvocationEventHandler;
