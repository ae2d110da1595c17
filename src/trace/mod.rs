//! Lightweight in-process tracing: thread-scoped span trees, pluggable
//! sampling, and observers that receive completed spans.

pub mod correlation;
pub mod handler;
pub mod observer;
pub mod sampler;
pub mod span;
pub mod tracer;

pub use handler::TracingInvocationEventHandler;
pub use observer::{LoggingSpanObserver, OtelSpanObserver, SpanObserver};
pub use sampler::{AlwaysSampler, NeverSampler, RateSampler, Sampler};
pub use span::Span;
pub use tracer::Tracer;
