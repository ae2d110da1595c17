//! Sinks for completed spans.

use std::time::SystemTime;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{Span as _, SpanKind, Tracer as _};

use super::span::Span;

/// Receives every emitted span. Called synchronously on the thread that
/// completed the span.
pub trait SpanObserver: Send + Sync {
    fn consume(&self, span: &Span);
}

impl<F> SpanObserver for F
where
    F: Fn(&Span) + Send + Sync,
{
    fn consume(&self, span: &Span) {
        self(span)
    }
}

/// Logs each span as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSpanObserver;

impl SpanObserver for LoggingSpanObserver {
    fn consume(&self, span: &Span) {
        tracing::info!(
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = span.parent_span_id.as_deref().unwrap_or(""),
            operation = %span.operation,
            duration_us = span.duration_nanos / 1_000,
            metadata = ?span.metadata,
            "span completed"
        );
    }
}

/// Re-emits spans through the global OpenTelemetry tracer provider, so they
/// reach whatever exporter `telemetry::init_telemetry` installed.
#[derive(Debug, Clone)]
pub struct OtelSpanObserver {
    instrumentation_scope: &'static str,
}

impl OtelSpanObserver {
    pub fn new() -> Self {
        Self {
            instrumentation_scope: "tritium",
        }
    }
}

impl Default for OtelSpanObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanObserver for OtelSpanObserver {
    fn consume(&self, span: &Span) {
        let tracer = global::tracer(self.instrumentation_scope);
        let mut attributes = vec![
            KeyValue::new("tritium.trace_id", span.trace_id.clone()),
            KeyValue::new("tritium.span_id", span.span_id.clone()),
        ];
        if let Some(parent) = &span.parent_span_id {
            attributes.push(KeyValue::new("tritium.parent_span_id", parent.clone()));
        }
        attributes.extend(
            span.metadata
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        );

        let start = SystemTime::from(span.start_time);
        let end = start + span.duration();
        let mut otel_span = tracer
            .span_builder(span.operation.clone())
            .with_kind(SpanKind::Internal)
            .with_start_time(start)
            .with_attributes(attributes)
            .start(&tracer);
        otel_span.end_with_timestamp(end);
    }
}
