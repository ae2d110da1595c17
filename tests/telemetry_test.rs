//! Integration tests for telemetry initialization and span observers.

use std::collections::BTreeMap;

use chrono::Utc;
use tritium_rs::config::Config;
use tritium_rs::telemetry::{TelemetryConfig, init_telemetry};
use tritium_rs::trace::{LoggingSpanObserver, OtelSpanObserver, Span, SpanObserver};

fn sample_span() -> Span {
    Span {
        trace_id: "00000000000000aa".to_string(),
        span_id: "00000000000000bb".to_string(),
        parent_span_id: None,
        operation: "Widget.spin".to_string(),
        start_time: Utc::now(),
        duration_nanos: 1_500_000,
        metadata: BTreeMap::from([("outcome".to_string(), "success".to_string())]),
    }
}

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process, so a second
    // initialization in the same test binary may return Err.
    let config = TelemetryConfig::from(&Config::default());
    assert_eq!(config.endpoint, None);
    assert_eq!(config.service_name, "tritium");
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn telemetry_rejects_invalid_log_level() {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "tritium-test".to_string(),
        log_level: "tritium=notalevel".to_string(),
    };
    assert!(init_telemetry(config).is_err());
}

#[test]
fn observers_accept_spans_without_exporter() {
    let span = sample_span();
    LoggingSpanObserver.consume(&span);
    // Without an installed provider the global tracer is a no-op.
    OtelSpanObserver::new().consume(&span);
    assert_eq!(span.duration().as_micros(), 1500);
    assert!(span.end_time() > span.start_time);
}

#[test]
fn span_serializes_ids_and_metadata() {
    let json = serde_json::to_value(sample_span()).unwrap();
    assert_eq!(json["operation"], "Widget.spin");
    assert_eq!(json["parent_span_id"], serde_json::Value::Null);
    assert_eq!(json["metadata"]["outcome"], "success");
}
