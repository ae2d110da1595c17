use std::sync::Mutex;
use std::time::Duration;

use tritium_rs::config::Config;
use tritium_rs::error::Error;
use tritium_rs::event::EnabledSwitch;
use tritium_rs::registry::{MetricName, TaggedMetricRegistry};

// Environment variables are process-wide.
static ENV: Mutex<()> = Mutex::new(());

const VARS: [&str; 5] = [
    "TRITIUM_SERVICE_NAME",
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
    "TRITIUM_SLIDING_WINDOW_SECS",
    "TRITIUM_INSTRUMENT",
];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[test]
fn config_from_env_uses_defaults() {
    let _lock = ENV.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.service_name, "tritium");
    assert_eq!(config.log_level, "info");
    assert!(config.instrumentation_enabled);
    assert_eq!(config.sliding_window(), None);
}

#[test]
fn config_from_env_reads_every_field() {
    let _lock = ENV.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    unsafe {
        std::env::set_var("TRITIUM_SERVICE_NAME", "billing");
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
        std::env::set_var("LOG_LEVEL", "debug");
        std::env::set_var("TRITIUM_SLIDING_WINDOW_SECS", "300");
        std::env::set_var("TRITIUM_INSTRUMENT", "false");
    }

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.service_name, "billing");
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.sliding_window(), Some(Duration::from_secs(300)));
    assert!(!config.instrumentation_enabled);
    assert!(matches!(config.enabled_switch("metrics"), EnabledSwitch::Never));
}

#[test]
fn config_from_env_rejects_malformed_window() {
    let _lock = ENV.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    unsafe { std::env::set_var("TRITIUM_SLIDING_WINDOW_SECS", "five minutes") };

    let result = Config::from_env();
    clear_env();

    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("TRITIUM_SLIDING_WINDOW_SECS")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn instrument_flag_accepts_the_switch_vocabulary() {
    let _lock = ENV.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    for (raw, expected) in [("FALSE", false), ("0", false), ("no", false), ("On", true)] {
        unsafe { std::env::set_var("TRITIUM_INSTRUMENT", raw) };
        let config = Config::from_env().unwrap();
        assert_eq!(config.instrumentation_enabled, expected, "{raw}");
        assert_eq!(EnabledSwitch::for_handler("metrics").is_enabled(), expected, "{raw}");
    }

    unsafe { std::env::set_var("TRITIUM_INSTRUMENT", "sometimes") };
    let result = Config::from_env();
    clear_env();

    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("TRITIUM_INSTRUMENT")),
        other => panic!("expected config error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// TOML
// ---------------------------------------------------------------------------

#[test]
fn config_from_toml_fills_missing_keys_with_defaults() {
    let config = Config::from_toml_str(
        r#"
        service_name = "search"
        sliding_window_secs = 60
        "#,
    )
    .unwrap();

    assert_eq!(config.service_name, "search");
    assert_eq!(config.sliding_window_secs, Some(60));
    assert_eq!(config.log_level, "info");
    assert!(config.instrumentation_enabled);
}

#[test]
fn config_from_toml_rejects_wrong_types() {
    let result = Config::from_toml_str("sliding_window_secs = \"soon\"");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn config_load_reports_missing_file() {
    let result = Config::load(std::path::Path::new("/nonexistent/tritium.toml"));
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("/nonexistent/tritium.toml")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn config_registry_matches_window() {
    let unbounded = Config::default().registry();
    assert!(unbounded.get_metrics().is_empty());

    let windowed = Config {
        sliding_window_secs: Some(30),
        ..Config::default()
    }
    .registry();
    let name = MetricName::of("requests");
    windowed.counter(&name).unwrap().inc();
    assert_eq!(windowed.get_metrics().len(), 1);
}
