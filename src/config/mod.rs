//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup. Malformed values fail fast rather than falling
//! back to a default.

use crate::error::{Error, Result};
use crate::event::EnabledSwitch;
use crate::event::enabled::{GLOBAL_SWITCH_VAR, parse_switch};
use crate::registry::{DefaultTaggedMetricRegistry, SlidingWindowTaggedMetricRegistry, TaggedMetricRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name reported in telemetry signals.
    pub service_name: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Idle window after which tagged metrics are evicted. `None` keeps
    /// every metric for the lifetime of the registry.
    pub sliding_window_secs: Option<u64>,
    /// Global instrumentation switch.
    pub instrumentation_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "tritium".to_string(),
            otel_endpoint: None,
            log_level: "info".to_string(),
            sliding_window_secs: None,
            instrumentation_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            service_name: std::env::var("TRITIUM_SERVICE_NAME").unwrap_or(defaults.service_name),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            sliding_window_secs: optional_var("TRITIUM_SLIDING_WINDOW_SECS")?,
            instrumentation_enabled: switch_var(GLOBAL_SWITCH_VAR)?.unwrap_or(true),
        })
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read config {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn sliding_window(&self) -> Option<Duration> {
        self.sliding_window_secs.map(Duration::from_secs)
    }

    /// Build the registry this configuration describes.
    pub fn registry(&self) -> Arc<dyn TaggedMetricRegistry> {
        match self.sliding_window() {
            Some(window) => Arc::new(SlidingWindowTaggedMetricRegistry::new(window)),
            None => Arc::new(DefaultTaggedMetricRegistry::new()),
        }
    }

    /// Switch for the named handler, forced off when instrumentation is
    /// disabled here.
    pub fn enabled_switch(&self, handler: &str) -> EnabledSwitch {
        if self.instrumentation_enabled {
            EnabledSwitch::for_handler(handler)
        } else {
            EnabledSwitch::Never
        }
    }
}

/// Same vocabulary as [`EnabledSwitch`], but an unrecognized value is an
/// error here.
fn switch_var(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => parse_switch(&raw).map(Some).ok_or_else(|| {
            Error::Config(format!(
                "invalid value for {name}: {raw:?} (expected true/false, 1/0, yes/no or on/off)"
            ))
        }),
        Err(_) => Ok(None),
    }
}

fn optional_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name}: {raw:?} ({e})"))),
        Err(_) => Ok(None),
    }
}
