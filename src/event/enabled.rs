//! Runtime switches for turning instrumentation on and off.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable that disables all instrumentation when `false`.
pub const GLOBAL_SWITCH_VAR: &str = "TRITIUM_INSTRUMENT";

/// Decides, once per call, whether a handler does any work.
#[derive(Debug, Clone, Default)]
pub enum EnabledSwitch {
    #[default]
    Always,
    Never,
    /// Flipped in-process.
    Flag(Arc<AtomicBool>),
    /// Read from the environment on every check.
    Env { key: String },
}

impl EnabledSwitch {
    /// A switch controlled by [`GLOBAL_SWITCH_VAR`] and
    /// `TRITIUM_INSTRUMENT_<NAME>`, both defaulting to enabled.
    pub fn for_handler(name: &str) -> Self {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Self::Env {
            key: format!("{GLOBAL_SWITCH_VAR}_{suffix}"),
        }
    }

    pub fn flag(initial: bool) -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(initial));
        (Self::Flag(Arc::clone(&flag)), flag)
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Flag(flag) => flag.load(Ordering::Relaxed),
            Self::Env { key } => !env_disabled(GLOBAL_SWITCH_VAR) && !env_disabled(key),
        }
    }
}

/// Reads a switch value: `true`/`false`, `1`/`0`, `yes`/`no` or `on`/`off`,
/// ignoring case and surrounding whitespace.
pub fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Unrecognized values leave instrumentation on.
fn env_disabled(key: &str) -> bool {
    std::env::var(key).is_ok_and(|value| parse_switch(&value) == Some(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_values_parse_case_insensitively() {
        for off in ["false", "FALSE", " 0 ", "no", "Off"] {
            assert_eq!(parse_switch(off), Some(false), "{off}");
        }
        for on in ["true", "1", "YES", "on"] {
            assert_eq!(parse_switch(on), Some(true), "{on}");
        }
        assert_eq!(parse_switch("maybe"), None);
        assert_eq!(parse_switch(""), None);
    }
}
