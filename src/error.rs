//! Error types for tritium-rs.

use thiserror::Error;

use crate::registry::{MetricKind, MetricName};

#[derive(Debug, Error)]
pub enum Error {
    /// A required wrap-time argument was not supplied.
    #[error("{0} is required")]
    MissingArgument(&'static str),

    #[error("metric {name} is already registered as a {existing}, cannot use it as a {requested}")]
    TypeMismatch {
        name: MetricName,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("task was cancelled before it started")]
    Cancelled,

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("executor rejected task: {0}")]
    Rejected(String),

    #[error("thread error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
