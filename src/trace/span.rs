//! Completed spans handed to observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// A timed unit of work within a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub duration_nanos: u64,
    pub metadata: BTreeMap<String, String>,
}

impl Span {
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_nanos)
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        let duration = chrono::Duration::from_std(self.duration()).unwrap_or(chrono::Duration::MAX);
        self.start_time
            .checked_add_signed(duration)
            .unwrap_or(self.start_time)
    }
}

/// A random 64-bit id rendered as 16 lowercase hex digits.
pub fn random_id() -> String {
    format!("{:016x}", (Uuid::new_v4().as_u128() >> 64) as u64)
}
