//! # tritium-rs
//!
//! Tag-keyed metric registries with optional sliding-window eviction, and
//! decorators that record metrics and trace spans around method calls,
//! executors, scheduled executors and thread factories.
//!
//! The registry is the single shared sink: decorators are built around a
//! delegate with [`instrument::Instrument`] or
//! [`event::Instrumented::builder`] and record into whatever
//! [`registry::TaggedMetricRegistry`] they were given.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod instrument;
pub mod registry;
pub mod telemetry;
pub mod trace;

pub use error::{Error, Result};
