//! Validated entry points for wrapping a delegate.
//!
//! ```
//! # use std::sync::Arc;
//! # use tritium_rs::executor::DirectExecutor;
//! # use tritium_rs::instrument::Instrument;
//! # use tritium_rs::registry::DefaultTaggedMetricRegistry;
//! let registry = Arc::new(DefaultTaggedMetricRegistry::new());
//! let executor = Instrument::new()
//!     .registry(registry)
//!     .delegate(DirectExecutor)
//!     .name("direct")
//!     .executor()
//!     .unwrap();
//! # let _ = executor;
//!
//! let missing = Instrument::<DirectExecutor>::new().delegate(DirectExecutor).name("direct").executor();
//! assert_eq!(missing.err().unwrap().to_string(), "TaggedMetricRegistry is required");
//! ```

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::event::Instrumented;
use crate::executor::{
    Executor, ScheduledExecutor, TaggedMetricsExecutor, TaggedMetricsScheduledExecutor,
    TaggedMetricsThreadFactory, ThreadFactory,
};
use crate::registry::TaggedMetricRegistry;

/// Collects the registry, delegate and name, then checks them when the
/// wrapper is built.
pub struct Instrument<D> {
    registry: Option<Arc<dyn TaggedMetricRegistry>>,
    delegate: Option<D>,
    name: Option<String>,
}

impl<D> Default for Instrument<D> {
    fn default() -> Self {
        Self {
            registry: None,
            delegate: None,
            name: None,
        }
    }
}

impl<D> Instrument<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<dyn TaggedMetricRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn delegate(mut self, delegate: D) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn validate(self, delegate_kind: &'static str) -> Result<(Arc<dyn TaggedMetricRegistry>, D, String)> {
        let registry = self
            .registry
            .ok_or(Error::MissingArgument("TaggedMetricRegistry"))?;
        let delegate = self.delegate.ok_or(Error::MissingArgument(delegate_kind))?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or(Error::MissingArgument("Name"))?;
        Ok((registry, delegate, name))
    }

    /// Per-method success timers and failure meters, with `name` as the
    /// metric prefix.
    pub fn service(self) -> Result<Instrumented<D>> {
        let (registry, delegate, name) = self.validate("Delegate")?;
        Ok(Instrumented::builder(delegate).with_metrics(registry, name).build())
    }
}

impl<D: Executor> Instrument<D> {
    pub fn executor(self) -> Result<TaggedMetricsExecutor<D>> {
        let (registry, delegate, name) = self.validate("Executor")?;
        TaggedMetricsExecutor::new(delegate, registry, name)
    }
}

impl<D: ScheduledExecutor> Instrument<D> {
    pub fn scheduled_executor(self) -> Result<TaggedMetricsScheduledExecutor<D>> {
        let (registry, delegate, name) = self.validate("ScheduledExecutor")?;
        TaggedMetricsScheduledExecutor::new(delegate, registry, name)
    }
}

impl<D: ThreadFactory> Instrument<D> {
    pub fn thread_factory(self) -> Result<TaggedMetricsThreadFactory<D>> {
        let (registry, delegate, name) = self.validate("ThreadFactory")?;
        TaggedMetricsThreadFactory::new(delegate, registry, name)
    }
}

pub fn service<D>(
    registry: Arc<dyn TaggedMetricRegistry>,
    delegate: D,
    name: &str,
) -> Result<Instrumented<D>> {
    Instrument::new()
        .registry(registry)
        .delegate(delegate)
        .name(name)
        .service()
}

pub fn executor<E: Executor>(
    registry: Arc<dyn TaggedMetricRegistry>,
    delegate: E,
    name: &str,
) -> Result<TaggedMetricsExecutor<E>> {
    Instrument::new()
        .registry(registry)
        .delegate(delegate)
        .name(name)
        .executor()
}

pub fn scheduled_executor<S: ScheduledExecutor>(
    registry: Arc<dyn TaggedMetricRegistry>,
    delegate: S,
    name: &str,
) -> Result<TaggedMetricsScheduledExecutor<S>> {
    Instrument::new()
        .registry(registry)
        .delegate(delegate)
        .name(name)
        .scheduled_executor()
}

pub fn thread_factory<F: ThreadFactory>(
    registry: Arc<dyn TaggedMetricRegistry>,
    delegate: F,
    name: &str,
) -> Result<TaggedMetricsThreadFactory<F>> {
    Instrument::new()
        .registry(registry)
        .delegate(delegate)
        .name(name)
        .thread_factory()
}
