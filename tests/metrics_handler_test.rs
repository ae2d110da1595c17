//! Integration tests for the metrics invocation handler.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tritium_rs::event::*;
use tritium_rs::registry::*;

struct TestImplementation;

#[derive(Debug)]
struct FooError;

impl fmt::Display for FooError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fail")
    }
}

fn registries() -> Vec<Arc<dyn TaggedMetricRegistry>> {
    vec![
        Arc::new(DefaultTaggedMetricRegistry::new()),
        Arc::new(SlidingWindowTaggedMetricRegistry::new(Duration::from_secs(30))),
    ]
}

fn handler(registry: &Arc<dyn TaggedMetricRegistry>) -> TaggedMetricsInvocationEventHandler {
    TaggedMetricsInvocationEventHandler::new(Arc::clone(registry), "quux")
        .with_switch(EnabledSwitch::Always)
}

fn do_foo() -> Method {
    Method::of::<TestImplementation>("do_foo")
}

fn success_name() -> MetricName {
    MetricName::builder()
        .safe_name("quux")
        .put_safe_tag("service-name", "TestImplementation")
        .put_safe_tag("endpoint", "do_foo")
        .build()
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

#[test]
fn success_records_timer() {
    for registry in registries() {
        let handler = handler(&registry);
        let context = handler.pre_invocation(do_foo(), &[]);
        handler.on_success(Some(&context), Some(&"bar"));

        let metrics = registry.get_metrics();
        let timer = metrics[&success_name()].as_timer().unwrap();
        assert_eq!(timer.count(), 1);
        assert_eq!(handler.success_name(&do_foo()), success_name());
    }
}

#[test]
fn failure_records_meter_tagged_with_cause() {
    for registry in registries() {
        let handler = handler(&registry);
        let context = handler.pre_invocation(do_foo(), &[]);
        handler.on_failure(Some(&context), &Cause::of(&FooError));

        let expected = MetricName::builder()
            .safe_name("quux-failures")
            .put_safe_tag("service-name", "TestImplementation")
            .put_safe_tag("endpoint", "do_foo")
            .put_safe_tag("cause", std::any::type_name::<FooError>())
            .build();
        let metrics = registry.get_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[&expected].as_meter().unwrap().count(), 1);
    }
}

#[test]
fn arguments_do_not_affect_names() {
    let registry: Arc<dyn TaggedMetricRegistry> = Arc::new(DefaultTaggedMetricRegistry::new());
    let handler = handler(&registry);
    for arg in ["a", "b", "c"] {
        let args: [&dyn fmt::Debug; 1] = [&arg];
        let context = handler.pre_invocation(do_foo(), &args);
        assert_eq!(context.args().len(), 1);
        handler.on_success(Some(&context), None);
    }
    assert_eq!(registry.timer(&success_name()).unwrap().count(), 3);
}

// ---------------------------------------------------------------------------
// No-op paths
// ---------------------------------------------------------------------------

#[test]
fn missing_context_is_ignored() {
    let registry: Arc<dyn TaggedMetricRegistry> = Arc::new(DefaultTaggedMetricRegistry::new());
    let handler = handler(&registry);
    handler.on_success(None, None);
    handler.on_failure(None, &Cause::of(&FooError));
    assert!(registry.get_metrics().is_empty());
}

#[test]
fn disabled_switch_produces_sentinel_and_records_nothing() {
    let registry: Arc<dyn TaggedMetricRegistry> = Arc::new(DefaultTaggedMetricRegistry::new());
    let (switch, flag) = EnabledSwitch::flag(false);
    let handler =
        TaggedMetricsInvocationEventHandler::new(Arc::clone(&registry), "quux").with_switch(switch);

    assert!(!handler.is_enabled());
    let context = handler.pre_invocation(do_foo(), &[]);
    assert!(context.is_disabled());
    handler.on_success(Some(&context), None);
    assert!(registry.get_metrics().is_empty());

    flag.store(true, std::sync::atomic::Ordering::Relaxed);
    assert!(handler.is_enabled());
    let context = handler.pre_invocation(do_foo(), &[]);
    handler.on_success(Some(&context), None);
    assert_eq!(registry.get_metrics().len(), 1);
}

#[test]
fn type_clash_is_logged_not_raised() {
    let registry: Arc<dyn TaggedMetricRegistry> = Arc::new(DefaultTaggedMetricRegistry::new());
    registry.counter(&success_name()).unwrap();
    let handler = handler(&registry);

    let context = handler.pre_invocation(do_foo(), &[]);
    handler.on_success(Some(&context), None);

    assert_eq!(
        registry.get_metrics()[&success_name()].kind(),
        MetricKind::Counter
    );
}

#[test]
fn env_switch_reads_handler_variable() {
    let switch = EnabledSwitch::for_handler("env-test");
    assert!(matches!(&switch, EnabledSwitch::Env { key } if key == "TRITIUM_INSTRUMENT_ENV_TEST"));

    unsafe { std::env::set_var("TRITIUM_INSTRUMENT_ENV_TEST", "FALSE") };
    assert!(!switch.is_enabled());
    unsafe { std::env::set_var("TRITIUM_INSTRUMENT_ENV_TEST", "yes") };
    assert!(switch.is_enabled());
    unsafe { std::env::remove_var("TRITIUM_INSTRUMENT_ENV_TEST") };
    assert!(switch.is_enabled());
}
