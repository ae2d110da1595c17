//! Eviction behaviour of the sliding-window registry, driven by a manual
//! clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tritium_rs::clock::ManualClock;
use tritium_rs::registry::*;

const WINDOW: Duration = Duration::from_secs(60);

fn setup() -> (Arc<ManualClock>, SlidingWindowTaggedMetricRegistry) {
    let clock = Arc::new(ManualClock::new());
    let registry = SlidingWindowTaggedMetricRegistry::with_clock(WINDOW, clock.clone());
    (clock, registry)
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

// ---------------------------------------------------------------------------
// Eviction
// ---------------------------------------------------------------------------

#[test]
fn idle_metric_is_evicted_after_window() {
    let (clock, registry) = setup();
    registry.counter(&MetricName::of("a")).unwrap().inc();
    clock.advance(secs(30));
    registry.counter(&MetricName::of("b")).unwrap().inc();
    clock.advance(secs(31));

    let metrics = registry.get_metrics();
    assert_eq!(metrics.len(), 1);
    assert!(metrics.contains_key(&MetricName::of("b")));
}

#[test]
fn metric_idle_for_exactly_the_window_survives() {
    let (clock, registry) = setup();
    registry.meter(&MetricName::of("a")).unwrap();
    clock.advance(WINDOW);
    assert_eq!(registry.get_metrics().len(), 1);

    clock.advance(Duration::from_millis(1));
    assert!(registry.get_metrics().is_empty());
}

#[test]
fn access_keeps_metric_alive() {
    let (clock, registry) = setup();
    let name = MetricName::of("busy");
    for _ in 0..5 {
        registry.timer(&name).unwrap().update(Duration::from_millis(1));
        clock.advance(secs(50));
    }
    let metrics = registry.get_metrics();
    assert_eq!(metrics[&name].as_timer().unwrap().count(), 5);
}

#[test]
fn gauge_registration_touches_name() {
    let (clock, registry) = setup();
    let name = MetricName::of("depth");
    registry.gauge(&name, Gauge::new(|| 3.0));
    clock.advance(secs(45));
    registry.gauge(&name, Gauge::new(|| 4.0));
    clock.advance(secs(45));

    let metrics = registry.get_metrics();
    assert_eq!(metrics[&name].as_gauge().unwrap().value(), 4.0);
}

#[test]
fn evicted_metric_is_recreated_fresh() {
    let (clock, registry) = setup();
    let name = MetricName::of("requests");
    let first = registry.counter(&name).unwrap();
    first.inc_by(10);
    clock.advance(secs(61));
    assert_eq!(registry.cleanup(), 1);

    let second = registry.counter(&name).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.count(), 0);
}

#[test]
fn cleanup_reports_nothing_when_all_fresh() {
    let (clock, registry) = setup();
    registry.counter(&MetricName::of("a")).unwrap();
    clock.advance(secs(10));
    assert_eq!(registry.cleanup(), 0);
    assert_eq!(registry.window(), WINDOW);
}

#[test]
fn writes_sweep_once_the_interval_has_passed() {
    let clock = Arc::new(ManualClock::new());
    let backing = Arc::new(DefaultTaggedMetricRegistry::new());
    let registry =
        SlidingWindowTaggedMetricRegistry::with_backing(backing.clone(), WINDOW, clock.clone());

    registry.counter(&MetricName::of("stale")).unwrap();
    clock.advance(secs(61));
    registry.counter(&MetricName::of("fresh")).unwrap();

    // Checked on the backing registry, which never sweeps by itself.
    assert!(!backing.get_metrics().contains_key(&MetricName::of("stale")));
    assert!(backing.get_metrics().contains_key(&MetricName::of("fresh")));
}

#[test]
fn explicit_remove_forgets_the_name() {
    let (clock, registry) = setup();
    let name = MetricName::of("gone");
    registry.counter(&name).unwrap();
    assert!(registry.remove(&name).is_some());
    clock.advance(secs(120));
    assert_eq!(registry.cleanup(), 0);
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Removals(Mutex<Vec<String>>);

impl TaggedMetricRegistryListener for Removals {
    fn on_counter_removed(&self, name: &MetricName) {
        self.0.lock().unwrap().push(name.to_string());
    }
}

#[test]
fn eviction_notifies_listeners() {
    let (clock, registry) = setup();
    let removals = Arc::new(Removals::default());
    registry.add_listener(removals.clone());

    registry
        .counter(&MetricName::builder().safe_name("calls").put_safe_tag("caller", "x").build())
        .unwrap();
    clock.advance(secs(61));
    registry.cleanup();

    assert_eq!(*removals.0.lock().unwrap(), vec!["calls{caller=x}".to_string()]);

    let handle: Arc<dyn TaggedMetricRegistryListener> = removals.clone();
    assert!(registry.remove_listener(&handle));
}

#[test]
fn kind_mismatch_passes_through() {
    let (_clock, registry) = setup();
    registry.counter(&MetricName::of("x")).unwrap();
    assert!(registry.timer(&MetricName::of("x")).is_err());
}
