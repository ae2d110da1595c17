//! Integration tests for the `Instrumented` decorator and handler
//! composition.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tritium_rs::event::*;
use tritium_rs::instrument;
use tritium_rs::registry::{DefaultTaggedMetricRegistry, MetricName, TaggedMetricRegistry};
use tritium_rs::trace::{Span, Tracer};

struct Store {
    items: Mutex<Vec<String>>,
}

#[derive(Debug)]
struct Full;

impl fmt::Display for Full {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store is full")
    }
}

impl Store {
    fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    fn put(&self, item: &str) -> Result<usize, Full> {
        let mut items = self.items.lock();
        if items.len() >= 2 {
            return Err(Full);
        }
        items.push(item.to_string());
        Ok(items.len())
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn explode(&self) {
        panic!("store exploded");
    }
}

/// Records the lifecycle events it sees.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl InvocationEventHandler for Recorder {
    fn is_enabled(&self) -> bool {
        true
    }

    fn pre_invocation<'a>(
        &self,
        method: Method,
        args: &'a [&'a dyn fmt::Debug],
    ) -> InvocationContext<'a> {
        self.events.lock().push(format!("pre {method} {args:?}"));
        InvocationContext::new(method, args)
    }

    fn on_success(&self, context: Option<&InvocationContext<'_>>, _result: Option<&dyn fmt::Debug>) {
        if let Some(context) = context {
            self.events.lock().push(format!("ok {}", context.method().name()));
        }
    }

    fn on_failure(&self, context: Option<&InvocationContext<'_>>, cause: &Cause) {
        if let Some(context) = context {
            self.events
                .lock()
                .push(format!("err {} {}", context.method().name(), cause.type_name()));
        }
    }
}

trait Pinger: Send + Sync {
    fn ping(&self) -> &'static str;
}

struct LocalPinger;

impl Pinger for LocalPinger {
    fn ping(&self) -> &'static str {
        "pong"
    }
}

fn endpoint(prefix: &str, method: &str) -> MetricName {
    MetricName::builder()
        .safe_name(prefix)
        .put_safe_tag("service-name", "Store")
        .put_safe_tag("endpoint", method)
        .build()
}

// ---------------------------------------------------------------------------
// Call semantics
// ---------------------------------------------------------------------------

#[test]
fn call_returns_delegate_result_and_records_lifecycle() {
    let recorder = Arc::new(Recorder::default());
    let store = Instrumented::builder(Store::new())
        .with_handler(recorder.clone())
        .build();

    let item = "apple";
    assert_eq!(store.try_call("put", &[&item], |s| s.put(item)).ok(), Some(1));
    assert_eq!(store.call("len", &[], |s| s.len()), 1);

    assert_eq!(
        *recorder.events.lock(),
        vec![
            "pre Store.put [\"apple\"]".to_string(),
            "ok put".to_string(),
            "pre Store.len []".to_string(),
            "ok len".to_string(),
        ]
    );
}

#[test]
fn errors_are_recorded_and_returned_unchanged() {
    let recorder = Arc::new(Recorder::default());
    let store = Instrumented::builder(Store::new())
        .with_handler(recorder.clone())
        .build();

    for item in ["a", "b", "c"] {
        let _ = store.try_call("put", &[&item], |s| s.put(item));
    }
    let result = store.try_call("put", &[], |s| s.put("d"));

    assert!(matches!(result, Err(Full)));
    let events = recorder.events.lock();
    let failures: Vec<_> = events.iter().filter(|e| e.starts_with("err")).collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(
        *failures[0],
        format!("err put {}", std::any::type_name::<Full>())
    );
}

#[test]
fn panics_are_recorded_then_propagated() {
    let registry = Arc::new(DefaultTaggedMetricRegistry::new());
    let store = Instrumented::builder(Store::new())
        .with_metrics(registry.clone(), "store")
        .with_handler(Arc::new(Recorder::default()))
        .build();

    let outcome = catch_unwind(AssertUnwindSafe(|| store.call("explode", &[], |s| s.explode())));

    assert!(outcome.is_err());
    let failures = endpoint("store-failures", "explode")
        .to_builder()
        .put_safe_tag("cause", Cause::PANIC)
        .build();
    assert_eq!(registry.meter(&failures).unwrap().count(), 1);
    assert!(!registry.get_metrics().contains_key(&endpoint("store", "explode")));
}

#[test]
fn panicking_handler_does_not_disturb_the_call() {
    struct Faulty;
    impl InvocationEventHandler for Faulty {
        fn is_enabled(&self) -> bool {
            true
        }
        fn pre_invocation<'a>(
            &self,
            _method: Method,
            _args: &'a [&'a dyn fmt::Debug],
        ) -> InvocationContext<'a> {
            panic!("handler bug");
        }
        fn on_success(&self, _context: Option<&InvocationContext<'_>>, _result: Option<&dyn fmt::Debug>) {
            panic!("handler bug");
        }
        fn on_failure(&self, _context: Option<&InvocationContext<'_>>, _cause: &Cause) {
            panic!("handler bug");
        }
    }

    let registry = Arc::new(DefaultTaggedMetricRegistry::new());
    let store = Instrumented::builder(Store::new())
        .with_handler(Arc::new(Faulty))
        .with_metrics(registry.clone(), "store")
        .build();

    assert_eq!(store.try_call("put", &[], |s| s.put("x")).ok(), Some(1));
    assert_eq!(registry.timer(&endpoint("store", "put")).unwrap().count(), 1);

    let alone = Instrumented::builder(Store::new())
        .with_handler(Arc::new(Faulty))
        .build();
    assert_eq!(alone.call("len", &[], |s| s.len()), 0);
}

#[test]
fn trait_object_delegate_is_named_after_the_trait() {
    let registry = Arc::new(DefaultTaggedMetricRegistry::new());
    let shared = instrument::service(registry.clone(), Arc::new(LocalPinger) as Arc<dyn Pinger>, "svc")
        .unwrap();
    let boxed = instrument::service(registry.clone(), Box::new(LocalPinger) as Box<dyn Pinger>, "svc")
        .unwrap();

    assert_eq!(shared.call("ping", &[], |p| p.ping()), "pong");
    assert_eq!(boxed.call("ping", &[], |p| p.ping()), "pong");

    let expected = MetricName::builder()
        .safe_name("svc")
        .put_safe_tag("service-name", "Pinger")
        .put_safe_tag("endpoint", "ping")
        .build();
    let metrics = registry.get_metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(registry.timer(&expected).unwrap().count(), 2);
}

// ---------------------------------------------------------------------------
// Composition, filtering and switches
// ---------------------------------------------------------------------------

#[test]
fn metrics_and_tracing_compose() {
    let registry = Arc::new(DefaultTaggedMetricRegistry::new());
    let tracer = Arc::new(Tracer::new());
    let spans = Arc::new(Mutex::new(Vec::<Span>::new()));
    let sink = Arc::clone(&spans);
    tracer.subscribe("sink", Arc::new(move |span: &Span| sink.lock().push(span.clone())));

    let store = Instrumented::builder(Store::new())
        .with_handler(Arc::new(
            TaggedMetricsInvocationEventHandler::new(registry.clone(), "store")
                .with_switch(EnabledSwitch::Always),
        ))
        .with_tracing(Arc::clone(&tracer), "storage")
        .build();

    store.call("len", &[], |s| s.len());

    assert_eq!(registry.timer(&endpoint("store", "len")).unwrap().count(), 1);
    let spans = spans.lock();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].operation, "Store.len");
    assert_eq!(spans[0].metadata["component"], "storage");
}

#[test]
fn composite_of_zero_or_one_collapses() {
    let none = CompositeInvocationEventHandler::of(Vec::new());
    assert!(!none.is_enabled());

    let recorder: Arc<dyn InvocationEventHandler> = Arc::new(Recorder::default());
    let one = CompositeInvocationEventHandler::of(vec![Arc::clone(&recorder)]);
    assert!(Arc::ptr_eq(&one, &recorder));
}

#[test]
fn composite_keeps_one_child_context_per_handler() {
    let a = Arc::new(Recorder::default());
    let b = Arc::new(Recorder::default());
    let handlers: Vec<Arc<dyn InvocationEventHandler>> = vec![a.clone() as _, b.clone() as _];
    let composite = CompositeInvocationEventHandler::of(handlers);

    let method = Method::new("demo::Store", "len");
    let context = composite.pre_invocation(method, &[]);
    assert_eq!(context.children().map(<[_]>::len), Some(2));
    composite.on_success(Some(&context), None);

    assert_eq!(a.events.lock().len(), 2);
    assert_eq!(b.events.lock().len(), 2);
}

#[test]
fn filter_skips_uninstrumented_methods() {
    let recorder = Arc::new(Recorder::default());
    let store = Instrumented::builder(Store::new())
        .with_handler(recorder.clone())
        .with_filter(MethodNames::new(["put"]))
        .build();

    store.call("len", &[], |s| s.len());
    let _ = store.try_call("put", &[], |s| s.put("x"));

    let events = recorder.events.lock();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.contains("put")));
}

#[test]
fn closure_filter_sees_arguments() {
    let recorder = Arc::new(Recorder::default());
    let store = Instrumented::builder(Store::new())
        .with_handler(recorder.clone())
        .with_filter(|_: &Method, args: &[&dyn fmt::Debug]| !args.is_empty())
        .build();

    let item = "kiwi";
    let _ = store.try_call("put", &[&item], |s| s.put(item));
    let _ = store.try_call("put", &[], |s| s.put("plum"));

    assert_eq!(recorder.events.lock().len(), 2);
}

#[test]
fn switching_off_skips_recording() {
    let registry = Arc::new(DefaultTaggedMetricRegistry::new());
    let (switch, flag) = EnabledSwitch::flag(true);
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Instrumented::builder(Store::new())
        .with_handler(Arc::new(
            TaggedMetricsInvocationEventHandler::new(registry.clone(), "store").with_switch(switch),
        ))
        .build();

    let counted = |s: &Store| {
        calls.fetch_add(1, Ordering::Relaxed);
        s.len()
    };
    store.call("len", &[], counted);
    flag.store(false, Ordering::Relaxed);
    store.call("len", &[], counted);

    assert_eq!(calls.load(Ordering::Relaxed), 2);
    assert_eq!(registry.timer(&endpoint("store", "len")).unwrap().count(), 1);
    assert_eq!(store.delegate().len(), 0);
}
