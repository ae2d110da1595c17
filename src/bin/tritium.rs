//! tritium CLI: exercise the instrumentation and inspect the registry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tritium_rs::config::Config;
use tritium_rs::event::{Instrumented, TaggedMetricsInvocationEventHandler};
use tritium_rs::executor::{ExecutorExt, NamedThreadFactory, ScheduledExecutor, Task, ThreadFactory, TokioExecutor};
use tritium_rs::instrument;
use tritium_rs::registry::{MetricName, MetricSnapshot, TaggedMetricRegistry};
use tritium_rs::telemetry::{TelemetryConfig, init_telemetry};
use tritium_rs::trace::{LoggingSpanObserver, OtelSpanObserver, Tracer, TracingInvocationEventHandler};

#[derive(Parser)]
#[command(name = "tritium", about = "Tagged metrics and call instrumentation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an instrumented workload and print the resulting metrics
    Demo {
        /// Tasks to submit to the instrumented executor
        #[arg(long, default_value_t = 8)]
        tasks: usize,
        /// Evict metrics idle for this many seconds
        #[arg(long)]
        window_secs: Option<u64>,
        /// Print metrics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Demo {
            tasks,
            window_secs,
            json,
        } => {
            if window_secs.is_some() {
                config.sliding_window_secs = window_secs;
            }
            cmd_demo(&config, tasks, json)
        }
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[derive(Debug)]
struct DivideByZero;

impl fmt::Display for DivideByZero {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "division by zero")
    }
}

impl std::error::Error for DivideByZero {}

struct Calculator;

impl Calculator {
    fn divide(&self, a: i64, b: i64) -> Result<i64, DivideByZero> {
        if b == 0 { Err(DivideByZero) } else { Ok(a / b) }
    }
}

fn cmd_demo(config: &Config, tasks: usize, json: bool) -> anyhow::Result<()> {
    // OTLP exporters need a runtime context; drop order flushes telemetry
    // before the runtime goes away.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let _enter = runtime.enter();
    let _guard = init_telemetry(TelemetryConfig::from(config))?;
    let registry = config.registry();

    let tracer = Tracer::global();
    tracer.subscribe("log", Arc::new(LoggingSpanObserver));
    if config.otel_endpoint.is_some() {
        tracer.subscribe("otel", Arc::new(OtelSpanObserver::new()));
    }

    let tokio_executor = TokioExecutor::new(runtime.handle().clone());

    // Service calls.
    let calculator = Instrumented::builder(Calculator)
        .with_handler(Arc::new(
            TaggedMetricsInvocationEventHandler::new(Arc::clone(&registry), "calculator")
                .with_switch(config.enabled_switch("metrics")),
        ))
        .with_handler(Arc::new(
            TracingInvocationEventHandler::new(Arc::clone(&tracer), "demo")
                .with_switch(config.enabled_switch("tracing")),
        ))
        .build();
    for (a, b) in [(10, 2), (7, 0), (9, 3)] {
        if let Err(e) = calculator.try_call("divide", &[&a, &b], |c| c.divide(a, b)) {
            tracing::info!("divide({a}, {b}) failed: {e}");
        }
    }

    // Executor.
    let pool = instrument::executor(Arc::clone(&registry), tokio_executor.clone(), "demo-pool")?;
    let handles = (0..tasks)
        .map(|i| {
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(5));
                i
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let total: usize = handles
        .into_iter()
        .map(|h| h.join())
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .sum();
    tracing::info!(tasks, total, "executor tasks finished");

    // Scheduled executor.
    let scheduler =
        instrument::scheduled_executor(Arc::clone(&registry), tokio_executor, "demo-scheduler")?;
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let periodic = scheduler.schedule_at_fixed_rate(
        Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }),
        Duration::ZERO,
        Duration::from_millis(20),
    )?;
    scheduler.schedule(Task::new(|| tracing::info!("one-shot task ran")), Duration::from_millis(10))?;
    std::thread::sleep(Duration::from_millis(110));
    periodic.cancel();
    tracing::info!(ticks = ticks.load(Ordering::Relaxed), "periodic task cancelled");

    // Thread factory.
    let threads =
        instrument::thread_factory(Arc::clone(&registry), NamedThreadFactory::new("demo-worker"), "demo-threads")?;
    let worker = threads
        .new_thread(Task::new(|| std::thread::sleep(Duration::from_millis(5))))?
        .start()?;
    if worker.join().is_err() {
        tracing::warn!("demo worker thread panicked");
    }

    print_metrics(registry.as_ref(), json)
}

#[derive(Serialize)]
struct Entry {
    name: MetricName,
    #[serde(flatten)]
    snapshot: MetricSnapshot,
}

fn print_metrics(registry: &dyn TaggedMetricRegistry, json: bool) -> anyhow::Result<()> {
    let mut entries: Vec<Entry> = registry
        .get_metrics()
        .into_iter()
        .map(|(name, metric)| Entry {
            snapshot: metric.snapshot(),
            name,
        })
        .collect();
    entries.sort_by_key(|e| e.name.to_string());

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:<72} {:<10} SUMMARY", "NAME", "TYPE");
    println!("{}", "-".repeat(110));
    for entry in &entries {
        let (kind, summary) = match &entry.snapshot {
            MetricSnapshot::Counter { count } => ("counter", format!("count={count}")),
            MetricSnapshot::Meter(rates) => (
                "meter",
                format!("count={} mean={:.2}/s", rates.count, rates.mean_rate),
            ),
            MetricSnapshot::Histogram(h) => (
                "histogram",
                format!("count={} min={} p50={:.0} max={}", h.count, h.min, h.p50, h.max),
            ),
            MetricSnapshot::Timer {
                rates,
                durations_nanos,
            } => (
                "timer",
                format!(
                    "count={} p50={:.3}ms p99={:.3}ms",
                    rates.count,
                    durations_nanos.p50 / 1e6,
                    durations_nanos.p99 / 1e6
                ),
            ),
            MetricSnapshot::Gauge { value } => ("gauge", format!("value={value}")),
        };
        println!("{:<72} {:<10} {}", entry.name.to_string(), kind, summary);
    }
    Ok(())
}
