//! Example demonstrating runtime telemetry.
//!
//! Simulates a host runtime with two collectors, registers the telemetry
//! together with a custom metric set and prints a registry snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use runtime_telemetry::{Metric, MetricRegistry, RuntimeTelemetry, RuntimeTelemetryConfig};
use runtime_telemetry_core::{Gauge, LongGauge};
use runtime_telemetry_gc::{GcEvent, HostRuntime, MemoryUsage};

/// Custom metric set example - a hypothetical connection pool
fn connection_pool() -> (Arc<LongGauge>, BTreeMap<String, Metric>) {
    let active = Arc::new(LongGauge::new());
    active.set(5);
    let mut set = BTreeMap::new();
    set.insert("connections.active".to_owned(), Metric::from(active.clone()));
    set.insert("connections.idle".to_owned(), Metric::from(Gauge::new(|| 10_i64)));
    (active, set)
}

fn main() {
    pretty_env_logger::init();

    let registry = Arc::new(MetricRegistry::new());
    let runtime = HostRuntime::new();
    let young = runtime.add_collector("G1 Young Generation");
    let old = runtime.add_collector("G1 Old Generation");

    let (active, pool) = connection_pool();
    let config = RuntimeTelemetryConfig::new()
        .with_base("demo")
        .add_set("db.pool", pool);

    let telemetry = RuntimeTelemetry::new(registry.clone(), config, &runtime);
    if let Err(err) = telemetry.register() {
        eprintln!("could not register telemetry: {}", err);
        return;
    }

    for i in 1..=5 {
        young.emit_gc(
            &GcEvent::new("G1 Young Generation", 4 * i, 1_000 * i)
                .with_before("G1 Eden Space", MemoryUsage::new(-1, 24 << 20))
                .with_after("G1 Eden Space", MemoryUsage::new(-1, 0))
                .with_before("G1 Old Gen", MemoryUsage::new(256 << 20, 12 << 20))
                .with_after("G1 Old Gen", MemoryUsage::new(256 << 20, 14 << 20)),
        );
    }
    old.emit_gc(
        &GcEvent::new("G1 Old Generation", 80, 6_000)
            .with_before("G1 Old Gen", MemoryUsage::new(256 << 20, 200 << 20))
            .with_after("G1 Old Gen", MemoryUsage::new(256 << 20, 40 << 20)),
    );
    active.set(7);

    println!("Runtime Telemetry Demo");
    println!("======================\n");

    let snapshot = telemetry.snapshot();
    println!("Collected {} metrics:\n", snapshot.metrics.len());
    for (name, metric) in &snapshot.metrics {
        let value = serde_json::to_string(metric).unwrap_or_default();
        println!("  {:<60} {}", name, value);
    }

    println!("\nCollectors seen: {:?}", telemetry.gc().collectors());
    telemetry.unregister();
    println!("Metrics left after unregister: {}", registry.len());
}
