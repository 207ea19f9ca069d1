use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use runtime_telemetry_core::{Metric, MetricRegistry};
use runtime_telemetry_gc::{
    metric_name, GcEvent, GcMemoryMetrics, GcMetricsOptions, HostRuntime, MemoryUsage,
};

const PREFIX: &str = "jvm.gc-mem";
const POOLS: [&str; 4] = ["Eden", "Survivor Space", "Old Gen", "CodeHeap 'profiled nmethods'"];

fn accumulator() -> (Arc<MetricRegistry>, GcMemoryMetrics) {
    let registry = Arc::new(MetricRegistry::new());
    let gc = GcMemoryMetrics::new(GcMetricsOptions::new().with_prefix(PREFIX), registry.clone());
    (registry, gc)
}

fn random_usages(rng: &mut StdRng) -> BTreeMap<String, MemoryUsage> {
    let mut rv = BTreeMap::new();
    for pool in POOLS {
        if !rng.random_bool(0.7) {
            continue;
        }
        let max = if rng.random_bool(0.2) { -1 } else { rng.random_range(0..10_000) };
        rv.insert(pool.to_owned(), MemoryUsage::new(max, rng.random_range(0..10_000)));
    }
    rv
}

fn long(registry: &MetricRegistry, name: &str) -> i64 {
    match registry.get(name) {
        Some(Metric::LongGauge(g)) => g.get(),
        other => panic!("`{}` is not a long gauge: {:?}", name, other),
    }
}

fn percent(registry: &MetricRegistry, collector: &str) -> f64 {
    match registry.get(&metric_name(PREFIX, &[collector, "pct-time-in-gc"])) {
        Some(Metric::DoubleGauge(g)) => g.get(),
        other => panic!("no percent gauge: {:?}", other),
    }
}

#[test]
fn test_total_only_grows_and_percent_stays_in_range() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..20 {
        let (registry, gc) = accumulator();
        let mut end_time = rng.random_range(1..1_000);
        let mut last_total = 0;
        for _ in 0..50 {
            let duration = rng.random_range(0..100);
            end_time += duration + rng.random_range(0..1_000);
            gc.handle(&GcEvent::new("Copy", duration, end_time));

            let total = gc.total_gc_time("Copy").unwrap();
            assert!(total >= last_total);
            last_total = total;
            assert!((0.0..=100.0).contains(&percent(&registry, "Copy")));
        }
    }
}

#[test]
fn test_percent_never_decreases_for_back_to_back_collections() {
    // every event ends exactly `duration` after the previous one
    let (registry, gc) = accumulator();
    let mut rng = StdRng::seed_from_u64(2);
    let mut end_time = 1_000;
    let mut first = None;
    let mut last = 0.0;
    for _ in 0..100 {
        let duration = rng.random_range(1..50);
        end_time += duration;
        gc.handle(&GcEvent::new("MarkSweepCompact", duration, end_time));
        let current = percent(&registry, "MarkSweepCompact");
        assert!(current >= last);
        first.get_or_insert(current);
        last = current;
    }
    assert!(last > first.unwrap());
    assert!(last < 100.0);
}

#[test]
fn test_each_name_is_registered_once() {
    let (registry, gc) = accumulator();
    let mut rng = StdRng::seed_from_u64(3);
    let mut seen: BTreeMap<String, Metric> = BTreeMap::new();

    for i in 0..200 {
        let collector = if i % 3 == 0 { "PS MarkSweep" } else { "PS Scavenge" };
        let mut event = GcEvent::new(collector, rng.random_range(0..20), 1_000 + i);
        event.before = random_usages(&mut rng);
        event.after = random_usages(&mut rng);
        gc.handle(&event);

        for name in registry.names() {
            let metric = registry.get(&name).unwrap();
            match seen.get(&name) {
                Some(previous) => assert!(previous.ptr_eq(&metric), "`{}` was recreated", name),
                None => {
                    seen.insert(name, metric);
                }
            }
        }
        assert_eq!(seen.len(), registry.len());
    }
}

#[test]
fn test_schema_is_complete_and_totals_are_sums() {
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..50 {
        let (registry, gc) = accumulator();
        let mut event = GcEvent::new("G1 Young Generation", 7, 700);
        event.before = random_usages(&mut rng);
        event.after = random_usages(&mut rng);
        gc.handle(&event);

        for (time_part, usages) in [("before", &event.before), ("after", &event.after)] {
            let (mut max, mut used, mut free) = (0i64, 0i64, 0i64);
            for (pool, usage) in usages {
                let parts = ["G1 Young Generation", time_part, "pools", pool.as_str()];
                let base = metric_name(PREFIX, &parts);
                assert_eq!(long(&registry, &format!("{}.max", base)), usage.max);
                assert_eq!(long(&registry, &format!("{}.used", base)), usage.used);
                assert_eq!(long(&registry, &format!("{}.free", base)), usage.max - usage.used);
                max += usage.max;
                used += usage.used;
                free += usage.max - usage.used;
            }
            let base = metric_name(PREFIX, &["G1 Young Generation", time_part, "total"]);
            assert_eq!(long(&registry, &format!("{}.max", base)), max);
            assert_eq!(long(&registry, &format!("{}.used", base)), used);
            assert_eq!(long(&registry, &format!("{}.free", base)), free);
        }

        // 3 time metrics, 6 totals, 3 gauges per pool and time part
        let expected = 3 + 6 + 3 * (event.before.len() + event.after.len());
        assert_eq!(registry.len(), expected);
    }
}

#[test]
fn test_names_differing_in_case_and_spaces_collide() {
    let (registry, gc) = accumulator();
    gc.handle(
        &GcEvent::new("G1 Young Generation", 1, 100)
            .with_after("Eden Space", MemoryUsage::new(10, 1)),
    );
    let count = registry.len();
    gc.handle(
        &GcEvent::new("g1 YOUNG generation", 1, 200)
            .with_after("EDEN space", MemoryUsage::new(10, 2)),
    );

    assert_eq!(registry.len(), count);
    assert_eq!(
        long(&registry, "jvm.gc-mem.g1-young-generation.after.pools.eden-space.used"),
        2
    );
    assert_eq!(gc.total_gc_time("G1 Young Generation"), Some(2));
}

#[test]
fn test_concurrent_collectors_sum_their_durations() {
    let registry = Arc::new(MetricRegistry::new());
    let runtime = HostRuntime::new();
    let names = ["Young", "Old", "Concurrent", "Humongous"];
    let emitters: Vec<_> = names.iter().map(|n| runtime.add_collector(n)).collect();
    let gc = GcMemoryMetrics::attach(
        GcMetricsOptions::new().with_prefix(PREFIX),
        registry.clone(),
        &runtime,
    );

    let barrier = Arc::new(Barrier::new(emitters.len() * 2));
    let handles: Vec<_> = emitters
        .iter()
        .chain(emitters.iter())
        .enumerate()
        .map(|(i, emitter)| {
            let emitter = emitter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let name = names[i % names.len()];
                barrier.wait();
                for step in 1..=250 {
                    emitter.emit_gc(
                        &GcEvent::new(name, 2, step * 10)
                            .with_before("Shared Pool", MemoryUsage::new(100, step)),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for name in names {
        // two threads per collector, 250 events of 2ms each
        assert_eq!(gc.total_gc_time(name), Some(1_000));
        assert_eq!(
            registry
                .timer(&metric_name(PREFIX, &[name, "timer"]))
                .unwrap()
                .count(),
            500
        );
    }
}
