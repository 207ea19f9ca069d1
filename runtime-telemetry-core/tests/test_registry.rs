use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;
use runtime_telemetry_core::{Metric, MetricKind, MetricRegistry, RegistryError, Timer};

#[test]
fn test_concurrent_first_registration_creates_once() {
    let _ = pretty_env_logger::try_init();
    let registry = Arc::new(MetricRegistry::new());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let timer = registry.timer("jvm.gc-mem.g1-young-generation.timer").unwrap();
                timer.update_nanos(1);
                Metric::Timer(timer)
            })
        })
        .collect();

    let metrics: Vec<Metric> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for metric in &metrics[1..] {
        assert!(metric.ptr_eq(&metrics[0]));
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.timer("jvm.gc-mem.g1-young-generation.timer").unwrap().count(),
        8
    );
}

#[rstest]
#[case(MetricKind::Counter)]
#[case(MetricKind::Meter)]
#[case(MetricKind::LongGauge)]
#[case(MetricKind::DoubleGauge)]
fn test_kind_is_enforced_for_every_kind(#[case] kind: MetricKind) {
    let registry = MetricRegistry::new();
    registry.get_or_create("t", Timer::new).unwrap();

    let err = registry
        .get_or_register("t", kind, || panic!("must not create"))
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::TypeMismatch {
            name: "t".into(),
            expected: kind,
            found: MetricKind::Timer,
        }
    );
    assert!(registry.get_or_register("t", MetricKind::Timer, || panic!()).is_ok());
}

#[test]
fn test_interleaved_counters_lose_no_increments() {
    let _ = pretty_env_logger::try_init();
    let registry = Arc::new(MetricRegistry::new());

    let handles: Vec<_> = (0..4_u64)
        .map(|seed| {
            let registry = registry.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut seen = BTreeMap::new();
                for _ in 0..500 {
                    let name = format!("counter-{}", rng.random_range(0..16));
                    registry.counter(&name).unwrap().inc();
                    *seen.entry(name).or_insert(0_i64) += 1;
                }
                seen
            })
        })
        .collect();

    let mut expected: BTreeMap<String, i64> = BTreeMap::new();
    for handle in handles {
        for (name, n) in handle.join().unwrap() {
            *expected.entry(name).or_default() += n;
        }
    }

    assert_eq!(registry.len(), expected.len());
    for (name, n) in &expected {
        assert_eq!(registry.counter(name).unwrap().count(), *n, "`{}`", name);
    }
}
