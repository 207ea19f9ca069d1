//! Turns GC events into registry metrics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use runtime_telemetry_core::{DoubleGauge, LongGauge, Meter, MetricRegistry, Timer, TypedMetric};

use crate::event::{GcEvent, MemoryUsage};
use crate::naming::{metric_name, normalize};
use crate::source::{GcEventHandler, GcNotificationListener, ManagementRuntime};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Options for [`GcMemoryMetrics`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcMetricsOptions {
    /// Prefix of every metric name, without trailing dot.
    ///
    /// Default: `runtime.gc-mem`
    pub prefix: String,

    /// Whether to keep marking the `<prefix>.<collector>.rate` meter.
    ///
    /// The `timer` of the collector reports the same rate.
    ///
    /// Default: true
    pub rate_meter: bool,
}

impl Default for GcMetricsOptions {
    fn default() -> Self {
        Self {
            prefix: "runtime.gc-mem".to_owned(),
            rate_meter: true,
        }
    }
}

impl GcMetricsOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the metric name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enables or disables the deprecated rate meter.
    #[must_use]
    pub fn with_rate_meter(mut self, enabled: bool) -> Self {
        self.rate_meter = enabled;
        self
    }
}

/// Accumulates GC events per collector and writes them to the registry.
///
/// For every event of collector `C` the following metrics are updated under
/// `<prefix>.<C>`:
///
/// - `rate`: meter marked once per event
/// - `timer`: the event duration
/// - `pct-time-in-gc`: percent of the runtime's lifetime spent in `C`
/// - `{before,after}.pools.<pool>.{max,used,free}`: pool usage
/// - `{before,after}.total.{max,used,free}`: sums over all pools
///
/// Collector and pool names are lowercased with spaces replaced by `-`.
/// Metrics are registered on first use; events are processed one at a time.
pub struct GcMemoryMetrics {
    options: GcMetricsOptions,
    registry: Arc<MetricRegistry>,
    /// normalized collector name -> totals
    totals: Mutex<HashMap<String, CollectorTotals>>,
}

#[derive(Clone, Copy, Debug, Default)]
struct CollectorTotals {
    time_ms: i64,
    count: u64,
}

impl GcMemoryMetrics {
    /// Creates an accumulator that is not subscribed to anything yet.
    pub fn new(options: GcMetricsOptions, registry: Arc<MetricRegistry>) -> Self {
        Self {
            options,
            registry,
            totals: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an accumulator and subscribes it to every collector of `runtime`.
    pub fn attach(
        options: GcMetricsOptions,
        registry: Arc<MetricRegistry>,
        runtime: &dyn ManagementRuntime,
    ) -> Arc<Self> {
        let metrics = Arc::new(Self::new(options, registry));
        let collectors = runtime.garbage_collectors();
        for emitter in &collectors {
            log::debug!("[GcMemoryMetrics] Listening to collector `{}`", emitter.name());
            let listener = GcNotificationListener::new(metrics.clone());
            emitter.add_notification_listener(Arc::new(listener));
        }
        log::debug!(
            "[GcMemoryMetrics] Attached to {} collectors under `{}`",
            collectors.len(),
            metrics.options.prefix
        );
        metrics
    }

    /// The metric name prefix.
    pub fn prefix(&self) -> &str {
        &self.options.prefix
    }

    /// Summed GC time of `collector` in milliseconds, if it was seen.
    pub fn total_gc_time(&self, collector: &str) -> Option<i64> {
        self.totals().get(&normalize(collector)).map(|t| t.time_ms)
    }

    /// Number of events seen for `collector`, if it was seen.
    pub fn collection_count(&self, collector: &str) -> Option<u64> {
        self.totals().get(&normalize(collector)).map(|t| t.count)
    }

    /// Normalized names of every collector seen so far, sorted.
    pub fn collectors(&self) -> Vec<String> {
        let mut rv: Vec<String> = self.totals().keys().cloned().collect();
        rv.sort();
        rv
    }

    fn totals(&self) -> MutexGuard<'_, HashMap<String, CollectorTotals>> {
        // a panic while handling one event must not disable the listener
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Processes one event.
    pub fn handle(&self, event: &GcEvent) {
        let collector = normalize(&event.collector_name);
        let mut totals = self.totals();

        if let Some(cause) = &event.cause {
            log::trace!(
                "[GcMemoryMetrics] `{}` took {}ms ({})",
                collector,
                event.duration_ms,
                cause
            );
        }

        if self.options.rate_meter {
            self.mark_meter(&collector);
        }
        self.update_time(&mut totals, &collector, event.duration_ms, event.end_time_ms);

        self.put_pool_gauges(&collector, "before", &event.before);
        self.put_pool_gauges(&collector, "after", &event.after);
        self.put_total_gauges(&collector, "before", &event.before);
        self.put_total_gauges(&collector, "after", &event.after);
    }

    fn mark_meter(&self, collector: &str) {
        let name = metric_name(&self.options.prefix, &[collector, "rate"]);
        self.with_metric(&name, Meter::new, |m| m.mark());
    }

    /// Records the timer and updates the percent of time spent in GC.
    ///
    /// The end time is measured from runtime start, so the percent is
    /// `100 * total / end_time`.
    fn update_time(
        &self,
        totals: &mut HashMap<String, CollectorTotals>,
        collector: &str,
        duration_ms: i64,
        end_time_ms: i64,
    ) {
        let name = metric_name(&self.options.prefix, &[collector, "timer"]);
        self.with_metric(&name, Timer::new, |t| {
            t.update_nanos(duration_ms.saturating_mul(NANOS_PER_MILLI))
        });

        let total = totals.entry(collector.to_owned()).or_default();
        total.time_ms = total.time_ms.saturating_add(duration_ms);
        total.count = total.count.saturating_add(1);
        let percent = percent_time_in_gc(total.time_ms, end_time_ms);

        self.with_metric(
            &metric_name(&self.options.prefix, &[collector, "pct-time-in-gc"]),
            DoubleGauge::new,
            |g| g.set(percent),
        );
    }

    fn put_pool_gauges(
        &self,
        collector: &str,
        time_part: &str,
        usages: &BTreeMap<String, MemoryUsage>,
    ) {
        for (pool, usage) in usages {
            self.put_gauge(&[collector, time_part, "pools", pool.as_str(), "max"], usage.max);
            self.put_gauge(&[collector, time_part, "pools", pool.as_str(), "used"], usage.used);
            self.put_gauge(&[collector, time_part, "pools", pool.as_str(), "free"], usage.free());
        }
    }

    fn put_total_gauges(
        &self,
        collector: &str,
        time_part: &str,
        usages: &BTreeMap<String, MemoryUsage>,
    ) {
        self.put_gauge(&[collector, time_part, "total", "max"], sum(usages, |u| u.max));
        self.put_gauge(&[collector, time_part, "total", "used"], sum(usages, |u| u.used));
        self.put_gauge(&[collector, time_part, "total", "free"], sum(usages, MemoryUsage::free));
    }

    fn put_gauge(&self, parts: &[&str], value: i64) {
        self.with_metric(&metric_name(&self.options.prefix, parts), LongGauge::new, |g| {
            g.set(value)
        });
    }

    /// Looks up or registers `name` and applies `update`.
    ///
    /// A name bound to another kind of metric skips only this write.
    fn with_metric<T, F, U>(&self, name: &str, factory: F, update: U)
    where
        T: TypedMetric,
        F: FnOnce() -> T,
        U: FnOnce(&T),
    {
        match self.registry.get_or_create(name, factory) {
            Ok(metric) => update(&metric),
            Err(err) => log::warn!("[GcMemoryMetrics] Skipping write: {}", err),
        }
    }
}

impl GcEventHandler for GcMemoryMetrics {
    fn handle_gc_event(&self, event: &GcEvent) {
        self.handle(event);
    }
}

impl fmt::Debug for GcMemoryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcMemoryMetrics")
            .field("options", &self.options)
            .field("collectors", &self.collectors())
            .finish()
    }
}

/// `100 * total / end_time`, or `0` if the end time is not positive.
fn percent_time_in_gc(total_ms: i64, end_time_ms: i64) -> f64 {
    if end_time_ms <= 0 {
        return 0.0;
    }
    100.0 * total_ms as f64 / end_time_ms as f64
}

fn sum(usages: &BTreeMap<String, MemoryUsage>, f: impl Fn(&MemoryUsage) -> i64) -> i64 {
    usages.values().map(f).fold(0, i64::wrapping_add)
}

#[cfg(test)]
mod tests {
    use runtime_telemetry_core::{Counter, Metric, MetricKind};

    use super::*;

    fn metrics() -> (Arc<MetricRegistry>, GcMemoryMetrics) {
        let registry = Arc::new(MetricRegistry::new());
        let metrics = GcMemoryMetrics::new(
            GcMetricsOptions::new().with_prefix("jvm.gc-mem"),
            registry.clone(),
        );
        (registry, metrics)
    }

    fn long(registry: &MetricRegistry, name: &str) -> i64 {
        match registry.get(name) {
            Some(Metric::LongGauge(g)) => g.get(),
            other => panic!("`{}` is not a long gauge: {:?}", name, other),
        }
    }

    #[test]
    fn test_percent_time_in_gc() {
        assert_eq!(percent_time_in_gc(10, 1000), 1.0);
        assert_eq!(percent_time_in_gc(30, 2000), 1.5);
        assert_eq!(percent_time_in_gc(5, 0), 0.0);
        assert_eq!(percent_time_in_gc(5, -10), 0.0);
    }

    #[test]
    fn test_sum_wraps() {
        let mut usages = BTreeMap::new();
        usages.insert("a".to_owned(), MemoryUsage::new(i64::MAX, 0));
        usages.insert("b".to_owned(), MemoryUsage::new(1, 0));
        assert_eq!(sum(&usages, |u| u.max), i64::MIN);
        assert_eq!(sum(&BTreeMap::new(), |u| u.max), 0);
    }

    #[test]
    fn test_totals_without_pools_are_zero() {
        let (registry, metrics) = metrics();
        metrics.handle(&GcEvent::new("Copy", 1, 100));
        assert_eq!(long(&registry, "jvm.gc-mem.copy.before.total.max"), 0);
        assert_eq!(long(&registry, "jvm.gc-mem.copy.after.total.free"), 0);
        // 3 time metrics + 6 totals
        assert_eq!(registry.len(), 9);
    }

    #[test]
    fn test_type_mismatch_skips_only_that_write() {
        let (registry, metrics) = metrics();
        registry.register("jvm.gc-mem.copy.timer", Counter::new()).unwrap();

        metrics.handle(
            &GcEvent::new("Copy", 4, 400).with_after("Eden", MemoryUsage::new(10, 2)),
        );

        assert_eq!(
            registry.get("jvm.gc-mem.copy.timer").map(|m| m.kind()),
            Some(MetricKind::Counter)
        );
        assert_eq!(metrics.total_gc_time("Copy"), Some(4));
        assert_eq!(metrics.collection_count("Copy"), Some(1));
        assert_eq!(long(&registry, "jvm.gc-mem.copy.after.pools.eden.free"), 8);
    }

    #[test]
    fn test_rate_meter_can_be_disabled() {
        let registry = Arc::new(MetricRegistry::new());
        let metrics = GcMemoryMetrics::new(
            GcMetricsOptions::new().with_rate_meter(false),
            registry.clone(),
        );
        metrics.handle(&GcEvent::new("Copy", 1, 100));
        assert!(registry.get("runtime.gc-mem.copy.rate").is_none());
        assert!(registry.get("runtime.gc-mem.copy.timer").is_some());
    }

    #[test]
    fn test_totals_keyed_by_normalized_name() {
        let (_registry, metrics) = metrics();
        metrics.handle(&GcEvent::new("G1 Young Generation", 10, 1000));
        metrics.handle(&GcEvent::new("g1 young generation", 5, 2000));
        assert_eq!(metrics.total_gc_time("G1 YOUNG GENERATION"), Some(15));
        assert_eq!(metrics.collectors(), vec!["g1-young-generation".to_owned()]);
    }

    #[test]
    fn test_empty_prefix_and_collector_keep_their_dots() {
        let registry = Arc::new(MetricRegistry::new());
        let options = GcMetricsOptions::new().with_prefix("");
        let metrics = GcMemoryMetrics::new(options, registry.clone());
        metrics.handle(&GcEvent::new("", 1, 100));

        assert!(registry.get("..rate").is_some());
        assert!(registry.get("..timer").is_some());
        assert_eq!(long(&registry, "..after.total.free"), 0);
        assert!(registry.names().iter().all(|name| name.starts_with("..")));
    }

    #[test]
    fn test_collection_count_follows_events() {
        let (_registry, metrics) = metrics();
        assert_eq!(metrics.collection_count("Copy"), None);
        assert_eq!(metrics.total_gc_time("Copy"), None);

        for end in [100, 200, 300] {
            metrics.handle(&GcEvent::new("Copy", 7, end));
        }
        metrics.handle(&GcEvent::new("MarkSweepCompact", 40, 400));

        assert_eq!(metrics.collection_count("copy"), Some(3));
        assert_eq!(metrics.total_gc_time("copy"), Some(21));
        assert_eq!(metrics.collection_count("MarkSweepCompact"), Some(1));
    }
}
