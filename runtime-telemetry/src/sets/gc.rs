//! Per-collector garbage collection gauges.

use std::collections::BTreeMap;
use std::sync::Arc;

use runtime_telemetry_core::{Metric, MetricSet};
use runtime_telemetry_gc::{normalize, GcMemoryMetrics};

use super::gauge;

/// Collections and time spent per collector.
///
/// Metrics, for every collector `C` given at creation:
/// - `<C>.count` - Collections seen so far
/// - `<C>.time` - Summed collection time in milliseconds
///
/// Values are read from the [`GcMemoryMetrics`] fed by the collectors'
/// notifications, so both start at `0`.
pub struct GarbageCollectorGaugeSet {
    gauges: BTreeMap<String, Metric>,
}

impl GarbageCollectorGaugeSet {
    /// Creates gauges for `collectors`.
    pub fn new<I, S>(gc: Arc<GcMemoryMetrics>, collectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut gauges = BTreeMap::new();
        for collector in collectors {
            let name = normalize(collector.as_ref());
            let counts = gc.clone();
            let key = name.clone();
            gauges.insert(
                format!("{}.count", name),
                gauge(move || counts.collection_count(&key).unwrap_or(0)),
            );
            let times = gc.clone();
            let key = name.clone();
            gauges.insert(
                format!("{}.time", name),
                gauge(move || times.total_gc_time(&key).unwrap_or(0)),
            );
        }
        Self { gauges }
    }
}

impl MetricSet for GarbageCollectorGaugeSet {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.gauges.clone()
    }
}

impl std::fmt::Debug for GarbageCollectorGaugeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollectorGaugeSet")
            .field("gauges", &self.gauges.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use runtime_telemetry_core::{GaugeValue, MetricRegistry};
    use runtime_telemetry_gc::{GcEvent, GcMetricsOptions};

    use super::*;

    fn read(metrics: &BTreeMap<String, Metric>, name: &str) -> GaugeValue {
        match metrics.get(name) {
            Some(Metric::Gauge(g)) => g.value(),
            other => panic!("`{}` is not a gauge: {:?}", name, other),
        }
    }

    #[test]
    fn test_gauges_follow_handled_events() {
        let gc = Arc::new(GcMemoryMetrics::new(
            GcMetricsOptions::new(),
            Arc::new(MetricRegistry::new()),
        ));
        let set = GarbageCollectorGaugeSet::new(gc.clone(), ["PS Scavenge", "PS MarkSweep"]);
        let metrics = set.metrics();

        assert_eq!(
            metrics.keys().collect::<Vec<_>>(),
            vec![
                "ps-marksweep.count",
                "ps-marksweep.time",
                "ps-scavenge.count",
                "ps-scavenge.time",
            ]
        );
        assert_eq!(read(&metrics, "ps-scavenge.count"), GaugeValue::Long(0));

        gc.handle(&GcEvent::new("PS Scavenge", 3, 100));
        gc.handle(&GcEvent::new("PS Scavenge", 4, 200));

        assert_eq!(read(&metrics, "ps-scavenge.count"), GaugeValue::Long(2));
        assert_eq!(read(&metrics, "ps-scavenge.time"), GaugeValue::Long(7));
        assert_eq!(read(&metrics, "ps-marksweep.time"), GaugeValue::Long(0));
    }
}
