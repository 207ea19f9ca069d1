//! Serializable point-in-time readings of the registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metric::{GaugeValue, Metric};

/// The values of every metric in a registry at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Metric readings keyed by name.
    pub metrics: BTreeMap<String, MetricSnapshot>,
}

impl RegistrySnapshot {
    /// Returns the reading for `name`.
    pub fn get(&self, name: &str) -> Option<&MetricSnapshot> {
        self.metrics.get(name)
    }

    /// Returns `true` if there are no readings.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Rates reported by meters and timers, in events per second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    /// Mean rate since creation.
    pub mean: f64,
    /// One minute moving average.
    pub m1: f64,
    /// Five minute moving average.
    pub m5: f64,
    /// Fifteen minute moving average.
    pub m15: f64,
}

/// The reading of a single metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricSnapshot {
    /// A counter reading.
    Counter {
        /// Current count.
        count: i64,
    },
    /// A meter reading.
    Meter {
        /// Events marked so far.
        count: u64,
        /// Event rates.
        rates: Rates,
    },
    /// A timer reading. Durations are in nanoseconds.
    Timer {
        /// Durations recorded so far.
        count: u64,
        /// Recording rates.
        rates: Rates,
        /// Smallest sample in the window.
        min: i64,
        /// Largest sample in the window.
        max: i64,
        /// Mean of the window.
        mean: f64,
        /// Standard deviation of the window.
        std_dev: f64,
        /// Median.
        p50: f64,
        /// 75th percentile.
        p75: f64,
        /// 95th percentile.
        p95: f64,
        /// 99th percentile.
        p99: f64,
        /// 99.9th percentile.
        p999: f64,
    },
    /// A long gauge reading.
    LongGauge {
        /// Last value written.
        value: i64,
    },
    /// A double gauge reading.
    DoubleGauge {
        /// Last value written.
        value: f64,
    },
    /// A polled gauge reading.
    Gauge {
        /// Value returned by the poll.
        value: GaugeValue,
    },
}

impl MetricSnapshot {
    /// Reads the current state of `metric`.
    pub fn of(metric: &Metric) -> Self {
        match metric {
            Metric::Counter(c) => MetricSnapshot::Counter { count: c.count() },
            Metric::Meter(m) => MetricSnapshot::Meter {
                count: m.count(),
                rates: Rates {
                    mean: m.mean_rate(),
                    m1: m.one_minute_rate(),
                    m5: m.five_minute_rate(),
                    m15: m.fifteen_minute_rate(),
                },
            },
            Metric::Timer(t) => {
                let meter = t.meter();
                let dist = t.distribution();
                MetricSnapshot::Timer {
                    count: t.count(),
                    rates: Rates {
                        mean: meter.mean_rate(),
                        m1: meter.one_minute_rate(),
                        m5: meter.five_minute_rate(),
                        m15: meter.fifteen_minute_rate(),
                    },
                    min: dist.min(),
                    max: dist.max(),
                    mean: dist.mean(),
                    std_dev: dist.std_dev(),
                    p50: dist.median(),
                    p75: dist.value(0.75),
                    p95: dist.value(0.95),
                    p99: dist.value(0.99),
                    p999: dist.value(0.999),
                }
            }
            Metric::LongGauge(g) => MetricSnapshot::LongGauge { value: g.get() },
            Metric::DoubleGauge(g) => MetricSnapshot::DoubleGauge { value: g.get() },
            Metric::Gauge(g) => MetricSnapshot::Gauge { value: g.value() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Gauge, LongGauge};
    use crate::registry::MetricRegistry;

    #[test]
    fn test_snapshot_serialization() {
        let registry = MetricRegistry::new();
        registry.long_gauge("pool.used").unwrap().set(80);
        registry.register("uptime", Gauge::new(|| 3_i64)).unwrap();
        registry.register("manual", LongGauge::new()).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.get("pool.used"),
            Some(&MetricSnapshot::LongGauge { value: 80 })
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(r#""pool.used":{"type":"long_gauge","value":80}"#));
        assert!(json.contains(r#""uptime":{"type":"gauge","value":3}"#));
    }

    #[test]
    fn test_timer_snapshot() {
        let registry = MetricRegistry::new();
        let timer = registry.timer("gc.timer").unwrap();
        timer.update_nanos(10);
        timer.update_nanos(30);

        match registry.snapshot().get("gc.timer") {
            Some(MetricSnapshot::Timer { count, min, max, mean, .. }) => {
                assert_eq!(*count, 2);
                assert_eq!(*min, 10);
                assert_eq!(*max, 30);
                assert_eq!(*mean, 20.0);
            }
            other => panic!("unexpected snapshot {:?}", other),
        }
    }
}
