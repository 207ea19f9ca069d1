//! Metric kinds stored in the registry.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::meter::Meter;
use crate::timer::Timer;

/// The kind of a [`Metric`], without its state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// A [`Counter`].
    Counter,
    /// A [`Meter`].
    Meter,
    /// A [`Timer`].
    Timer,
    /// A [`LongGauge`].
    LongGauge,
    /// A [`DoubleGauge`].
    DoubleGauge,
    /// A polled [`Gauge`].
    Gauge,
}

impl MetricKind {
    /// Returns the name of this kind as used in snapshots and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Meter => "meter",
            MetricKind::Timer => "timer",
            MetricKind::LongGauge => "long_gauge",
            MetricKind::DoubleGauge => "double_gauge",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric bound to a name in the [`MetricRegistry`](crate::MetricRegistry).
///
/// Every variant is a shared handle: cloning a `Metric` clones the `Arc`, so
/// all clones observe and update the same state.
#[derive(Clone)]
pub enum Metric {
    /// Signed up/down counter.
    Counter(Arc<Counter>),
    /// Event counter with rate estimation.
    Meter(Arc<Meter>),
    /// Duration distribution plus rate.
    Timer(Arc<Timer>),
    /// Settable 64-bit integer.
    LongGauge(Arc<LongGauge>),
    /// Settable 64-bit float.
    DoubleGauge(Arc<DoubleGauge>),
    /// Value computed on every read.
    Gauge(Arc<Gauge>),
}

impl Metric {
    /// Returns the kind of this metric.
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Timer(_) => MetricKind::Timer,
            Metric::LongGauge(_) => MetricKind::LongGauge,
            Metric::DoubleGauge(_) => MetricKind::DoubleGauge,
            Metric::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Returns `true` if both handles point at the same metric object.
    pub fn ptr_eq(&self, other: &Metric) -> bool {
        match (self, other) {
            (Metric::Counter(a), Metric::Counter(b)) => Arc::ptr_eq(a, b),
            (Metric::Meter(a), Metric::Meter(b)) => Arc::ptr_eq(a, b),
            (Metric::Timer(a), Metric::Timer(b)) => Arc::ptr_eq(a, b),
            (Metric::LongGauge(a), Metric::LongGauge(b)) => Arc::ptr_eq(a, b),
            (Metric::DoubleGauge(a), Metric::DoubleGauge(b)) => Arc::ptr_eq(a, b),
            (Metric::Gauge(a), Metric::Gauge(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Downcasts into the typed handle, if the kind matches.
    pub fn downcast<T: TypedMetric>(self) -> Option<Arc<T>> {
        T::from_metric(self)
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Counter(c) => f.debug_tuple("Counter").field(&c.count()).finish(),
            Metric::Meter(m) => f.debug_tuple("Meter").field(&m.count()).finish(),
            Metric::Timer(t) => f.debug_tuple("Timer").field(&t.count()).finish(),
            Metric::LongGauge(g) => f.debug_tuple("LongGauge").field(&g.get()).finish(),
            Metric::DoubleGauge(g) => f.debug_tuple("DoubleGauge").field(&g.get()).finish(),
            Metric::Gauge(g) => f.debug_tuple("Gauge").field(&g.value()).finish(),
        }
    }
}

/// Links a concrete metric type to its [`Metric`] variant.
///
/// This lets the registry hand out typed handles without casting at runtime.
pub trait TypedMetric: Send + Sync + Sized + 'static {
    /// The kind of this metric type.
    const KIND: MetricKind;

    /// Extracts the typed handle, returning `None` on a kind mismatch.
    fn from_metric(metric: Metric) -> Option<Arc<Self>>;

    /// Wraps the typed handle into a [`Metric`].
    fn into_metric(this: Arc<Self>) -> Metric;
}

macro_rules! typed_metric {
    ($ty:ident) => {
        impl TypedMetric for $ty {
            const KIND: MetricKind = MetricKind::$ty;

            fn from_metric(metric: Metric) -> Option<Arc<Self>> {
                match metric {
                    Metric::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_metric(this: Arc<Self>) -> Metric {
                Metric::$ty(this)
            }
        }

        impl From<$ty> for Metric {
            fn from(value: $ty) -> Self {
                Metric::$ty(Arc::new(value))
            }
        }

        impl From<Arc<$ty>> for Metric {
            fn from(value: Arc<$ty>) -> Self {
                Metric::$ty(value)
            }
        }
    };
}

typed_metric!(Counter);
typed_metric!(Meter);
typed_metric!(Timer);
typed_metric!(LongGauge);
typed_metric!(DoubleGauge);
typed_metric!(Gauge);

/// A counter that can be incremented and decremented.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Creates a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments by one.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increments by `n`.
    pub fn inc_by(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Decrements by one.
    pub fn dec(&self) {
        self.dec_by(1);
    }

    /// Decrements by `n`.
    pub fn dec_by(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    /// The current count.
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// A gauge holding the last `i64` written to it.
#[derive(Debug, Default)]
pub struct LongGauge {
    value: AtomicI64,
}

impl LongGauge {
    /// Creates a gauge with value `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// The last value written.
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge holding the last `f64` written to it.
#[derive(Debug)]
pub struct DoubleGauge {
    // f64 bits
    value: AtomicU64,
}

impl DoubleGauge {
    /// Creates a gauge with value `0.0`.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Replaces the value.
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    /// The last value written.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

impl Default for DoubleGauge {
    fn default() -> Self {
        Self::new()
    }
}

/// The value read from a polled [`Gauge`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GaugeValue {
    /// An integer value.
    Long(i64),
    /// A floating-point value.
    Double(f64),
}

impl From<i64> for GaugeValue {
    fn from(v: i64) -> Self {
        GaugeValue::Long(v)
    }
}

impl From<u64> for GaugeValue {
    fn from(v: u64) -> Self {
        GaugeValue::Long(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for GaugeValue {
    fn from(v: usize) -> Self {
        GaugeValue::Long(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for GaugeValue {
    fn from(v: f64) -> Self {
        GaugeValue::Double(v)
    }
}

type GaugeFn = dyn Fn() -> GaugeValue + Send + Sync;

/// A gauge whose value is computed by a closure on every read.
///
/// ```
/// use runtime_telemetry_core::{Gauge, GaugeValue};
///
/// let gauge = Gauge::new(|| 42_i64);
/// assert_eq!(gauge.value(), GaugeValue::Long(42));
/// ```
pub struct Gauge {
    poll: Box<GaugeFn>,
}

impl Gauge {
    /// Creates a gauge polling `f`.
    pub fn new<F, V>(f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<GaugeValue>,
    {
        Self {
            poll: Box::new(move || f().into()),
        }
    }

    /// Polls the current value.
    pub fn value(&self) -> GaugeValue {
        (self.poll)()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").finish_non_exhaustive()
    }
}
