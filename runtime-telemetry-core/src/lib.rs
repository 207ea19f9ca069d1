//! The metric registry at the heart of runtime telemetry.
//!
//! Collectors publish their readings into a shared [`MetricRegistry`], which
//! exporters sample through [`MetricRegistry::snapshot`]. The registry stores
//! a fixed set of metric kinds:
//!
//! - [`Counter`] tracks a value that can go up and down.
//! - [`Meter`] counts events and estimates their rate.
//! - [`Timer`] records durations and reports their rate and distribution.
//! - [`LongGauge`] and [`DoubleGauge`] hold the last value written to them.
//! - [`Gauge`] computes its value whenever it is read.
//!
//! # Registration
//!
//! Names are bound at most once. [`MetricRegistry::get_or_register`] binds a
//! name lazily and always hands out the same object afterwards, refusing to
//! return a metric of another kind:
//!
//! ```
//! use runtime_telemetry_core::{MetricKind, MetricRegistry, RegistryError, LongGauge};
//!
//! let registry = MetricRegistry::new();
//! let gauge = registry.long_gauge("jvm.gc-mem.g1-old-generation.after.total.used")?;
//! gauge.set(1024);
//!
//! let err = registry
//!     .get_or_register("jvm.gc-mem.g1-old-generation.after.total.used", MetricKind::Meter, || {
//!         LongGauge::new().into()
//!     })
//!     .unwrap_err();
//! assert!(matches!(err, RegistryError::TypeMismatch { .. }));
//! # Ok::<(), RegistryError>(())
//! ```
//!
//! # Metric sets
//!
//! Groups of metrics implement [`MetricSet`] and can be renamed, merged and
//! registered in bulk with the helpers in [`sets`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod error;
mod meter;
mod metric;
mod registry;
mod snapshot;
mod timer;

pub mod sets;

pub use error::RegistryError;
pub use meter::{Clock, Meter, SystemClock};
pub use metric::{
    Counter, DoubleGauge, Gauge, GaugeValue, LongGauge, Metric, MetricKind, TypedMetric,
};
pub use registry::MetricRegistry;
pub use sets::MetricSet;
pub use snapshot::{MetricSnapshot, Rates, RegistrySnapshot};
pub use timer::{Distribution, Timer, WINDOW_SIZE};
