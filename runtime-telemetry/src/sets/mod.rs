//! Built-in gauge sets.
//!
//! This module contains gauge sets for common process metrics:
//! - Memory usage
//! - Thread states
//! - File descriptors
//! - CPU load and uptime
//! - Collections and time per garbage collector
//! - Native allocator statistics (jemalloc)

use runtime_telemetry_core::{Gauge, GaugeValue, Metric};

#[cfg(all(feature = "jemalloc", unix))]
mod allocator;
mod cpu;
mod fd;
mod gc;
mod memory;
mod threads;

#[cfg(all(feature = "jemalloc", unix))]
pub use allocator::AllocatorGaugeSet;
pub use cpu::{CpuLoadGauge, UptimeGauge};
pub use fd::FileDescriptorGaugeSet;
pub use gc::GarbageCollectorGaugeSet;
pub use memory::{MemoryFreeGaugeSet, MemoryUsageGaugeSet};
pub use threads::ThreadStatesGaugeSet;

/// Reported by gauges whose value is not available on this platform.
pub const UNAVAILABLE: i64 = -1;

fn gauge<F, V>(f: F) -> Metric
where
    F: Fn() -> V + Send + Sync + 'static,
    V: Into<GaugeValue>,
{
    Metric::from(Gauge::new(f))
}
