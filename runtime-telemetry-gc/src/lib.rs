//! Garbage collection metrics for runtime telemetry.
//!
//! This crate subscribes to the garbage collection notifications of the host
//! runtime and keeps a fixed schema of metrics per collector in a shared
//! [`MetricRegistry`](runtime_telemetry_core::MetricRegistry).
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use runtime_telemetry_core::{Metric, MetricRegistry};
//! use runtime_telemetry_gc::{
//!     GcEvent, GcMemoryMetrics, GcMetricsOptions, HostRuntime, MemoryUsage,
//! };
//!
//! let registry = Arc::new(MetricRegistry::new());
//! let runtime = HostRuntime::new();
//! let young = runtime.add_collector("G1 Young Generation");
//!
//! let gc = GcMemoryMetrics::attach(
//!     GcMetricsOptions::new().with_prefix("jvm.gc-mem"),
//!     registry.clone(),
//!     &runtime,
//! );
//!
//! young.emit_gc(
//!     &GcEvent::new("G1 Young Generation", 10, 1_000)
//!         .with_before("Eden", MemoryUsage::new(100, 80))
//!         .with_after("Eden", MemoryUsage::new(100, 5)),
//! );
//!
//! assert_eq!(gc.total_gc_time("G1 Young Generation"), Some(10));
//! match registry.get("jvm.gc-mem.g1-young-generation.pct-time-in-gc") {
//!     Some(Metric::DoubleGauge(pct)) => assert_eq!(pct.get(), 1.0),
//!     _ => unreachable!(),
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod accumulator;
mod decode;
mod event;
mod naming;
mod source;

pub use accumulator::{GcMemoryMetrics, GcMetricsOptions};
pub use decode::{decode_gc_notification, decode_gc_payload, NotificationDecodeError};
pub use event::{GcEvent, MemoryUsage};
pub use naming::{metric_name, normalize};
pub use source::{
    CollectorEmitter, GcEventHandler, GcNotificationListener, HostRuntime, ManagementRuntime,
    Notification, NotificationEmitter, NotificationListener, GARBAGE_COLLECTION_NOTIFICATION,
};
