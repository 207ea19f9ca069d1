//! Runtime telemetry published into a shared metric registry.
//!
//! This crate wires the garbage collection metrics of
//! [`runtime_telemetry_gc`] together with polled gauges describing the
//! process, all under one base name.
//!
//! # Overview
//!
//! The metrics registered under `<base>` are:
//! - `gc-mem.*`: per-collector pause times, rates and pool usage
//! - `gc.*`: polled collection counts and times per collector
//! - `mem.*`: process and system memory
//! - `thread.*`: thread count and states
//! - `fd.*`: file descriptors
//! - `cpu.load` and `uptime`
//! - `nmt.*`: native allocator statistics (with the `jemalloc` feature)
//!
//! Gauges whose value is not available on the current platform read `-1`.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use runtime_telemetry::{RuntimeTelemetry, RuntimeTelemetryConfig};
//! use runtime_telemetry_core::MetricRegistry;
//! use runtime_telemetry_gc::{GcEvent, HostRuntime};
//!
//! let registry = Arc::new(MetricRegistry::new());
//! let runtime = HostRuntime::new();
//! let young = runtime.add_collector("Copy");
//!
//! let config = RuntimeTelemetryConfig::new();
//! let telemetry = RuntimeTelemetry::new(registry.clone(), config, &runtime);
//! telemetry.register().unwrap();
//!
//! young.emit_gc(&GcEvent::new("Copy", 3, 300));
//! assert_eq!(telemetry.gc().total_gc_time("Copy"), Some(3));
//! assert!(registry.get("runtime.gc-mem.copy.timer").is_some());
//! assert!(registry.get("runtime.gc.copy.count").is_some());
//! ```

#![warn(missing_docs)]

mod config;
mod telemetry;

pub mod sets;

pub use config::RuntimeTelemetryConfig;
pub use telemetry::RuntimeTelemetry;

pub use runtime_telemetry_core::{
    Metric, MetricKind, MetricRegistry, MetricSet, RegistryError, RegistrySnapshot,
};
pub use runtime_telemetry_gc::{GcMemoryMetrics, GcMetricsOptions, ManagementRuntime};
