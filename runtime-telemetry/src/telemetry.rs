//! The runtime telemetry wiring.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use runtime_telemetry_core::sets::{combine, combine_and_prefix, prefix, remove_all};
use runtime_telemetry_core::{Metric, MetricRegistry, MetricSet, RegistryError, RegistrySnapshot};
use runtime_telemetry_gc::{GcMemoryMetrics, ManagementRuntime};

use crate::config::RuntimeTelemetryConfig;
use crate::sets;

/// Publishes runtime metrics into a shared [`MetricRegistry`].
///
/// Garbage collection metrics are written by the collectors' notifications
/// from the moment the telemetry is created. The polled gauge sets only show
/// up in the registry after [`register`](Self::register).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use runtime_telemetry::{RuntimeTelemetry, RuntimeTelemetryConfig};
/// use runtime_telemetry_core::MetricRegistry;
/// use runtime_telemetry_gc::HostRuntime;
///
/// let registry = Arc::new(MetricRegistry::new());
/// let runtime = HostRuntime::new();
/// runtime.add_collector("G1 Young Generation");
///
/// let telemetry = RuntimeTelemetry::new(
///     registry.clone(),
///     RuntimeTelemetryConfig::new().with_base("jvm"),
///     &runtime,
/// );
/// telemetry.register().unwrap();
/// assert!(registry.get("jvm.uptime").is_some());
/// ```
pub struct RuntimeTelemetry {
    config: RuntimeTelemetryConfig,
    registry: Arc<MetricRegistry>,
    gc: Arc<GcMemoryMetrics>,
    gauges: Box<dyn MetricSet>,
    registered: Mutex<bool>,
}

impl RuntimeTelemetry {
    /// Creates the telemetry and subscribes to every collector of `runtime`.
    pub fn new(
        registry: Arc<MetricRegistry>,
        config: RuntimeTelemetryConfig,
        runtime: &dyn ManagementRuntime,
    ) -> Self {
        let gc_options = config.gc.clone().with_prefix(config.gc_prefix());
        let gc = GcMemoryMetrics::attach(gc_options, registry.clone(), runtime);
        let collectors: Vec<String> = runtime
            .garbage_collectors()
            .iter()
            .map(|emitter| emitter.name().to_owned())
            .collect();
        let gauges = Box::new(build_gauge_sets(&config, &gc, &collectors));
        Self {
            config,
            registry,
            gc,
            gauges,
            registered: Mutex::new(false),
        }
    }

    /// Creates the telemetry with default configuration.
    pub fn default_config(registry: Arc<MetricRegistry>, runtime: &dyn ManagementRuntime) -> Self {
        Self::new(registry, RuntimeTelemetryConfig::default(), runtime)
    }

    /// Registers the gauge sets.
    ///
    /// Calling this again while registered does nothing. If a name is already
    /// taken, the names registered by this call are removed again and the
    /// error is returned.
    pub fn register(&self) -> Result<(), RegistryError> {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        if *registered {
            return Ok(());
        }

        let metrics = self.gauges.metrics();
        let mut inserted: Vec<String> = Vec::with_capacity(metrics.len());
        for (name, metric) in metrics {
            if let Err(err) = self.registry.register(name.clone(), metric) {
                log::warn!("[RuntimeTelemetry] Could not register gauges: {}", err);
                for name in &inserted {
                    self.registry.remove(name);
                }
                return Err(err);
            }
            inserted.push(name);
        }

        log::debug!(
            "[RuntimeTelemetry] Registered {} gauges under `{}`",
            inserted.len(),
            self.config.base
        );
        *registered = true;
        Ok(())
    }

    /// Removes the gauge sets from the registry.
    ///
    /// Garbage collection metrics stay where they are.
    pub fn unregister(&self) {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        if !*registered {
            return;
        }
        remove_all(&self.registry, &*self.gauges);
        log::debug!("[RuntimeTelemetry] Unregistered gauges under `{}`", self.config.base);
        *registered = false;
    }

    /// Whether the gauge sets are currently registered.
    pub fn is_registered(&self) -> bool {
        *self.registered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The garbage collection metrics.
    pub fn gc(&self) -> &Arc<GcMemoryMetrics> {
        &self.gc
    }

    /// The registry metrics are published into.
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// The configuration.
    pub fn config(&self) -> &RuntimeTelemetryConfig {
        &self.config
    }

    /// Names and metrics of the gauge sets, whether registered or not.
    pub fn gauges(&self) -> BTreeMap<String, Metric> {
        self.gauges.metrics()
    }

    /// Reads the current value of every metric in the registry.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }
}

impl fmt::Debug for RuntimeTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeTelemetry")
            .field("config", &self.config)
            .field("gc", &self.gc)
            .field("registered", &self.is_registered())
            .finish()
    }
}

fn build_gauge_sets(
    config: &RuntimeTelemetryConfig,
    gc: &Arc<GcMemoryMetrics>,
    collectors: &[String],
) -> impl MetricSet {
    let mut namespaces: Vec<Box<dyn MetricSet>> = Vec::new();

    if config.collect_gc {
        let set = sets::GarbageCollectorGaugeSet::new(gc.clone(), collectors);
        namespaces.push(Box::new(prefix("gc.", set)));
    }

    #[cfg(feature = "memory")]
    if config.collect_memory {
        namespaces.push(Box::new(prefix(
            "mem.",
            combine([
                Box::new(sets::MemoryUsageGaugeSet::new()) as Box<dyn MetricSet>,
                Box::new(sets::MemoryFreeGaugeSet::new()),
            ]),
        )));
    }

    #[cfg(feature = "process")]
    if config.collect_process {
        namespaces.push(Box::new(prefix("thread.", sets::ThreadStatesGaugeSet::new())));
        namespaces.push(Box::new(prefix("fd.", sets::FileDescriptorGaugeSet::new())));
        namespaces.push(Box::new(prefix("cpu.", sets::CpuLoadGauge::new())));
        namespaces.push(Box::new(sets::UptimeGauge::new()));
    }

    #[cfg(all(feature = "jemalloc", unix))]
    if config.collect_allocator {
        namespaces.push(Box::new(prefix("nmt.", sets::AllocatorGaugeSet::new())));
    }

    for (namespace, set) in &config.custom_sets {
        namespaces.push(Box::new(prefix(format!("{}.", namespace), set.clone())));
    }

    combine_and_prefix(format!("{}.", config.base), namespaces)
}

#[cfg(test)]
mod tests {
    use runtime_telemetry_gc::HostRuntime;

    use super::*;

    #[test]
    fn test_nothing_is_registered_before_register() {
        let registry = Arc::new(MetricRegistry::new());
        let telemetry = RuntimeTelemetry::default_config(registry.clone(), &HostRuntime::new());

        assert!(registry.is_empty());
        assert!(!telemetry.is_registered());
        assert!(!telemetry.gauges().is_empty());
        assert_eq!(telemetry.gc().prefix(), "runtime.gc-mem");
    }

    #[test]
    fn test_disabled_namespaces_are_left_out() {
        let telemetry = RuntimeTelemetry::new(
            Arc::new(MetricRegistry::new()),
            RuntimeTelemetryConfig::new()
                .with_memory_metrics(false)
                .with_process_metrics(false)
                .with_allocator_metrics(false)
                .with_collector_metrics(false),
            &HostRuntime::new(),
        );
        assert!(telemetry.gauges().is_empty());
        telemetry.register().unwrap();
        assert!(telemetry.registry().is_empty());
    }
}
