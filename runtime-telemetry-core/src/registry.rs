//! The shared name to metric store.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RegistryError;
use crate::meter::Meter;
use crate::metric::{Counter, DoubleGauge, LongGauge, Metric, MetricKind, TypedMetric};
use crate::sets::MetricSet;
use crate::snapshot::{MetricSnapshot, RegistrySnapshot};
use crate::timer::Timer;

/// A process-wide, internally synchronized store of named metrics.
///
/// Registration is atomic: two threads asking for the same unbound name will
/// always end up with the same metric object.
///
/// ```
/// use runtime_telemetry_core::MetricRegistry;
///
/// let registry = MetricRegistry::new();
/// let a = registry.meter("requests.rate").unwrap();
/// let b = registry.meter("requests.rate").unwrap();
/// a.mark();
/// assert_eq!(b.count(), 1);
/// assert!(registry.timer("requests.rate").is_err());
/// ```
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: RwLock<BTreeMap<String, Metric>>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Metric>> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Metric>> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the metric bound to `name`, registering `factory()` if unbound.
    ///
    /// Fails with [`RegistryError::TypeMismatch`] if the bound metric, or the
    /// one produced by `factory`, is not of `kind`. Nothing is inserted in
    /// that case.
    pub fn get_or_register<F>(
        &self,
        name: &str,
        kind: MetricKind,
        factory: F,
    ) -> Result<Metric, RegistryError>
    where
        F: FnOnce() -> Metric,
    {
        if let Some(existing) = self.read().get(name) {
            return check_kind(name, kind, existing.clone());
        }

        let mut metrics = self.write();
        match metrics.entry(name.to_owned()) {
            // lost the race against another registration
            Entry::Occupied(entry) => check_kind(name, kind, entry.get().clone()),
            Entry::Vacant(entry) => {
                let metric = factory();
                if metric.kind() != kind {
                    return Err(RegistryError::TypeMismatch {
                        name: name.to_owned(),
                        expected: kind,
                        found: metric.kind(),
                    });
                }
                log::debug!("[MetricRegistry] Registered {} `{}`", kind, name);
                Ok(entry.insert(metric).clone())
            }
        }
    }

    /// Typed variant of [`get_or_register`](Self::get_or_register).
    pub fn get_or_create<T, F>(&self, name: &str, factory: F) -> Result<Arc<T>, RegistryError>
    where
        T: TypedMetric,
        F: FnOnce() -> T,
    {
        let metric = self.get_or_register(name, T::KIND, || T::into_metric(Arc::new(factory())))?;
        let found = metric.kind();
        metric.downcast::<T>().ok_or_else(|| RegistryError::TypeMismatch {
            name: name.to_owned(),
            expected: T::KIND,
            found,
        })
    }

    /// Returns the [`Counter`] named `name`, creating it if needed.
    pub fn counter(&self, name: &str) -> Result<Arc<Counter>, RegistryError> {
        self.get_or_create(name, Counter::new)
    }

    /// Returns the [`Meter`] named `name`, creating it if needed.
    pub fn meter(&self, name: &str) -> Result<Arc<Meter>, RegistryError> {
        self.get_or_create(name, Meter::new)
    }

    /// Returns the [`Timer`] named `name`, creating it if needed.
    pub fn timer(&self, name: &str) -> Result<Arc<Timer>, RegistryError> {
        self.get_or_create(name, Timer::new)
    }

    /// Returns the [`LongGauge`] named `name`, creating it if needed.
    pub fn long_gauge(&self, name: &str) -> Result<Arc<LongGauge>, RegistryError> {
        self.get_or_create(name, LongGauge::new)
    }

    /// Returns the [`DoubleGauge`] named `name`, creating it if needed.
    pub fn double_gauge(&self, name: &str) -> Result<Arc<DoubleGauge>, RegistryError> {
        self.get_or_create(name, DoubleGauge::new)
    }

    /// Binds `metric` to `name`, failing if the name is already bound.
    pub fn register(
        &self,
        name: impl Into<String>,
        metric: impl Into<Metric>,
    ) -> Result<Metric, RegistryError> {
        let name = name.into();
        let metric = metric.into();
        let mut metrics = self.write();
        match metrics.entry(name) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                log::debug!("[MetricRegistry] Registered {} `{}`", metric.kind(), entry.key());
                Ok(entry.insert(metric).clone())
            }
        }
    }

    /// Registers every metric of `set`, stopping at the first collision.
    pub fn register_all(&self, set: &dyn MetricSet) -> Result<(), RegistryError> {
        for (name, metric) in set.metrics() {
            self.register(name, metric)?;
        }
        Ok(())
    }

    /// Returns the metric bound to `name`.
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.read().get(name).cloned()
    }

    /// Unbinds `name`, returning whether it was bound.
    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    /// All bound names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of bound names.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Reads the current value of every metric.
    ///
    /// Polled gauges are evaluated after the registry lock is released.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let metrics: Vec<(String, Metric)> = self
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect();
        RegistrySnapshot {
            metrics: metrics
                .into_iter()
                .map(|(name, metric)| (name, MetricSnapshot::of(&metric)))
                .collect(),
        }
    }
}

fn check_kind(name: &str, kind: MetricKind, metric: Metric) -> Result<Metric, RegistryError> {
    if metric.kind() == kind {
        Ok(metric)
    } else {
        Err(RegistryError::TypeMismatch {
            name: name.to_owned(),
            expected: kind,
            found: metric.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Gauge;

    #[test]
    fn test_get_or_register_returns_same_object() {
        let registry = MetricRegistry::new();
        let a = registry
            .get_or_register("a", MetricKind::LongGauge, || LongGauge::new().into())
            .unwrap();
        let b = registry
            .get_or_register("a", MetricKind::LongGauge, || panic!("factory must not run"))
            .unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_type_mismatch_on_existing_name() {
        let registry = MetricRegistry::new();
        registry.meter("gc.rate").unwrap();
        let err = registry.double_gauge("gc.rate").unwrap_err();
        assert_eq!(
            err,
            RegistryError::TypeMismatch {
                name: "gc.rate".into(),
                expected: MetricKind::DoubleGauge,
                found: MetricKind::Meter,
            }
        );
        assert_eq!(err.to_string(), "metric `gc.rate` is a meter, not a double_gauge");
    }

    #[test]
    fn test_factory_of_wrong_kind_inserts_nothing() {
        let registry = MetricRegistry::new();
        let err = registry
            .get_or_register("x", MetricKind::Timer, || Counter::new().into())
            .unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { found: MetricKind::Counter, .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_is_strict() {
        let registry = MetricRegistry::new();
        registry.register("up", Gauge::new(|| 1_i64)).unwrap();
        assert_eq!(
            registry.register("up", Counter::new()).unwrap_err(),
            RegistryError::AlreadyRegistered("up".into())
        );
        assert!(registry.remove("up"));
        assert!(!registry.remove("up"));
        assert!(registry.get("up").is_none());
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = MetricRegistry::new();
        registry.counter("b").unwrap();
        registry.counter("a").unwrap();
        assert_eq!(registry.names(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
