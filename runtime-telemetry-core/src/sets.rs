//! Groups of metrics and name transformations over them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::metric::Metric;
use crate::registry::MetricRegistry;

/// A named group of metrics that can be registered in bulk.
///
/// Implementations are expected to be cheap views: `metrics` may be called
/// repeatedly and should hand out the same metric objects every time.
pub trait MetricSet: Send + Sync {
    /// The metrics of this set, keyed by name.
    fn metrics(&self) -> BTreeMap<String, Metric>;
}

impl MetricSet for BTreeMap<String, Metric> {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.clone()
    }
}

impl<S: MetricSet + ?Sized> MetricSet for Arc<S> {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        (**self).metrics()
    }
}

impl<S: MetricSet + ?Sized> MetricSet for Box<S> {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        (**self).metrics()
    }
}

type NameTransformer = dyn Fn(&str) -> String + Send + Sync;

/// A view over another set with every name rewritten.
///
/// Created by [`transform_names`] and [`prefix`].
pub struct TransformNames<S> {
    inner: S,
    transform: Box<NameTransformer>,
}

impl<S: MetricSet> MetricSet for TransformNames<S> {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        self.inner
            .metrics()
            .into_iter()
            .map(|(name, metric)| ((self.transform)(&name), metric))
            .collect()
    }
}

impl<S> fmt::Debug for TransformNames<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformNames").finish_non_exhaustive()
    }
}

/// The union of several sets.
///
/// Created by [`combine`]. If more than one set has a given name the winner
/// is unspecified.
pub struct Combined {
    sets: Vec<Box<dyn MetricSet>>,
}

impl MetricSet for Combined {
    fn metrics(&self) -> BTreeMap<String, Metric> {
        let mut rv = BTreeMap::new();
        for set in &self.sets {
            rv.extend(set.metrics());
        }
        rv
    }
}

impl fmt::Debug for Combined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combined")
            .field("sets", &self.sets.len())
            .finish()
    }
}

/// Returns a view of `set` with `transform` applied to each name.
pub fn transform_names<S, F>(set: S, transform: F) -> TransformNames<S>
where
    S: MetricSet,
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    TransformNames {
        inner: set,
        transform: Box::new(transform),
    }
}

/// Returns a view of `set` with `prefix` prepended to each name.
///
/// No separator is inserted; include the trailing `.` in `prefix`.
pub fn prefix<S: MetricSet>(prefix: impl Into<String>, set: S) -> TransformNames<S> {
    let prefix = prefix.into();
    transform_names(set, move |name| format!("{}{}", prefix, name))
}

/// Returns the union of `sets`.
pub fn combine<I>(sets: I) -> Combined
where
    I: IntoIterator<Item = Box<dyn MetricSet>>,
{
    Combined {
        sets: sets.into_iter().collect(),
    }
}

/// Combines `sets` and prefixes the resulting names.
pub fn combine_and_prefix<I>(prefix_str: impl Into<String>, sets: I) -> TransformNames<Combined>
where
    I: IntoIterator<Item = Box<dyn MetricSet>>,
{
    prefix(prefix_str, combine(sets))
}

/// Unbinds every name of `set` from `registry`.
pub fn remove_all(registry: &MetricRegistry, set: &dyn MetricSet) {
    for name in set.metrics().keys() {
        registry.remove(name);
    }
}
