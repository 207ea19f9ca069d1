//! Duration distributions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::meter::{Clock, Meter, SystemClock};

/// Number of most recent samples a [`Timer`] keeps for its distribution.
pub const WINDOW_SIZE: usize = 1028;

/// Records durations and reports their rate and distribution.
///
/// Durations are stored as signed nanoseconds, so values reported by an
/// external source are kept verbatim even when they are negative.
pub struct Timer {
    meter: Meter,
    window: Mutex<VecDeque<i64>>,
}

impl Timer {
    /// Creates a timer using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a timer whose rate is measured against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            meter: Meter::with_clock(clock),
            window: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
        }
    }

    /// Records a duration.
    pub fn update(&self, duration: Duration) {
        self.update_nanos(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX));
    }

    /// Records a duration given in nanoseconds.
    pub fn update_nanos(&self, nanos: i64) {
        {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            if window.len() == WINDOW_SIZE {
                window.pop_front();
            }
            window.push_back(nanos);
        }
        self.meter.mark();
    }

    /// Runs `f` and records how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let rv = f();
        self.update(start.elapsed());
        rv
    }

    /// Number of recorded durations.
    pub fn count(&self) -> u64 {
        self.meter.count()
    }

    /// The rate at which durations are recorded.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// A sorted copy of the current sample window.
    pub fn distribution(&self) -> Distribution {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        Distribution::new(window.iter().copied().collect())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// A statistical view over a set of nanosecond samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Distribution {
    values: Vec<i64>,
}

impl Distribution {
    /// Builds a distribution from unsorted samples.
    pub fn new(mut values: Vec<i64>) -> Self {
        values.sort_unstable();
        Self { values }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Smallest sample, or `0` when empty.
    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or(0)
    }

    /// Largest sample, or `0` when empty.
    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or(0)
    }

    /// Arithmetic mean, or `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|v| *v as f64).sum::<f64>() / self.values.len() as f64
    }

    /// Sample standard deviation, or `0.0` with fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum: f64 = self
            .values
            .iter()
            .map(|v| {
                let diff = *v as f64 - mean;
                diff * diff
            })
            .sum();
        (sum / (self.values.len() - 1) as f64).sqrt()
    }

    /// The value at `quantile` (in `[0, 1]`), interpolating between samples.
    pub fn value(&self, quantile: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let quantile = quantile.clamp(0.0, 1.0);
        let pos = quantile * (self.values.len() + 1) as f64;
        let index = pos as usize;
        if index < 1 {
            return self.values[0] as f64;
        }
        if index >= self.values.len() {
            return self.values[self.values.len() - 1] as f64;
        }
        let lower = self.values[index - 1] as f64;
        let upper = self.values[index] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }

    /// The median.
    pub fn median(&self) -> f64 {
        self.value(0.5)
    }

    /// The sorted samples.
    pub fn values(&self) -> &[i64] {
        &self.values
    }
}
