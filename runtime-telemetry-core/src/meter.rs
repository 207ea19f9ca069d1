//! Event rate estimation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// A source of monotonic time for rate calculations.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Exponentially weighted moving average over a fixed window, in events per second.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn for_minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, count: u64) {
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

#[derive(Debug)]
struct MeterState {
    last_tick: Instant,
    uncounted: u64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    fn tick_if_necessary(&mut self, now: Instant) {
        let age = now.saturating_duration_since(self.last_tick);
        if age < TICK_INTERVAL {
            return;
        }
        let ticks = age.as_nanos() / TICK_INTERVAL.as_nanos();
        self.last_tick += TICK_INTERVAL * ticks as u32;
        for _ in 0..ticks {
            let count = std::mem::take(&mut self.uncounted);
            self.m1.tick(count);
            self.m5.tick(count);
            self.m15.tick(count);
        }
    }
}

/// Counts events and estimates their rate.
///
/// Besides the mean rate since creation, the meter keeps 1, 5 and 15 minute
/// exponentially weighted moving averages which are advanced every 5 seconds.
pub struct Meter {
    clock: Arc<dyn Clock>,
    start: Instant,
    count: AtomicU64,
    state: Mutex<MeterState>,
}

impl Meter {
    /// Creates a meter using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a meter reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            count: AtomicU64::new(0),
            state: Mutex::new(MeterState {
                last_tick: start,
                uncounted: 0,
                m1: Ewma::for_minutes(1.0),
                m5: Ewma::for_minutes(5.0),
                m15: Ewma::for_minutes(15.0),
            }),
        }
    }

    /// Marks the occurrence of one event.
    pub fn mark(&self) {
        self.mark_n(1);
    }

    /// Marks the occurrence of `n` events.
    pub fn mark_n(&self, n: u64) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick_if_necessary(now);
        state.uncounted += n;
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// The number of events marked so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Events per second since the meter was created.
    pub fn mean_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let elapsed = self.clock.now().saturating_duration_since(self.start);
        if elapsed.is_zero() {
            return 0.0;
        }
        count as f64 / elapsed.as_secs_f64()
    }

    /// The one minute moving average rate, in events per second.
    pub fn one_minute_rate(&self) -> f64 {
        self.with_ticked(|state| state.m1.rate)
    }

    /// The five minute moving average rate, in events per second.
    pub fn five_minute_rate(&self) -> f64 {
        self.with_ticked(|state| state.m5.rate)
    }

    /// The fifteen minute moving average rate, in events per second.
    pub fn fifteen_minute_rate(&self) -> f64 {
        self.with_ticked(|state| state.m15.rate)
    }

    fn with_ticked<R>(&self, f: impl FnOnce(&MeterState) -> R) -> R {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick_if_necessary(now);
        f(&state)
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}
