//! Virtual clock environment.
//!
//! `sleep` advances the clock by the requested duration and returns after a
//! single scheduler yield, so rate-limit backoff and shutdown grace periods
//! complete instantly while the requested intervals stay observable.

#![allow(clippy::disallowed_types, reason = "Synchronous clock state only")]

use std::{
    ops::Sub,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use forumbridge_core::Environment;

/// Wall-clock time at which a fresh [`SimEnv`] starts (2023-11-14 22:13:20 UTC).
pub const DEFAULT_WALL_CLOCK: i64 = 1_700_000_000;

/// Instant on the virtual clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Debug, Default)]
struct Clock {
    elapsed: Duration,
    wall_start: i64,
    sleeps: Vec<Duration>,
}

/// Deterministic environment for tests.
///
/// Clones share the same clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Clock>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Clock starting at [`DEFAULT_WALL_CLOCK`].
    pub fn new() -> Self {
        Self::at(DEFAULT_WALL_CLOCK)
    }

    /// Clock starting at `wall_clock_secs`.
    pub fn at(wall_clock_secs: i64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(Clock { wall_start: wall_clock_secs, ..Clock::default() })),
        }
    }

    #[allow(clippy::expect_used)]
    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().expect("SimEnv mutex poisoned")
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.clock().elapsed += duration;
    }

    /// Time elapsed since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.clock().elapsed
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.clock().sleeps.clone()
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.clock().elapsed)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        {
            let mut clock = self.clock();
            clock.elapsed += duration;
            clock.sleeps.push(duration);
        }
        tokio::task::yield_now()
    }

    fn wall_clock_secs(&self) -> i64 {
        let clock = self.clock();
        clock.wall_start + clock.elapsed.as_secs() as i64
    }
}
