//! Environment abstraction for deterministic testing.
//!
//! The engine never reads the clock or sleeps directly. Production uses the
//! system clock and tokio timers; the simulation harness substitutes a
//! virtual clock so rate-limit backoff and timestamp rendering can be
//! asserted without waiting.

use std::time::Duration;

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock_secs()` is Unix seconds in UTC
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code (rate-limit retries, shutdown grace) sleeps;
    /// translation logic never does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Current wall-clock time as Unix seconds.
    ///
    /// Compared against event timestamps to decide whether a header shows
    /// the original send time.
    fn wall_clock_secs(&self) -> i64;
}
