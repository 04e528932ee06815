//! Time abstraction for testability
//!
//! Every stateful primitive in this crate reads time through [`Clock`], so
//! window expiry, breaker cool-downs and the trailing statistics window can be
//! exercised deterministically without sleeping.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use rampart_common::time::{Clock, MockClock};
//!
//! let mock = MockClock::new();
//! let start = mock.now();
//! mock.advance(Duration::from_secs(5));
//! assert_eq!(mock.now().duration_since(start), Duration::from_secs(5));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Trait for time operations to enable deterministic testing
pub trait Clock: Send + Sync + 'static {
    /// Monotonic time, used for durations and window arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for sample timestamps.
    fn system_time(&self) -> SystemTime;

    /// Wall-clock time as a UTC timestamp.
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }

    /// Milliseconds since the UNIX epoch.
    fn millis_since_epoch(&self) -> u64 {
        u64::try_from(self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis())
            .unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a test can hand one clone to a
/// component and advance another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base_system_time: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current real time.
    #[must_use]
    pub fn new() -> Self {
        Self::at_system_time(SystemTime::now())
    }

    /// Create a mock clock whose wall-clock reading starts at `base`.
    #[must_use]
    pub fn at_system_time(base: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            base_system_time: base,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock without waiting.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance by milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the absolute elapsed time, replacing any previous value.
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Time simulated since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for time::clock.
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();
        assert!(now2 >= now1);
        assert!(clock.millis_since_epoch() > 0);
    }

    /// Validates that cloned mock clocks share elapsed time.
    ///
    /// Assertions:
    /// - Confirms `clock2.elapsed()` equals `Duration::from_secs(15)` after
    ///   advancing the original.
    #[test]
    fn test_mock_clock_clone_shares_elapsed() {
        let clock1 = MockClock::new();
        clock1.advance(Duration::from_secs(10));

        let clock2 = clock1.clone();
        clock1.advance(Duration::from_secs(5));

        assert_eq!(clock2.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn test_mock_clock_pinned_system_time() {
        let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = MockClock::at_system_time(base);
        clock.advance_millis(1500);

        assert_eq!(clock.millis_since_epoch(), 1_700_000_001_500);
        assert_eq!(clock.utc_now().timestamp(), 1_700_000_001);
    }

    #[test]
    fn test_mock_clock_set_elapsed() {
        let clock = MockClock::new();
        let start = clock.now();

        clock.set_elapsed(Duration::from_secs(20));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(20));
    }
}
