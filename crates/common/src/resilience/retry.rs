//! Bounded retry with exponential backoff
//!
//! [`RetryExecutor::with_retry`] runs an operation up to `max_retries` times.
//! Between attempts it sleeps `delay * 2^(attempt - 1)` (or a constant
//! `delay` when backoff is off) on the tokio timer, so a waiting retry never
//! blocks other tasks on the same worker.
//!
//! Every call registers its own tracker under `(key, sequence)`. Calls that
//! share a key therefore never share attempt counts. The tracker is removed
//! when the sequence ends, whether it succeeded, ran out of attempts, or the
//! calling future was dropped.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::utils::duration_millis;

/// Options for a retry sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Total number of attempts, including the first
    pub max_retries: u32,
    /// Base delay between attempts
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub delay: Duration,
    /// Double the delay after every failed attempt
    pub backoff: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { max_retries: 3, delay: Duration::from_millis(1000), backoff: true }
    }
}

impl RetryOptions {
    /// Create an options builder
    #[must_use]
    pub fn builder() -> RetryOptionsBuilder {
        RetryOptionsBuilder::default()
    }

    /// Validate the options
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `max_retries` is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("retry.max_retries", "must be greater than 0"));
        }
        Ok(())
    }

    /// Backoff strategy these options describe
    #[must_use]
    pub const fn strategy(&self) -> BackoffStrategy {
        if self.backoff {
            BackoffStrategy::Exponential(self.delay)
        } else {
            BackoffStrategy::Fixed(self.delay)
        }
    }
}

/// Builder for [`RetryOptions`]
#[derive(Debug, Default)]
pub struct RetryOptionsBuilder {
    options: RetryOptions,
}

impl RetryOptionsBuilder {
    /// Set the attempt ceiling
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    /// Set the base delay
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.options.delay = delay;
        self
    }

    /// Enable or disable exponential backoff
    #[must_use]
    pub fn backoff(mut self, backoff: bool) -> Self {
        self.options.backoff = backoff;
        self
    }

    /// Validate and return the options
    ///
    /// # Errors
    /// Propagates [`RetryOptions::validate`].
    pub fn build(self) -> ConfigResult<RetryOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay after every failure
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`
    Exponential(Duration),
}

impl BackoffStrategy {
    /// Delay to wait after the `attempt`-th failure (1-based)
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential(base) => {
                let exponent = attempt.saturating_sub(1).min(31);
                base.saturating_mul(1_u32 << exponent)
            }
        }
    }
}

/// In-flight retry sequence, as reported by [`RetryExecutor::active_trackers`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTrackerSnapshot {
    /// Caller-supplied operation key
    pub key: String,
    /// Failed attempts so far
    pub attempts: u32,
    /// Time since the first failure
    pub age: Duration,
}

#[derive(Debug, Clone, Copy)]
struct RetryTracker {
    attempts: u32,
    first_failure: Instant,
}

type TrackerId = (String, u64);
type Trackers = DashMap<TrackerId, RetryTracker>;

/// Removes a sequence's tracker when the sequence ends.
struct TrackerGuard<'a> {
    trackers: &'a Trackers,
    id: TrackerId,
}

impl TrackerGuard<'_> {
    fn record_failure(&self) -> u32 {
        let mut tracker = self
            .trackers
            .entry(self.id.clone())
            .or_insert_with(|| RetryTracker { attempts: 0, first_failure: Instant::now() });
        tracker.attempts += 1;
        tracker.attempts
    }
}

impl Drop for TrackerGuard<'_> {
    fn drop(&mut self) {
        self.trackers.remove(&self.id);
    }
}

/// Runs operations with bounded retries
///
/// Clones share the tracker table.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    trackers: Arc<Trackers>,
    sequence: Arc<AtomicU64>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor").field("active", &self.trackers.len()).finish()
    }
}

impl RetryExecutor {
    /// Create an executor with an empty tracker table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation`, retrying failures until `options.max_retries`
    /// attempts have been made
    ///
    /// # Errors
    /// Returns the last attempt's error unchanged once the ceiling is reached.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn with_retry<F, Fut, T, E>(
        &self,
        key: &str,
        options: &RetryOptions,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let guard = TrackerGuard {
            trackers: &self.trackers,
            id: (key.to_owned(), self.sequence.fetch_add(1, Ordering::Relaxed)),
        };
        let strategy = options.strategy();

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let attempts = guard.record_failure();
            if attempts >= options.max_retries {
                warn!(attempts, error = %error, "Retries exhausted");
                return Err(error);
            }

            let delay = strategy.calculate_delay(attempts);
            warn!(
                attempt = attempts,
                max_retries = options.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            debug!(attempt = attempts + 1, "Retrying operation");
        }
    }

    /// Retry sequences currently waiting between attempts
    pub fn active_trackers(&self) -> Vec<RetryTrackerSnapshot> {
        self.trackers
            .iter()
            .map(|entry| RetryTrackerSnapshot {
                key: entry.key().0.clone(),
                attempts: entry.value().attempts,
                age: entry.value().first_failure.elapsed(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for retry
    //!
    //! Timing assertions run on a paused tokio clock.

    use std::sync::atomic::AtomicU32;

    use tokio::time::Instant as TokioInstant;

    use super::*;

    #[derive(Debug, thiserror::Error, PartialEq, Eq)]
    #[error("attempt {0} failed")]
    struct Flaky(u32);

    fn options(max: u32, delay_ms: u64, backoff: bool) -> RetryOptions {
        RetryOptions::builder()
            .max_retries(max)
            .delay(Duration::from_millis(delay_ms))
            .backoff(backoff)
            .build()
            .expect("valid options")
    }

    #[test]
    fn exponential_delays_double() {
        let strategy = BackoffStrategy::Exponential(Duration::from_millis(100));
        let delays: Vec<u64> =
            (1..=4).map(|n| strategy.calculate_delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        assert_eq!(
            BackoffStrategy::Fixed(Duration::from_millis(50)).calculate_delay(7),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn zero_max_retries_rejected() {
        assert!(RetryOptions::builder().max_retries(0).build().is_err());
        assert_eq!(
            RetryOptions::default().strategy(),
            BackoffStrategy::Exponential(Duration::from_secs(1))
        );
    }

    /// Validates attempt count, spacing, and error transparency.
    ///
    /// Assertions:
    /// - Confirms exactly three attempts.
    /// - Confirms the waits are 100 ms and 200 ms.
    /// - Ensures the last attempt's error is returned unchanged.
    /// - Ensures no tracker survives the sequence.
    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries_with_backoff() {
        let executor = RetryExecutor::new();
        let calls = AtomicU32::new(0);
        let stamps = parking_lot::Mutex::new(Vec::new());
        let start = TokioInstant::now();

        let result: Result<(), Flaky> = executor
            .with_retry("fetch", &options(3, 100, true), || {
                stamps.lock().push(start.elapsed().as_millis());
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(Flaky(n)) }
            })
            .await;

        assert_eq!(result, Err(Flaky(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*stamps.lock(), vec![0, 100, 300]);
        assert!(executor.active_trackers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_without_backoff() {
        let executor = RetryExecutor::new();
        let start = TokioInstant::now();
        let _: Result<(), Flaky> =
            executor.with_retry("k", &options(4, 50, false), || async { Err(Flaky(0)) }).await;
        assert_eq!(start.elapsed().as_millis(), 150);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let executor = RetryExecutor::new();
        let calls = AtomicU32::new(0);

        let result = executor
            .with_retry("k", &options(3, 10, true), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err(Flaky(n)) } else { Ok(n) } }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert!(executor.active_trackers().is_empty());
    }

    /// Validates that concurrent sequences on one key keep separate counts.
    ///
    /// Assertions:
    /// - Confirms two trackers exist for the same key mid-flight.
    /// - Confirms each sequence runs its own three attempts.
    #[tokio::test(start_paused = true)]
    async fn concurrent_sequences_are_isolated() {
        let executor = RetryExecutor::new();
        let opts = options(3, 100, true);
        let first_calls = AtomicU32::new(0);
        let second_calls = AtomicU32::new(0);

        let first = executor.with_retry("shared", &opts, || {
            first_calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Flaky(1)) }
        });
        let second = executor.with_retry("shared", &opts, || {
            second_calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Flaky(2)) }
        });
        let probe = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            executor.active_trackers()
        };

        let (a, b, snapshot) = tokio::join!(first, second, probe);
        assert!(a.is_err() && b.is_err());
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|t| t.key == "shared" && t.attempts == 1));
        assert_eq!(first_calls.load(Ordering::SeqCst), 3);
        assert_eq!(second_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sequence_releases_tracker() {
        let executor = RetryExecutor::new();
        let opts = options(5, 1000, true);
        let pending = executor.with_retry("k", &opts, || async { Err::<(), _>(Flaky(0)) });

        let outcome = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(outcome.is_err());
        assert!(executor.active_trackers().is_empty());
    }
}
