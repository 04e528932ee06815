//! Circuit breaker guarding a single operation
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                        │
//!     │ successes >= success_threshold         │ now - last_failure > open_timeout
//!     │                                        ▼
//!     └──────────────────────────────────── HALF_OPEN
//!                      any failure ─────────▶ OPEN
//! ```
//!
//! The whole state (`state`, both consecutive counters and the last failure
//! instant) sits behind one mutex, so every check-and-transition is a single
//! critical section. The lock is never held while the guarded operation runs.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{ResilienceError, ResilienceResult};
use crate::error::{ConfigError, ConfigResult};
use crate::time::{Clock, SystemClock};
use crate::utils::duration_millis;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, calls run
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is probing whether the operation recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED that open the circuit
    pub failure_threshold: u32,
    /// Cool-down before an OPEN circuit admits a probe call
    #[serde(rename = "open_timeout_ms", with = "duration_millis")]
    pub open_timeout: Duration,
    /// Consecutive successes in HALF_OPEN that close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, open_timeout: Duration::from_secs(60), success_threshold: 3 }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when a threshold is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold",
                "must be greater than 0",
            ));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.success_threshold",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Start from the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    #[must_use]
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the open-state cool-down
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    /// Set the half-open success threshold
    #[must_use]
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    /// Propagates [`CircuitBreakerConfig::validate`].
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures counted toward opening
    pub consecutive_failures: u32,
    /// Consecutive successes counted toward closing
    pub consecutive_successes: u32,
    /// Calls admitted and run
    pub total_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    /// Wall-clock time of the most recent failure
    pub last_failure_time: Option<SystemTime>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    last_failure_time: Option<SystemTime>,
}

impl BreakerState {
    const fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
            last_failure_time: None,
        }
    }
}

/// Circuit breaker for one guarded operation
///
/// Clones share state, so a breaker can be handed to every task that calls
/// the same dependency.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .field("consecutive_successes", &inner.consecutive_successes)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            total_calls: Arc::clone(&self.total_calls),
            rejected_calls: Arc::clone(&self.rejected_calls),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a circuit breaker on the system clock
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::from_valid(CircuitBreakerConfig::default(), SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock (useful for testing)
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::from_valid(config, clock))
    }

    fn from_valid(config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(BreakerState::closed())),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        }
    }

    /// Run `operation` if the circuit admits it
    ///
    /// # Errors
    /// - [`ResilienceError::CircuitOpen`] when rejected; `operation` is not
    ///   invoked.
    /// - [`ResilienceError::OperationFailed`] carrying the operation's own
    ///   error otherwise.
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        if !self.try_acquire() {
            return Err(ResilienceError::CircuitOpen);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Synchronous counterpart of [`CircuitBreaker::execute`]
    ///
    /// # Errors
    /// Same as [`CircuitBreaker::execute`].
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + 'static,
    {
        if !self.try_acquire() {
            return Err(ResilienceError::CircuitOpen);
        }

        match operation() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Admission decision, moving OPEN to HALF_OPEN once the cool-down elapsed.
    fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let cooled_down = match inner.last_failure {
                Some(at) => now.saturating_duration_since(at) > self.config.open_timeout,
                None => true,
            };
            if !cooled_down {
                drop(inner);
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!("Circuit breaker rejecting call");
                return false;
            }
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
            info!("Circuit breaker half-open, probing");
        }

        drop(inner);
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Record a successful call
    ///
    /// Exposed for callers that guard work they do not run through
    /// [`CircuitBreaker::execute`].
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    let successes = inner.consecutive_successes;
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    info!(successes, "Circuit breaker closed");
                }
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => debug!("Ignoring success while circuit is open"),
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let wall = self.clock.system_time();
        let mut inner = self.inner.lock();

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(now);
        inner.last_failure_time = Some(wall);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(failures = inner.consecutive_failures, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
                warn!("Circuit breaker reopened after failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state
    ///
    /// An OPEN circuit whose cool-down has elapsed still reports OPEN until
    /// the next call probes it.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters and state
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Force the circuit CLOSED and zero its counters
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::closed();
        info!("Circuit breaker manually reset to closed state");
    }

    /// Active configuration
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}
