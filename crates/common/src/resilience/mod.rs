//! Resilience patterns for a single request-serving process
//!
//! - **Circuit breaker**: stops calling a failing operation for a cooldown
//!   period so failures do not cascade
//! - **Rate limiter**: fixed-window admission counter keyed by caller identity
//! - **Retry executor**: bounded retries with exponential backoff, isolated
//!   per call
//! - **Recovery**: fallback to a secondary operation and deadline racing
//!
//! None of the primitives depends on another. They compose only through the
//! calling layer, which decides what to wrap and in which order.
//!
//! All state is in-memory and process-local. Every primitive is `Send + Sync`
//! and cheap to clone, so a single instance can be shared across tasks.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod recovery;
pub mod retry;

use thiserror::Error;

use crate::error::{AppError, ErrorKind};

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState,
};
pub use rate_limiter::{RateLimitDecision, RateLimiter, RateLimiterConfig, RateLimiterConfigBuilder};
pub use recovery::{with_fallback, with_timeout};
pub use retry::{
    BackoffStrategy, RetryExecutor, RetryOptions, RetryOptionsBuilder, RetryTrackerSnapshot,
};

/// Errors originating inside the resilience primitives.
///
/// The operation's own error is carried unchanged in
/// [`ResilienceError::OperationFailed`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + 'static,
{
    /// The circuit breaker rejected the call without running it.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// The operation did not finish before its deadline.
    #[error("Operation timed out after {timeout_ms}ms")]
    TimedOut {
        /// Deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The operation ran and failed.
    #[error("Operation failed: {source}")]
    OperationFailed {
        /// The operation's own error.
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + 'static,
{
    /// Whether this is a circuit-open rejection.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Whether the deadline elapsed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// The operation's error, if the operation ran and failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }

    /// Classification for logging and response mapping.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen => ErrorKind::CircuitOpen,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::OperationFailed { source } => {
                let source: &(dyn std::error::Error + 'static) = source;
                source.downcast_ref::<AppError>().map_or(ErrorKind::Internal, AppError::kind)
            }
        }
    }
}

/// Result type for operations guarded by a resilience primitive.
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

impl<E> From<ResilienceError<E>> for AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: ResilienceError<E>) -> Self {
        match error {
            ResilienceError::CircuitOpen => {
                Self::new(ErrorKind::CircuitOpen, "Service temporarily unavailable")
            }
            ResilienceError::TimedOut { timeout_ms } => {
                Self::new(ErrorKind::TimedOut, format!("Operation timed out after {timeout_ms}ms"))
            }
            ResilienceError::OperationFailed { source } => {
                let as_dyn: &(dyn std::error::Error + 'static) = &source;
                match as_dyn.downcast_ref::<Self>() {
                    Some(app) => app.clone(),
                    None => Self::internal(source.to_string()).with_source(source),
                }
            }
        }
    }
}
