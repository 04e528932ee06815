//! Fallback and deadline helpers
//!
//! Both are free functions over futures. They hold no state and can be
//! freely combined with the breaker, the limiter, and retries.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{instrument, warn};

use super::{ResilienceError, ResilienceResult};

/// Run `primary`; if it fails, run `fallback` and return its outcome
///
/// The primary error is logged and discarded. A fallback error propagates
/// unwrapped.
///
/// # Errors
/// Returns the fallback's error when both operations fail.
#[instrument(skip_all)]
pub async fn with_fallback<P, PFut, F, FFut, T, E>(primary: P, fallback: F) -> Result<T, E>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E>>,
    F: FnOnce() -> FFut,
    FFut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    match primary().await {
        Ok(value) => Ok(value),
        Err(error) => {
            warn!(error = %error, "Primary operation failed, using fallback");
            fallback().await
        }
    }
}

/// Race `operation` against a `timeout` deadline
///
/// When the deadline wins, the operation's future is dropped, cancelling it at
/// its next suspension point. Its late result is never observed.
///
/// # Errors
/// - [`ResilienceError::TimedOut`] if the deadline elapses first.
/// - [`ResilienceError::OperationFailed`] if the operation fails in time.
#[instrument(skip(operation), fields(timeout_ms = %timeout.as_millis()))]
pub async fn with_timeout<Fut, T, E>(operation: Fut, timeout: Duration) -> ResilienceResult<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ResilienceError::OperationFailed { source: error }),
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(timeout_ms, "Operation timed out");
            Err(ResilienceError::TimedOut { timeout_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::error::{AppError, ErrorKind};

    #[tokio::test]
    async fn fallback_value_replaces_primary_failure() {
        let result = with_fallback(
            || async { Err::<&str, _>(AppError::external_service("search", None)) },
            || async { Ok("cached") },
        )
        .await;
        assert_eq!(result.expect("fallback succeeds"), "cached");
    }

    #[tokio::test]
    async fn fallback_not_run_when_primary_succeeds() {
        let ran = AtomicBool::new(false);
        let result = with_fallback(
            || async { Ok::<_, AppError>(1) },
            || async {
                ran.store(true, Ordering::SeqCst);
                Ok(2)
            },
        )
        .await;
        assert_eq!(result.expect("primary succeeds"), 1);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fallback_error_propagates_unwrapped() {
        let result: Result<(), AppError> = with_fallback(
            || async { Err(AppError::internal("primary")) },
            || async { Err(AppError::not_found("Backup")) },
        )
        .await;
        let error = result.expect_err("both fail");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    /// Validates that the deadline wins over a slower operation.
    ///
    /// Assertions:
    /// - Confirms a TIMED_OUT error.
    /// - Confirms it fires at 100 ms rather than 500 ms.
    #[tokio::test(start_paused = true)]
    async fn timeout_fires_before_slow_operation() {
        let start = Instant::now();
        let result: ResilienceResult<(), AppError> = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            },
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(ResilienceError::TimedOut { timeout_ms: 100 })));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operation_beats_deadline() {
        let result: ResilienceResult<u8, AppError> = with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(9)
            },
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(result.expect("in time"), 9);
    }

    #[tokio::test]
    async fn operation_error_is_wrapped_not_masked() {
        let result: ResilienceResult<(), AppError> =
            with_timeout(async { Err(AppError::not_found("Row")) }, Duration::from_secs(1)).await;
        let source = result.expect_err("fails").into_operation_error().expect("operation error");
        assert_eq!(source.status_code(), 404);
    }
}
