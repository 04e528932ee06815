//! Resilience and observability primitives for a single request-serving
//! process.
//!
//! # Modules
//!
//! - [`resilience`]: circuit breaker, fixed-window rate limiter, retry with
//!   backoff, fallback and timeout
//! - [`observability`]: performance monitor, error logger, alerts, health
//!   report, `tracing` subscriber setup
//! - [`error`]: the classified application error and its HTTP body
//! - [`config`]: file and environment configuration for all of the above
//! - [`time`]: the clock abstraction every time-dependent primitive is
//!   generic over
//!
//! All state is in-memory. Nothing is shared between processes.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod collections;
pub mod config;
pub mod error;
pub mod observability;
pub mod resilience;
pub mod time;
pub mod utils;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use config::RampartConfig;
pub use error::{AppError, AppResult, ConfigError, ConfigResult, ErrorKind, ErrorResponse};
pub use observability::{
    init_tracing, Alert, AlertSink, ErrorLogger, HealthReport, PerformanceMonitor,
    PerformanceStats, RequestContext, RequestRecord,
};
pub use resilience::{
    with_fallback, with_timeout, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    RateLimitDecision, RateLimiter, RateLimiterConfig, ResilienceError, ResilienceResult,
    RetryExecutor, RetryOptions,
};
pub use time::{Clock, MockClock, SystemClock};
pub use utils::serde::duration_millis;
