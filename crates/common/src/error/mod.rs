//! Error taxonomy shared by the resilience and observability primitives
//!
//! Three kinds of error live here:
//!
//! 1. **[`ErrorKind`]** and **[`AppError`]**: the classification the request
//!    layer assigns to a failure. Only `CircuitOpen` and `TimedOut` originate
//!    inside this crate; every other kind is assigned by the caller and merely
//!    logged and counted here.
//! 2. **[`ConfigError`]**: invalid or unreadable configuration.
//! 3. **[`SinkError`]**: what an alert or logging sink reports on failure. The
//!    crate always swallows it (logging at most) so observability can never
//!    fail the operation it observes.
//!
//! ## Status mapping
//!
//! | Kind | Default status |
//! |------|----------------|
//! | `VALIDATION` | 400 |
//! | `AUTHENTICATION` | 401 |
//! | `AUTHORIZATION` | 403 |
//! | `NOT_FOUND` | 404 |
//! | `RATE_LIMITED` | 429 |
//! | `STORAGE` | 500 |
//! | `EXTERNAL_SERVICE` | 503 |
//! | `CIRCUIT_OPEN` | 503 |
//! | `TIMED_OUT` | 504 |
//! | `INTERNAL` | 500 |

pub mod response;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use response::{ErrorBody, ErrorPayload, ErrorResponse};

/// Result type used by configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for classified application errors.
pub type AppResult<T> = Result<T, AppError>;

/// Shared, cloneable cause attached to an [`AppError`].
pub type SharedSource = Arc<dyn StdError + Send + Sync + 'static>;

/* -------------------------------------------------------------------------- */
/* Error kinds */
/* -------------------------------------------------------------------------- */

/// Classification of a failure, stable across releases for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller supplied invalid input.
    Validation,
    /// Caller is not authenticated.
    Authentication,
    /// Caller lacks permission.
    Authorization,
    /// Requested resource does not exist.
    NotFound,
    /// Caller exceeded its admission quota.
    RateLimited,
    /// Persistence layer failed.
    Storage,
    /// A downstream dependency failed.
    ExternalService,
    /// A circuit breaker rejected the call.
    CircuitOpen,
    /// An operation exceeded its deadline.
    TimedOut,
    /// Anything unclassified.
    Internal,
}

impl ErrorKind {
    /// Stable wire label, e.g. `"CIRCUIT_OPEN"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::Storage => "STORAGE",
            Self::ExternalService => "EXTERNAL_SERVICE",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::TimedOut => "TIMED_OUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status a request layer should answer with for this kind.
    #[must_use]
    pub const fn default_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::RateLimited => 429,
            Self::Storage | Self::Internal => 500,
            Self::ExternalService | Self::CircuitOpen => 503,
            Self::TimedOut => 504,
        }
    }

    /// Whether a failure of this kind is transient.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ExternalService | Self::CircuitOpen | Self::TimedOut
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* -------------------------------------------------------------------------- */
/* Classified application error */
/* -------------------------------------------------------------------------- */

/// A failure classified by the request layer.
///
/// Constructors mirror the error classes request handlers raise; each picks
/// the kind's default status. Use [`AppError::with_status`] to override it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    status_code: u16,
    details: Option<Value>,
    #[source]
    source: Option<SharedSource>,
}

impl AppError {
    /// Create an error of `kind` with its default status.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: kind.default_status(),
            details: None,
            source: None,
        }
    }

    /// Invalid input, optionally with field-level details.
    pub fn validation(message: impl Into<String>, details: Option<Value>) -> Self {
        let mut error = Self::new(ErrorKind::Validation, message);
        error.details = details;
        error
    }

    /// Missing or invalid credentials.
    pub fn authentication(message: Option<&str>) -> Self {
        Self::new(ErrorKind::Authentication, message.unwrap_or("Authentication required"))
    }

    /// Authenticated but not permitted.
    pub fn authorization(message: Option<&str>) -> Self {
        Self::new(ErrorKind::Authorization, message.unwrap_or("Insufficient permissions"))
    }

    /// `"<resource> not found"`.
    pub fn not_found(resource: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("{resource} not found"))
    }

    /// Quota exceeded; `retry_after` lands in the details as whole seconds.
    pub fn rate_limited(retry_after: Duration) -> Self {
        let mut error = Self::new(ErrorKind::RateLimited, "Too many requests");
        error.details = Some(json!({ "retryAfter": retry_after.as_secs() }));
        error
    }

    /// Persistence failure.
    pub fn storage(message: impl Into<String>, details: Option<Value>) -> Self {
        let mut error = Self::new(ErrorKind::Storage, message);
        error.details = details;
        error
    }

    /// `"External service error: <service>"`.
    pub fn external_service(service: &str, details: Option<Value>) -> Self {
        let mut error =
            Self::new(ErrorKind::ExternalService, format!("External service error: {service}"));
        error.details = details;
        error
    }

    /// Unclassified failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Override the status code.
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status the request layer should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Structured details, if any.
    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Whether the error should alert an operator (`status >= 500`).
    #[must_use]
    pub fn is_severe(&self) -> bool {
        self.status_code >= 500
    }
}

/* -------------------------------------------------------------------------- */
/* Configuration errors */
/* -------------------------------------------------------------------------- */

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: &'static str, message: String },

    /// A configuration file could not be parsed.
    #[error("Failed to parse {format} configuration: {message}")]
    Parse { format: &'static str, message: String },

    /// A configuration file could not be read.
    #[error("Failed to read configuration file {path}: {message}")]
    Io { path: String, message: String },

    /// An environment override could not be parsed.
    #[error("Invalid value for environment variable {var}: {message}")]
    Env { var: &'static str, message: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { field, message: message.into() }
    }
}

/* -------------------------------------------------------------------------- */
/* Sink errors */
/* -------------------------------------------------------------------------- */

/// Failure reported by an alerting or logging sink.
#[derive(Debug, Clone, Error)]
#[error("Sink '{sink}' failed: {message}")]
pub struct SinkError {
    /// Sink name, for the log line that swallows the error.
    pub sink: String,
    /// What went wrong.
    pub message: String,
}

impl SinkError {
    /// Create a sink error.
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self { sink: sink.into(), message: message.into() }
    }
}

/* -------------------------------------------------------------------------- */
/* Helpers */
/* -------------------------------------------------------------------------- */

/// Render the `source()` chain below `error`, one cause per line.
///
/// Returns `None` when the error has no cause.
#[must_use]
pub fn render_source_chain(error: &(dyn StdError + 'static)) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {cause}"));
        current = cause.source();
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error.
    use super::*;

    /// Validates default status codes per kind.
    ///
    /// Assertions:
    /// - Confirms each constructor carries the kind's default status.
    #[test]
    fn constructors_use_default_status() {
        assert_eq!(AppError::validation("bad", None).status_code(), 400);
        assert_eq!(AppError::authentication(None).status_code(), 401);
        assert_eq!(AppError::authorization(None).status_code(), 403);
        assert_eq!(AppError::not_found("Post").status_code(), 404);
        assert_eq!(AppError::rate_limited(Duration::from_secs(60)).status_code(), 429);
        assert_eq!(AppError::storage("down", None).status_code(), 500);
        assert_eq!(AppError::external_service("mailer", None).status_code(), 503);
        assert_eq!(AppError::internal("boom").status_code(), 500);
        assert_eq!(ErrorKind::CircuitOpen.default_status(), 503);
        assert_eq!(ErrorKind::TimedOut.default_status(), 504);
    }

    #[test]
    fn constructor_messages() {
        assert_eq!(AppError::authentication(None).message(), "Authentication required");
        assert_eq!(AppError::authorization(None).message(), "Insufficient permissions");
        assert_eq!(AppError::not_found("Expert").to_string(), "Expert not found");
        assert_eq!(
            AppError::external_service("storage-bucket", None).to_string(),
            "External service error: storage-bucket"
        );
    }

    #[test]
    fn rate_limited_carries_retry_after_details() {
        let error = AppError::rate_limited(Duration::from_secs(30));
        assert_eq!(error.kind(), ErrorKind::RateLimited);
        assert_eq!(error.details(), Some(&json!({ "retryAfter": 30 })));
    }

    #[test]
    fn kind_serializes_screaming_snake_case() {
        let value = serde_json::to_value(ErrorKind::ExternalService).expect("serialize kind");
        assert_eq!(value, json!("EXTERNAL_SERVICE"));
        assert_eq!(ErrorKind::CircuitOpen.to_string(), "CIRCUIT_OPEN");
    }

    /// Validates that the cause chain renders below the top-level error.
    ///
    /// Assertions:
    /// - Confirms the chain contains the io error text.
    /// - Ensures an error with no cause renders `None`.
    #[test]
    fn source_chain_renders_causes() {
        let io = std::io::Error::other("disk full");
        let error = AppError::storage("write failed", None).with_source(io);

        let chain = render_source_chain(&error).expect("chain present");
        assert_eq!(chain, "caused by: disk full");
        assert!(render_source_chain(&AppError::internal("x")).is_none());
    }

    #[test]
    fn severity_and_retryability() {
        assert!(AppError::internal("x").is_severe());
        assert!(!AppError::not_found("x").is_severe());
        assert!(ErrorKind::TimedOut.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
    }
}
