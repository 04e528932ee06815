//! Bounded log of classified errors
//!
//! [`ErrorLogger::log`] turns any error into an [`ErrorLogEntry`], keeps the
//! most recent entries in a ring buffer, forwards every entry to an
//! [`ErrorSink`] and raises an [`Alert::SevereError`] for status `>= 500`.
//! Sink failures are logged and dropped.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use super::alerts::{self, Alert, SharedAlertSink, TracingAlertSink};
use crate::collections::RingBuffer;
use crate::error::{render_source_chain, AppError, ConfigError, ConfigResult, ErrorKind, SinkError};
use crate::time::{Clock, SystemClock};

/// Configuration for [`ErrorLogger`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogConfig {
    /// Entries kept in memory
    pub capacity: usize,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

impl ErrorLogConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for a zero capacity.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("error_log.capacity", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Request the error happened in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Authenticated user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Client address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Client user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Context for `method url`
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self { url: url.into(), method: method.into(), ..Self::default() }
    }

    /// Attach the user id
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the client address
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attach the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// One logged error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    /// Unique entry id
    pub id: Uuid,
    /// When the error was logged
    pub timestamp: DateTime<Utc>,
    /// Classification
    pub code: ErrorKind,
    /// Error message
    pub message: String,
    /// Status the request was answered with
    pub status_code: u16,
    /// Structured details from the classified error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Rendered cause chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Request the error happened in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
}

impl ErrorLogEntry {
    /// Whether this entry is alert-worthy
    #[must_use]
    pub const fn is_severe(&self) -> bool {
        self.status_code >= 500
    }
}

/// Destination for every logged entry
pub trait ErrorSink: Send + Sync {
    /// Record one entry
    ///
    /// # Errors
    /// Returns [`SinkError`] when recording failed. The logger drops it.
    fn record(&self, entry: &ErrorLogEntry) -> Result<(), SinkError>;
}

impl<F> ErrorSink for F
where
    F: Fn(&ErrorLogEntry) -> Result<(), SinkError> + Send + Sync,
{
    fn record(&self, entry: &ErrorLogEntry) -> Result<(), SinkError> {
        self(entry)
    }
}

/// Writes entries as `tracing` events under the `rampart::errors` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn record(&self, entry: &ErrorLogEntry) -> Result<(), SinkError> {
        let url = entry.context.as_ref().map_or("", |ctx| ctx.url.as_str());
        let method = entry.context.as_ref().map_or("", |ctx| ctx.method.as_str());
        if entry.is_severe() {
            error!(
                target: "rampart::errors",
                id = %entry.id,
                code = %entry.code,
                status = entry.status_code,
                method,
                url,
                stack_trace = entry.stack_trace.as_deref(),
                "{}", entry.message
            );
        } else {
            warn!(
                target: "rampart::errors",
                id = %entry.id,
                code = %entry.code,
                status = entry.status_code,
                method,
                url,
                "{}", entry.message
            );
        }
        Ok(())
    }
}

/// Bounded, shareable error log
///
/// Clones share the buffer and sinks. Construct one per process and pass it
/// to every handler.
pub struct ErrorLogger<C: Clock = SystemClock> {
    buffer: Arc<Mutex<RingBuffer<ErrorLogEntry>>>,
    log_sink: Arc<dyn ErrorSink>,
    alert_sink: SharedAlertSink,
    clock: Arc<C>,
}

impl<C: Clock> Clone for ErrorLogger<C> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            log_sink: Arc::clone(&self.log_sink),
            alert_sink: Arc::clone(&self.alert_sink),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> fmt::Debug for ErrorLogger<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.buffer.lock();
        f.debug_struct("ErrorLogger")
            .field("len", &buffer.len())
            .field("capacity", &buffer.capacity())
            .finish_non_exhaustive()
    }
}

impl ErrorLogger<SystemClock> {
    /// Create a logger on the system clock with tracing sinks
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: &ErrorLogConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> ErrorLogger<C> {
    /// Create a logger with a custom clock
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_clock(config: &ErrorLogConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            buffer: Arc::new(Mutex::new(RingBuffer::new(config.capacity))),
            log_sink: Arc::new(TracingErrorSink),
            alert_sink: Arc::new(TracingAlertSink),
            clock: Arc::new(clock),
        })
    }

    /// Replace the logging sink
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Replace the alerting sink
    #[must_use]
    pub fn with_alert_sink(mut self, sink: SharedAlertSink) -> Self {
        self.alert_sink = sink;
        self
    }

    /// Record `error`
    ///
    /// An [`AppError`] keeps its classification; anything else is logged as
    /// `INTERNAL` with status 500. Returns the stored entry.
    pub fn log(
        &self,
        error: &(dyn StdError + 'static),
        context: Option<RequestContext>,
    ) -> ErrorLogEntry {
        let (code, status_code, details) = match error.downcast_ref::<AppError>() {
            Some(app) => (app.kind(), app.status_code(), app.details().cloned()),
            None => (ErrorKind::Internal, ErrorKind::Internal.default_status(), None),
        };

        let entry = ErrorLogEntry {
            id: Uuid::new_v4(),
            timestamp: self.clock.utc_now(),
            code,
            message: error.to_string(),
            status_code,
            details,
            stack_trace: render_source_chain(error),
            context,
        };

        self.buffer.lock().push(entry.clone());

        if let Err(err) = self.log_sink.record(&entry) {
            warn!(error = %err, entry_id = %entry.id, "Error sink failed, entry kept in memory");
        }
        if entry.is_severe() {
            alerts::deliver(
                self.alert_sink.as_ref(),
                &Alert::SevereError { entry: Box::new(entry.clone()) },
            );
        }

        entry
    }

    /// Up to `count` most recent entries, oldest first
    pub fn get_recent_errors(&self, count: usize) -> Vec<ErrorLogEntry> {
        self.buffer.lock().tail(count)
    }

    /// Drop every buffered entry
    pub fn clear_buffer(&self) {
        self.buffer.lock().clear();
    }

    /// Entries currently buffered
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::time::MockClock;

    fn logger(capacity: usize) -> ErrorLogger<MockClock> {
        ErrorLogger::with_clock(&ErrorLogConfig { capacity }, MockClock::new()).expect("logger")
    }

    #[test]
    fn classified_error_keeps_code_and_status() {
        let log = logger(10);
        let error = AppError::validation("Invalid email", Some(json!({ "field": "email" })));
        let entry = log.log(&error, Some(RequestContext::new("POST", "/api/contact")));

        assert_eq!(entry.code, ErrorKind::Validation);
        assert_eq!(entry.status_code, 400);
        assert_eq!(entry.details, Some(json!({ "field": "email" })));
        assert_eq!(entry.context.as_ref().map(|c| c.url.as_str()), Some("/api/contact"));
    }

    #[test]
    fn plain_error_is_internal() {
        let log = logger(10);
        let entry = log.log(&std::io::Error::other("socket closed"), None);
        assert_eq!(entry.code, ErrorKind::Internal);
        assert_eq!(entry.status_code, 500);
        assert_eq!(entry.message, "socket closed");
    }

    /// Validates FIFO eviction at capacity.
    ///
    /// Assertions:
    /// - Confirms only the last `capacity` entries remain, in order.
    #[test]
    fn ring_buffer_evicts_oldest() {
        let log = logger(3);
        for i in 0..5 {
            log.log(&AppError::not_found(&format!("item-{i}")), None);
        }
        let messages: Vec<String> =
            log.get_recent_errors(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["item-2 not found", "item-3 not found", "item-4 not found"]);
        assert_eq!(log.get_recent_errors(1)[0].message, "item-4 not found");
    }

    /// Validates sink routing by severity.
    ///
    /// Assertions:
    /// - Confirms every entry reaches the log sink.
    /// - Confirms only status >= 500 reaches the alert sink.
    #[test]
    fn severe_errors_reach_alert_sink() {
        let logged = Arc::new(AtomicUsize::new(0));
        let alerted = Arc::new(AtomicUsize::new(0));
        let logged_in = Arc::clone(&logged);
        let alerted_in = Arc::clone(&alerted);

        let log = logger(10)
            .with_log_sink(Arc::new(move |_: &ErrorLogEntry| -> Result<(), SinkError> {
                logged_in.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .with_alert_sink(Arc::new(move |alert: &Alert| -> Result<(), SinkError> {
                assert!(matches!(alert, Alert::SevereError { .. }));
                alerted_in.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));

        log.log(&AppError::not_found("Post"), None);
        log.log(&AppError::storage("write failed", None), None);
        log.log(&AppError::external_service("mailer", None), None);

        assert_eq!(logged.load(Ordering::SeqCst), 3);
        assert_eq!(alerted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_sinks_do_not_fail_logging() {
        let log = logger(10)
            .with_log_sink(Arc::new(|_: &ErrorLogEntry| -> Result<(), SinkError> {
                Err(SinkError::new("file", "disk full"))
            }))
            .with_alert_sink(Arc::new(|_: &Alert| -> Result<(), SinkError> {
                Err(SinkError::new("webhook", "timeout"))
            }));

        let entry = log.log(&AppError::internal("boom"), None);
        assert_eq!(log.len(), 1);
        assert!(entry.is_severe());
    }

    #[test]
    fn entries_carry_cause_chain_and_unique_ids() {
        let log = logger(10);
        let error = AppError::storage("query failed", None)
            .with_source(std::io::Error::other("connection reset"));
        let first = log.log(&error, None);
        let second = log.log(&error, None);

        assert_eq!(first.stack_trace.as_deref(), Some("caused by: connection reset"));
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn clear_buffer_empties_log() {
        let log = logger(10);
        log.log(&AppError::internal("x"), None);
        log.clear_buffer();
        assert!(log.is_empty());
        assert!(log.get_recent_errors(5).is_empty());
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(ErrorLogConfig { capacity: 0 }.validate().is_err());
    }

    #[test]
    fn entry_serializes_camel_case() {
        let log = logger(10);
        let entry = log.log(
            &AppError::authorization(None),
            Some(RequestContext::new("GET", "/admin").with_user_id("u1").with_ip("10.0.0.1")),
        );
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["code"], "AUTHORIZATION");
        assert_eq!(value["statusCode"], 403);
        assert_eq!(value["context"]["userId"], "u1");
        assert!(value.get("stackTrace").is_none());
    }
}
