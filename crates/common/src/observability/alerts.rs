//! Operational alerts and the sinks that deliver them
//!
//! The monitor and the error logger raise [`Alert`]s; an [`AlertSink`]
//! delivers them. Delivery is fire-and-forget: a sink failure is logged and
//! dropped, never returned to the request path.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};

use super::error_logger::ErrorLogEntry;
use crate::error::SinkError;

/// How urgently an alert needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Degradation worth watching
    Warning,
    /// Needs an operator now
    Critical,
}

/// A signal raised by the monitor or the error logger
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    /// A single request exceeded the slow-request threshold.
    SlowRequest {
        /// Request URL
        url: String,
        /// HTTP method
        method: String,
        /// Handling time in milliseconds
        duration_ms: f64,
        /// Configured slow-request threshold in milliseconds
        threshold_ms: f64,
    },
    /// Too many 5xx responses among the most recent requests.
    HighErrorRate {
        /// Fraction of 5xx responses, 0 to 1
        rate: f64,
        /// Configured fraction
        threshold: f64,
        /// Requests the rate was computed over
        sample_size: usize,
    },
    /// Rolling p95 latency exceeded its threshold.
    PerformanceDegradation {
        /// Rolling p95 latency in milliseconds
        p95_ms: f64,
        /// Configured p95 threshold in milliseconds
        threshold_ms: f64,
    },
    /// Heap usage fraction exceeded its threshold.
    MemoryPressure {
        /// Heap used fraction, 0 to 1
        heap_used_fraction: f64,
        /// Configured fraction
        threshold: f64,
    },
    /// An error with status `>= 500` was logged.
    SevereError {
        /// The logged entry
        entry: Box<ErrorLogEntry>,
    },
}

impl Alert {
    /// Stable alert name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SlowRequest { .. } => "slow_request",
            Self::HighErrorRate { .. } => "high_error_rate",
            Self::PerformanceDegradation { .. } => "performance_degradation",
            Self::MemoryPressure { .. } => "memory_pressure",
            Self::SevereError { .. } => "severe_error",
        }
    }

    /// Urgency of this alert
    #[must_use]
    pub const fn level(&self) -> AlertLevel {
        match self {
            Self::SlowRequest { .. } | Self::PerformanceDegradation { .. } => AlertLevel::Warning,
            Self::HighErrorRate { .. } | Self::MemoryPressure { .. } | Self::SevereError { .. } => {
                AlertLevel::Critical
            }
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlowRequest { url, method, duration_ms, threshold_ms } => write!(
                f,
                "Slow request: {method} {url} took {duration_ms:.0}ms \
                 (threshold {threshold_ms:.0}ms)"
            ),
            Self::HighErrorRate { rate, threshold, sample_size } => write!(
                f,
                "High error rate: {:.2}% over last {sample_size} requests (threshold {:.2}%)",
                rate * 100.0,
                threshold * 100.0
            ),
            Self::PerformanceDegradation { p95_ms, threshold_ms } => {
                write!(
                    f,
                    "Performance degradation: p95 {p95_ms:.0}ms (threshold {threshold_ms:.0}ms)"
                )
            }
            Self::MemoryPressure { heap_used_fraction, threshold } => write!(
                f,
                "High memory usage: {:.2}% (threshold {:.2}%)",
                heap_used_fraction * 100.0,
                threshold * 100.0
            ),
            Self::SevereError { entry } => {
                write!(f, "Severe error {} [{}]: {}", entry.code, entry.status_code, entry.message)
            }
        }
    }
}

/// Destination for alerts
///
/// Implementations must not block for long; they run on the request path.
pub trait AlertSink: Send + Sync {
    /// Deliver one alert
    ///
    /// # Errors
    /// Returns [`SinkError`] when delivery failed. The caller logs and drops it.
    fn send(&self, alert: &Alert) -> Result<(), SinkError>;
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) -> Result<(), SinkError> + Send + Sync,
{
    fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        self(alert)
    }
}

/// Shared alert sink handle
pub type SharedAlertSink = Arc<dyn AlertSink>;

/// Emits alerts as `tracing` events under the `rampart::alert` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        match alert.level() {
            AlertLevel::Warning => {
                warn!(target: "rampart::alert", alert = alert.name(), "{alert}");
            }
            AlertLevel::Critical => {
                error!(target: "rampart::alert", alert = alert.name(), "{alert}");
            }
        }
        Ok(())
    }
}

/// Deliver `alert`, swallowing any sink failure.
pub(crate) fn deliver(sink: &dyn AlertSink, alert: &Alert) {
    if let Err(err) = sink.send(alert) {
        warn!(alert = alert.name(), error = %err, "Alert sink failed, alert dropped");
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn levels_and_names() {
        let slow = Alert::SlowRequest {
            url: "/api/posts".into(),
            method: "GET".into(),
            duration_ms: 3500.0,
            threshold_ms: 3000.0,
        };
        assert_eq!(slow.name(), "slow_request");
        assert_eq!(slow.level(), AlertLevel::Warning);
        assert_eq!(slow.to_string(), "Slow request: GET /api/posts took 3500ms (threshold 3000ms)");

        let rate = Alert::HighErrorRate { rate: 0.06, threshold: 0.05, sample_size: 100 };
        assert_eq!(rate.level(), AlertLevel::Critical);
        assert_eq!(
            rate.to_string(),
            "High error rate: 6.00% over last 100 requests (threshold 5.00%)"
        );
    }

    #[test]
    fn serializes_with_type_tag() {
        let alert = Alert::PerformanceDegradation { p95_ms: 6000.0, threshold_ms: 5000.0 };
        let value = serde_json::to_value(&alert).expect("serialize");
        assert_eq!(value["type"], "performance_degradation");
        assert_eq!(value["p95_ms"], 6000.0);
    }

    /// Validates that a failing sink never surfaces its error.
    ///
    /// Assertions:
    /// - Confirms the sink was invoked.
    /// - Ensures `deliver` returns normally.
    #[test]
    fn failing_sink_is_swallowed() {
        let calls = Mutex::new(0_u32);
        let sink = |_: &Alert| -> Result<(), SinkError> {
            *calls.lock() += 1;
            Err(SinkError::new("webhook", "connection refused"))
        };
        deliver(&sink, &Alert::MemoryPressure { heap_used_fraction: 0.95, threshold: 0.9 });
        assert_eq!(*calls.lock(), 1);
    }
}
