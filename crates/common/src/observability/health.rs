//! Health verdict for an admin or load-balancer endpoint

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::monitor::PerformanceStats;

/// Heap usage, in percent, at or above which the process is degraded.
pub const MAX_HEAP_PERCENT: f64 = 90.0;

/// Server error rate, in percent, at or above which the process is degraded.
pub const MAX_ERROR_RATE_PERCENT: f64 = 5.0;

/// Overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving normally
    Healthy,
    /// Serving, but memory or error rate is over its limit
    Degraded,
}

/// Serializable health report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Verdict
    pub status: HealthStatus,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
    /// Process uptime in seconds, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
    /// Crate version
    pub version: &'static str,
    /// Figures the verdict is based on
    pub performance: PerformanceStats,
}

impl HealthReport {
    /// Judge `stats`: healthy when heap usage is under 90% and the error rate
    /// under 5%
    #[must_use]
    pub fn evaluate(stats: PerformanceStats, timestamp: DateTime<Utc>) -> Self {
        let healthy = stats.memory_stats.heap_used_percent < MAX_HEAP_PERCENT
            && stats.error_stats.rate < MAX_ERROR_RATE_PERCENT;
        Self {
            status: if healthy { HealthStatus::Healthy } else { HealthStatus::Degraded },
            timestamp,
            uptime: None,
            version: env!("CARGO_PKG_VERSION"),
            performance: stats,
        }
    }

    /// Attach the process uptime
    #[must_use]
    pub fn with_uptime(mut self, uptime: Duration) -> Self {
        self.uptime = Some(uptime.as_secs_f64());
        self
    }

    /// Whether the verdict is healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// 200 when healthy, 503 when degraded
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.status {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 503,
        }
    }
}
