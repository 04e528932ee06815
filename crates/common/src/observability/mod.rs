//! Observability primitives: performance monitoring, error logging, alerts
//!
//! - [`monitor`]: request and metric buffers, rolling latency statistics,
//!   threshold alerts, periodic memory sampling
//! - [`error_logger`]: bounded log of classified errors with sink routing
//! - [`alerts`]: the alert type and the sink trait
//! - [`health`]: a healthy/degraded verdict over the monitor's stats
//! - [`logging`]: `tracing` subscriber installation
//!
//! Nothing in this module returns an error into the request path. Sink
//! failures are logged and dropped.

pub mod alerts;
pub mod error_logger;
pub mod health;
pub mod logging;
pub mod memory;
pub mod monitor;
pub mod stats;

pub use alerts::{Alert, AlertLevel, AlertSink, SharedAlertSink, TracingAlertSink};
pub use error_logger::{
    ErrorLogConfig, ErrorLogEntry, ErrorLogger, ErrorSink, RequestContext, TracingErrorSink,
};
pub use health::{HealthReport, HealthStatus};
pub use logging::{init_tracing, LogFormat, LoggingConfig, LoggingError};
#[cfg(feature = "process-memory")]
pub use memory::SysinfoProbe;
pub use memory::{MemoryProbe, MemorySnapshot, NullProbe, ReclaimHook, StaticProbe};
pub use monitor::{
    metric_names, ErrorStats, MemoryStats, MetricSample, MonitorBuilder, MonitorConfig,
    PerformanceMonitor, PerformanceStats, RequestRecord, RequestSample, RequestStats, Tags,
};
pub use stats::DurationStats;
