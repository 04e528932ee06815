//! Request and metric aggregation with threshold alerts
//!
//! [`PerformanceMonitor`] keeps two bounded buffers: named metric samples and
//! per-request outcomes. Two windows serve two purposes:
//!
//! - **Alerting** looks at the last `rolling_window` requests (default 100)
//!   on every [`PerformanceMonitor::track_request`], so it reacts after a
//!   fixed number of samples regardless of traffic.
//! - **Reporting** ([`PerformanceMonitor::get_stats`]) looks at a trailing
//!   wall-clock window (default 5 minutes), the figure a human reads.
//!
//! Buffer locks are held only to push or to copy out the values needed; all
//! aggregation and alert delivery happen after the lock is released.
//!
//! The memory probe is not called on the request path. Requests carry the
//! snapshot last taken by the memory sampler or by `get_stats`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use super::alerts::{self, Alert, SharedAlertSink, TracingAlertSink};
use super::health::HealthReport;
use super::memory::{default_probe, MemoryProbe, MemorySnapshot, ReclaimHook};
use super::stats::DurationStats;
use crate::collections::RingBuffer;
use crate::error::{ConfigError, ConfigResult};
use crate::time::{Clock, SystemClock};
use crate::utils::{as_millis_f64, duration_millis};

/// Metric names recorded by the monitor itself
pub mod metric_names {
    /// Samples in the rolling window
    pub const REQUEST_COUNT: &str = "request.count";
    /// Rolling mean latency
    pub const REQUEST_MEAN: &str = "request.duration.mean";
    /// Rolling median latency
    pub const REQUEST_MEDIAN: &str = "request.duration.median";
    /// Rolling p95 latency
    pub const REQUEST_P95: &str = "request.duration.p95";
    /// Rolling p99 latency
    pub const REQUEST_P99: &str = "request.duration.p99";
    /// Rolling minimum latency
    pub const REQUEST_MIN: &str = "request.duration.min";
    /// Rolling maximum latency
    pub const REQUEST_MAX: &str = "request.duration.max";
    /// Heap bytes in use
    pub const HEAP_USED: &str = "memory.heap.used";
    /// Heap bytes in total
    pub const HEAP_TOTAL: &str = "memory.heap.total";
    /// Heap used fraction, 0 to 1
    pub const HEAP_PERCENT: &str = "memory.heap.percent";
    /// Resident set size
    pub const RSS: &str = "memory.rss";
    /// Non-resident mapped memory
    pub const EXTERNAL: &str = "memory.external";
}

/// Tags attached to a metric sample
pub type Tags = BTreeMap<String, String>;

/// Configuration for [`PerformanceMonitor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Capacity of each buffer
    pub capacity: usize,
    /// Requests considered by the alert checks
    pub rolling_window: usize,
    /// Single-request latency that raises a slow-request alert
    #[serde(rename = "slow_request_threshold_ms", with = "duration_millis")]
    pub slow_request_threshold: Duration,
    /// Rolling p95 latency that raises a degradation alert
    #[serde(rename = "p95_threshold_ms", with = "duration_millis")]
    pub p95_threshold: Duration,
    /// Fraction of 5xx responses that raises an error-rate alert
    pub error_rate_threshold: f64,
    /// Heap used fraction that raises a memory alert
    pub memory_threshold: f64,
    /// Period of the background memory sampler
    #[serde(rename = "memory_sample_interval_ms", with = "duration_millis")]
    pub memory_sample_interval: Duration,
    /// Trailing window reported by `get_stats`
    #[serde(rename = "stats_window_ms", with = "duration_millis")]
    pub stats_window: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            rolling_window: 100,
            slow_request_threshold: Duration::from_millis(3000),
            p95_threshold: Duration::from_millis(5000),
            error_rate_threshold: 0.05,
            memory_threshold: 0.9,
            memory_sample_interval: Duration::from_secs(30),
            stats_window: Duration::from_secs(300),
        }
    }
}

impl MonitorConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for zero sizes or periods, and for
    /// fractions outside `0..=1`.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("monitor.capacity", "must be greater than 0"));
        }
        if self.rolling_window == 0 {
            return Err(ConfigError::invalid("monitor.rolling_window", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(ConfigError::invalid(
                "monitor.error_rate_threshold",
                "must be between 0 and 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.memory_threshold) {
            return Err(ConfigError::invalid("monitor.memory_threshold", "must be between 0 and 1"));
        }
        if self.memory_sample_interval.is_zero() {
            return Err(ConfigError::invalid(
                "monitor.memory_sample_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// A timestamped numeric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name
    pub name: String,
    /// Observed value
    pub value: f64,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
    /// Optional tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

/// A finished request, as reported by the request layer
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Handling time in milliseconds
    pub duration_ms: f64,
    /// Response status, if a response was sent
    pub status_code: Option<u16>,
}

impl RequestRecord {
    /// Record for `method url` that took `duration`
    pub fn new(method: impl Into<String>, url: impl Into<String>, duration: Duration) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            duration_ms: as_millis_f64(duration),
            status_code: None,
        }
    }

    /// Attach the response status
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// A stored request outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSample {
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Handling time in milliseconds
    pub duration_ms: f64,
    /// Response status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// When it was tracked
    pub timestamp: DateTime<Utc>,
    /// Memory at tracking time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_snapshot: Option<MemorySnapshot>,
}

impl RequestSample {
    /// Whether the response was a server error
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code.is_some_and(|status| status >= 500)
    }
}

/// Request figures over the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    /// Requests tracked
    pub total: usize,
    /// Mean latency, 0 when no requests
    pub avg_duration: f64,
    /// Largest latency, 0 when no requests
    pub max_duration: f64,
    /// Smallest latency, 0 when no requests
    pub min_duration: f64,
}

/// Memory figures at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Heap bytes in use
    pub heap_used: u64,
    /// Heap bytes in total
    pub heap_total: u64,
    /// Resident set size
    pub rss: u64,
    /// Non-resident mapped memory
    pub external: u64,
    /// `heap_used / heap_total * 100`
    pub heap_used_percent: f64,
}

/// Server errors over the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    /// Responses with status `>= 500`
    pub count: usize,
    /// `count / total * 100`, 0 when no requests
    pub rate: f64,
}

/// Snapshot returned by [`PerformanceMonitor::get_stats`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    /// Request figures
    pub request_stats: RequestStats,
    /// Memory figures
    pub memory_stats: MemoryStats,
    /// Error figures
    pub error_stats: ErrorStats,
}

struct Shared<C> {
    config: MonitorConfig,
    probe: Arc<dyn MemoryProbe>,
    alert_sink: SharedAlertSink,
    reclaim: Option<ReclaimHook>,
    clock: C,
    latest_memory: RwLock<MemorySnapshot>,
}

struct Buffers {
    metrics: Mutex<RingBuffer<MetricSample>>,
    requests: Mutex<RingBuffer<RequestSample>>,
}

/// Builder for [`PerformanceMonitor`]
pub struct MonitorBuilder<C: Clock = SystemClock> {
    config: MonitorConfig,
    clock: C,
    probe: Option<Arc<dyn MemoryProbe>>,
    alert_sink: Option<SharedAlertSink>,
    reclaim: Option<ReclaimHook>,
    sample_on_build: bool,
}

impl MonitorBuilder<SystemClock> {
    /// Start from `config` on the system clock
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            clock: SystemClock,
            probe: None,
            alert_sink: None,
            reclaim: None,
            sample_on_build: false,
        }
    }
}

impl<C: Clock> MonitorBuilder<C> {
    /// Use a custom clock
    #[must_use]
    pub fn clock<C2: Clock>(self, clock: C2) -> MonitorBuilder<C2> {
        MonitorBuilder {
            config: self.config,
            clock,
            probe: self.probe,
            alert_sink: self.alert_sink,
            reclaim: self.reclaim,
            sample_on_build: self.sample_on_build,
        }
    }

    /// Use a custom memory probe
    #[must_use]
    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Deliver alerts to `sink` instead of the tracing sink
    #[must_use]
    pub fn alert_sink(mut self, sink: SharedAlertSink) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    /// Call `hook` when memory pressure is detected
    #[must_use]
    pub fn reclaim_hook(mut self, hook: ReclaimHook) -> Self {
        self.reclaim = Some(hook);
        self
    }

    /// Start the periodic memory sampler from [`MonitorBuilder::build`]
    ///
    /// The sampler is spawned only when `build` runs inside a tokio runtime;
    /// elsewhere call [`PerformanceMonitor::start_memory_sampling`] later.
    #[must_use]
    pub fn sample_memory_on_build(mut self, enabled: bool) -> Self {
        self.sample_on_build = enabled;
        self
    }

    /// Validate the configuration and build the monitor
    ///
    /// # Errors
    /// Propagates [`MonitorConfig::validate`].
    pub fn build(self) -> ConfigResult<PerformanceMonitor<C>> {
        self.config.validate()?;
        let capacity = self.config.capacity;
        let probe = self.probe.unwrap_or_else(default_probe);
        let initial = probe.snapshot();

        let monitor = PerformanceMonitor {
            shared: Arc::new(Shared {
                config: self.config,
                probe,
                alert_sink: self.alert_sink.unwrap_or_else(|| Arc::new(TracingAlertSink)),
                reclaim: self.reclaim,
                clock: self.clock,
                latest_memory: RwLock::new(initial),
            }),
            buffers: Arc::new(Buffers {
                metrics: Mutex::new(RingBuffer::new(capacity)),
                requests: Mutex::new(RingBuffer::new(capacity)),
            }),
        };

        if self.sample_on_build {
            match Handle::try_current() {
                Ok(runtime) => {
                    drop(monitor.spawn_sampler(&runtime));
                }
                Err(_) => debug!("No tokio runtime, memory sampler not started"),
            }
        }

        Ok(monitor)
    }
}

/// Process-wide request and metric aggregator
///
/// Clones share buffers, so one monitor built at startup can be handed to
/// every handler.
pub struct PerformanceMonitor<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
    buffers: Arc<Buffers>,
}

impl<C: Clock> Clone for PerformanceMonitor<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared), buffers: Arc::clone(&self.buffers) }
    }
}

impl<C: Clock> fmt::Debug for PerformanceMonitor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.shared.config)
            .field("metrics", &self.buffers.metrics.lock().len())
            .field("requests", &self.buffers.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl PerformanceMonitor<SystemClock> {
    /// Create a monitor with default probe and tracing alerts
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: MonitorConfig) -> ConfigResult<Self> {
        MonitorBuilder::new(config).build()
    }

    /// Start building a monitor
    #[must_use]
    pub fn builder(config: MonitorConfig) -> MonitorBuilder<SystemClock> {
        MonitorBuilder::new(config)
    }
}

impl<C: Clock> PerformanceMonitor<C> {
    /// Append a metric sample
    pub fn record_metric(&self, name: impl Into<String>, value: f64, tags: Option<Tags>) {
        let sample = MetricSample {
            name: name.into(),
            value,
            timestamp: self.shared.clock.utc_now(),
            tags,
        };
        self.buffers.metrics.lock().push(sample);
    }

    /// Record a finished request, then run the alert checks and refresh the
    /// rolling latency metrics
    #[instrument(skip_all, fields(method = %record.method, url = %record.url))]
    pub fn track_request(&self, record: RequestRecord) {
        let config = &self.shared.config;
        let sample = RequestSample {
            url: record.url,
            method: record.method,
            duration_ms: record.duration_ms,
            status_code: record.status_code,
            timestamp: self.shared.clock.utc_now(),
            memory_snapshot: Some(self.latest_memory()),
        };

        let slow_threshold_ms = as_millis_f64(config.slow_request_threshold);
        let slow = (sample.duration_ms > slow_threshold_ms).then(|| Alert::SlowRequest {
            url: sample.url.clone(),
            method: sample.method.clone(),
            duration_ms: sample.duration_ms,
            threshold_ms: slow_threshold_ms,
        });

        let (durations, server_errors) = {
            let mut requests = self.buffers.requests.lock();
            requests.push(sample);
            let mut server_errors = 0_usize;
            let durations: Vec<f64> = requests
                .tail_iter(config.rolling_window)
                .map(|r| {
                    server_errors += usize::from(r.is_server_error());
                    r.duration_ms
                })
                .collect();
            (durations, server_errors)
        };

        if let Some(alert) = slow {
            alerts::deliver(self.shared.alert_sink.as_ref(), &alert);
        }

        #[allow(clippy::cast_precision_loss)]
        let error_rate = server_errors as f64 / durations.len() as f64;
        if error_rate > config.error_rate_threshold {
            alerts::deliver(
                self.shared.alert_sink.as_ref(),
                &Alert::HighErrorRate {
                    rate: error_rate,
                    threshold: config.error_rate_threshold,
                    sample_size: durations.len(),
                },
            );
        }

        if let Some(stats) = DurationStats::compute(&durations) {
            self.record_rolling_stats(&stats);
            let p95_threshold_ms = as_millis_f64(config.p95_threshold);
            if stats.p95 > p95_threshold_ms {
                alerts::deliver(
                    self.shared.alert_sink.as_ref(),
                    &Alert::PerformanceDegradation {
                        p95_ms: stats.p95,
                        threshold_ms: p95_threshold_ms,
                    },
                );
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_rolling_stats(&self, stats: &DurationStats) {
        use metric_names as m;

        let now = self.shared.clock.utc_now();
        let values = [
            (m::REQUEST_COUNT, stats.count as f64),
            (m::REQUEST_MEAN, stats.mean),
            (m::REQUEST_MEDIAN, stats.median),
            (m::REQUEST_P95, stats.p95),
            (m::REQUEST_P99, stats.p99),
            (m::REQUEST_MIN, stats.min),
            (m::REQUEST_MAX, stats.max),
        ];

        let mut metrics = self.buffers.metrics.lock();
        for (name, value) in values {
            metrics.push(MetricSample { name: name.to_owned(), value, timestamp: now, tags: None });
        }
    }

    /// Take a memory snapshot, record it, and react to memory pressure
    ///
    /// This is what the background sampler runs every interval.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_memory(&self) -> MemorySnapshot {
        use metric_names as m;

        let snapshot = self.refresh_memory();
        let fraction = snapshot.heap_used_fraction();

        self.record_metric(m::HEAP_USED, snapshot.heap_used as f64, None);
        self.record_metric(m::HEAP_TOTAL, snapshot.heap_total as f64, None);
        self.record_metric(m::HEAP_PERCENT, fraction, None);
        self.record_metric(m::RSS, snapshot.rss as f64, None);
        self.record_metric(m::EXTERNAL, snapshot.external as f64, None);

        let threshold = self.shared.config.memory_threshold;
        if fraction > threshold {
            alerts::deliver(
                self.shared.alert_sink.as_ref(),
                &Alert::MemoryPressure { heap_used_fraction: fraction, threshold },
            );
            match &self.shared.reclaim {
                Some(reclaim) => {
                    debug!("Requesting memory reclamation");
                    reclaim();
                }
                None => trace!("No reclaim hook installed"),
            }
        }

        snapshot
    }

    /// Spawn the periodic memory sampler on the current tokio runtime
    ///
    /// The task exits once every clone of this monitor is dropped.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start_memory_sampling(&self) -> JoinHandle<()> {
        self.spawn_sampler(&Handle::current())
    }

    fn spawn_sampler(&self, runtime: &Handle) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let buffers: Weak<Buffers> = Arc::downgrade(&self.buffers);
        let period = self.shared.config.memory_sample_interval;

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(buffers) = buffers.upgrade() else {
                    trace!("Monitor dropped, stopping memory sampling");
                    break;
                };
                let monitor = Self { shared: Arc::clone(&shared), buffers };
                monitor.sample_memory();
            }
        })
    }

    /// Request, memory, and error figures over the trailing stats window
    #[allow(clippy::cast_precision_loss)]
    pub fn get_stats(&self) -> PerformanceStats {
        let cutoff = self.window_start();

        let (durations, error_count) = {
            let requests = self.buffers.requests.lock();
            let mut error_count = 0_usize;
            let durations: Vec<f64> = requests
                .iter()
                .filter(|r| r.timestamp >= cutoff)
                .map(|r| {
                    error_count += usize::from(r.is_server_error());
                    r.duration_ms
                })
                .collect();
            (durations, error_count)
        };

        let total = durations.len();
        let request_stats = if total == 0 {
            RequestStats { total, avg_duration: 0.0, max_duration: 0.0, min_duration: 0.0 }
        } else {
            RequestStats {
                total,
                avg_duration: durations.iter().sum::<f64>() / total as f64,
                max_duration: durations.iter().copied().fold(f64::MIN, f64::max),
                min_duration: durations.iter().copied().fold(f64::MAX, f64::min),
            }
        };

        let memory = self.refresh_memory();
        let memory_stats = MemoryStats {
            heap_used: memory.heap_used,
            heap_total: memory.heap_total,
            rss: memory.rss,
            external: memory.external,
            heap_used_percent: memory.heap_used_fraction() * 100.0,
        };

        let rate = if total == 0 { 0.0 } else { error_count as f64 / total as f64 * 100.0 };

        PerformanceStats {
            request_stats,
            memory_stats,
            error_stats: ErrorStats { count: error_count, rate },
        }
    }

    /// Health verdict over the current stats
    pub fn health_report(&self) -> HealthReport {
        HealthReport::evaluate(self.get_stats(), self.shared.clock.utc_now())
    }

    /// Snapshot attached to tracked requests
    pub fn latest_memory(&self) -> MemorySnapshot {
        *self.shared.latest_memory.read()
    }

    fn refresh_memory(&self) -> MemorySnapshot {
        let snapshot = self.shared.probe.snapshot();
        *self.shared.latest_memory.write() = snapshot;
        snapshot
    }

    fn window_start(&self) -> DateTime<Utc> {
        let now = self.shared.clock.utc_now();
        TimeDelta::from_std(self.shared.config.stats_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Up to `count` most recent requests, oldest first
    pub fn get_recent_requests(&self, count: usize) -> Vec<RequestSample> {
        self.buffers.requests.lock().tail(count)
    }

    /// Metric samples, optionally filtered by name and by earliest timestamp
    pub fn get_metrics(
        &self,
        name: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<MetricSample> {
        self.buffers
            .metrics
            .lock()
            .iter()
            .filter(|m| name.map_or(true, |n| m.name == n))
            .filter(|m| since.map_or(true, |t| m.timestamp >= t))
            .cloned()
            .collect()
    }

    /// Clear both buffers
    pub fn reset(&self) {
        self.buffers.metrics.lock().clear();
        self.buffers.requests.lock().clear();
    }

    /// Active configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }
}
