//! Fixed-window rate limiting keyed by caller identity
//!
//! Each key owns a window that opens on the first check after the previous
//! one expired. The window end is computed once at reset and held fixed, so
//! this is not a sliding window: a client can spend its full quota at the end
//! of one window and again at the start of the next.
//!
//! Entries live in a sharded [`DashMap`]. The entry API holds the shard lock
//! for the whole reset-or-increment step, so two checks for the same key can
//! never both observe a stale count. Stale keys are dropped by
//! [`RateLimiter::sweep`], which [`RateLimiter::start_cleanup`] runs once per
//! window.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::time::{Clock, SystemClock};
use crate::utils::duration_millis;

/// Configuration for the fixed-window rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Window length
    #[serde(rename = "window_ms", with = "duration_millis")]
    pub window: Duration,
    /// Admissions per key per window when the caller passes no limit
    pub default_limit: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { window: Duration::from_secs(60), default_limit: 100 }
    }
}

impl RateLimiterConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for a zero window or zero limit.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.window.is_zero() {
            return Err(ConfigError::invalid("rate_limiter.window_ms", "must be greater than zero"));
        }
        if self.default_limit == 0 {
            return Err(ConfigError::invalid(
                "rate_limiter.default_limit",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Builder for [`RateLimiterConfig`]
#[derive(Debug, Default)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    /// Set the window length
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Set the default per-key limit
    #[must_use]
    pub fn default_limit(mut self, limit: u32) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    /// Propagates [`RateLimiterConfig::validate`].
    pub fn build(self) -> ConfigResult<RateLimiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the call is admitted
    pub allowed: bool,
    /// Admissions left in the current window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: Instant,
    /// Time until `reset_at`, for a `Retry-After` header
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

type Windows = DashMap<String, WindowEntry>;

/// Per-key fixed-window rate limiter
///
/// Clones share the same key map.
///
/// # Examples
///
/// ```rust
/// use rampart_common::resilience::RateLimiter;
///
/// let limiter = RateLimiter::default();
/// let decision = limiter.check("203.0.113.7", Some(5));
/// assert!(decision.allowed);
/// assert_eq!(decision.remaining, 4);
/// ```
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimiterConfig,
    windows: Arc<Windows>,
    clock: Arc<C>,
}

impl<C: Clock> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            windows: Arc::clone(&self.windows),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter on the system clock
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: RateLimiterConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self {
            config: RateLimiterConfig::default(),
            windows: Arc::new(DashMap::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter with a custom clock
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn with_clock(config: RateLimiterConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, windows: Arc::new(DashMap::new()), clock: Arc::new(clock) })
    }

    /// Count one call against `key` and decide whether to admit it
    ///
    /// `limit` overrides the configured default for this call; `None` or
    /// `Some(0)` use the default.
    pub fn check(&self, key: &str, limit: Option<u32>) -> RateLimitDecision {
        let limit = limit.filter(|&l| l > 0).unwrap_or(self.config.default_limit);
        let now = self.clock.now();

        let entry = {
            let mut slot = self
                .windows
                .entry(key.to_owned())
                .or_insert_with(|| WindowEntry { count: 0, reset_at: now });

            if slot.count == 0 || now > slot.reset_at {
                *slot = WindowEntry { count: 1, reset_at: now + self.config.window };
            } else {
                slot.count = slot.count.saturating_add(1);
            }
            *slot
        };

        let retry_after = entry.reset_at.saturating_duration_since(now);
        if entry.count > limit {
            debug!(key, limit, "Rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
                retry_after,
            };
        }

        RateLimitDecision {
            allowed: true,
            remaining: limit - entry.count,
            reset_at: entry.reset_at,
            retry_after,
        }
    }

    /// Forget `key`'s window; the next check opens a fresh one
    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    /// Number of keys currently tracked
    pub fn active_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop every entry whose window has expired
    ///
    /// Locks one shard at a time. Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.windows, self.clock.now())
    }

    /// Spawn the periodic sweep on the current tokio runtime
    ///
    /// Runs every window length. The task holds only a weak reference to the
    /// key map and exits once every clone of this limiter is dropped.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start_cleanup(&self) -> JoinHandle<()> {
        let windows: Weak<Windows> = Arc::downgrade(&self.windows);
        let clock = Arc::clone(&self.clock);
        let period = self.config.window;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(windows) = windows.upgrade() else {
                    trace!("Rate limiter dropped, stopping cleanup");
                    break;
                };
                let removed = sweep_expired(&windows, clock.now());
                if removed > 0 {
                    debug!(removed, remaining = windows.len(), "Swept expired rate limit windows");
                }
            }
        })
    }

    /// Active configuration
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

fn sweep_expired(windows: &Windows, now: Instant) -> usize {
    let before = windows.len();
    windows.retain(|_, entry| now <= entry.reset_at);
    before.saturating_sub(windows.len())
}
