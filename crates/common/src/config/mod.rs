//! Configuration for every primitive in the crate
//!
//! [`RampartConfig`] aggregates the per-component configs. Every section and
//! field has a default, so a file only needs the values it changes.
//!
//! ```toml
//! [rate_limiter]
//! window_ms = 60000
//! default_limit = 100
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! open_timeout_ms = 60000
//! success_threshold = 3
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::observability::{ErrorLogConfig, LoggingConfig, MonitorConfig};
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryOptions};

pub use loader::{load, load_from_file, load_from_str, ConfigFormat, CONFIG_PATH_VAR};

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampartConfig {
    /// Circuit breaker defaults
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limiter defaults
    pub rate_limiter: RateLimiterConfig,
    /// Retry defaults
    pub retry: RetryOptions,
    /// Performance monitor settings
    pub monitor: MonitorConfig,
    /// Error log settings
    pub error_log: ErrorLogConfig,
    /// Subscriber settings
    pub logging: LoggingConfig,
}

impl RampartConfig {
    /// Validate every section
    ///
    /// # Errors
    /// Returns the first section's [`crate::error::ConfigError`].
    pub fn validate(&self) -> ConfigResult<()> {
        self.circuit_breaker.validate()?;
        self.rate_limiter.validate()?;
        self.retry.validate()?;
        self.monitor.validate()?;
        self.error_log.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RampartConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limiter.default_limit, 100);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.error_log.capacity, 100);
    }

    #[test]
    fn invalid_section_fails_validation() {
        let mut config = RampartConfig::default();
        config.rate_limiter.window = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
