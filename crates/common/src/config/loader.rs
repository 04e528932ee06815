//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Start from defaults
//! 2. If `RAMPART_CONFIG` names a file, load it (JSON or TOML by extension)
//! 3. Apply `RAMPART_*` environment overrides
//! 4. Validate
//!
//! ## Environment Variables
//! - `RAMPART_CONFIG`: configuration file path
//! - `RAMPART_BREAKER_FAILURE_THRESHOLD`: failures that open a circuit
//! - `RAMPART_BREAKER_OPEN_TIMEOUT_MS`: open-state cool-down
//! - `RAMPART_BREAKER_SUCCESS_THRESHOLD`: half-open successes that close it
//! - `RAMPART_RATE_LIMIT_DEFAULT`: admissions per key per window
//! - `RAMPART_RATE_LIMIT_WINDOW_MS`: window length
//! - `RAMPART_RETRY_MAX_RETRIES`: attempts per retry sequence
//! - `RAMPART_RETRY_DELAY_MS`: base retry delay
//! - `RAMPART_RETRY_BACKOFF`: exponential backoff on/off
//! - `RAMPART_MONITOR_CAPACITY`: monitor buffer capacity
//! - `RAMPART_ERROR_LOG_CAPACITY`: error log capacity
//! - `RAMPART_LOG`: default log filter directive
//! - `RAMPART_LOG_FORMAT`: `pretty` or `json`

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::RampartConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::observability::LogFormat;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "RAMPART_CONFIG";

/// Configuration file syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON
    Json,
    /// TOML
    Toml,
}

impl ConfigFormat {
    /// Format implied by `path`'s extension
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for an unknown extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::Parse {
                format: "unknown",
                message: format!("Unsupported config extension: {}", other.unwrap_or("<none>")),
            }),
        }
    }
}

/// Parse configuration text
///
/// # Errors
/// Returns [`ConfigError::Parse`] if the text is malformed.
pub fn load_from_str(contents: &str, format: ConfigFormat) -> ConfigResult<RampartConfig> {
    match format {
        ConfigFormat::Toml => toml::from_str(contents)
            .map_err(|e| ConfigError::Parse { format: "TOML", message: e.to_string() }),
        ConfigFormat::Json => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Parse { format: "JSON", message: e.to_string() }),
    }
}

/// Load configuration from a file
///
/// # Errors
/// Returns [`ConfigError::Io`] if the file cannot be read, or
/// [`ConfigError::Parse`] if it is malformed.
pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<RampartConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    load_from_str(&contents, format)
}

/// Defaults, then the `RAMPART_CONFIG` file, then environment overrides
///
/// # Errors
/// Returns [`ConfigError`] if the file, an override, or the result is invalid.
pub fn load() -> ConfigResult<RampartConfig> {
    let mut config = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) => load_from_file(path)?,
        Err(_) => {
            tracing::debug!("No configuration file set, using defaults");
            RampartConfig::default()
        }
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

impl RampartConfig {
    /// Apply `RAMPART_*` environment variables
    ///
    /// # Errors
    /// Returns [`ConfigError::Env`] for a value that does not parse.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`
    ///
    /// # Errors
    /// Returns [`ConfigError::Env`] for a value that does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "RAMPART_BREAKER_FAILURE_THRESHOLD")? {
            self.circuit_breaker.failure_threshold = v;
        }
        if let Some(ms) = parse_var(&lookup, "RAMPART_BREAKER_OPEN_TIMEOUT_MS")? {
            self.circuit_breaker.open_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var(&lookup, "RAMPART_BREAKER_SUCCESS_THRESHOLD")? {
            self.circuit_breaker.success_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RAMPART_RATE_LIMIT_DEFAULT")? {
            self.rate_limiter.default_limit = v;
        }
        if let Some(ms) = parse_var(&lookup, "RAMPART_RATE_LIMIT_WINDOW_MS")? {
            self.rate_limiter.window = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var(&lookup, "RAMPART_RETRY_MAX_RETRIES")? {
            self.retry.max_retries = v;
        }
        if let Some(ms) = parse_var(&lookup, "RAMPART_RETRY_DELAY_MS")? {
            self.retry.delay = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("RAMPART_RETRY_BACKOFF") {
            self.retry.backoff = parse_bool("RAMPART_RETRY_BACKOFF", &raw)?;
        }
        if let Some(v) = parse_var(&lookup, "RAMPART_MONITOR_CAPACITY")? {
            self.monitor.capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "RAMPART_ERROR_LOG_CAPACITY")? {
            self.error_log.capacity = v;
        }
        if let Some(level) = lookup("RAMPART_LOG") {
            self.logging.level = level;
        }
        if let Some(raw) = lookup("RAMPART_LOG_FORMAT") {
            self.logging.format = match raw.to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::Env {
                        var: "RAMPART_LOG_FORMAT",
                        message: format!("expected 'pretty' or 'json', got '{raw}'"),
                    })
                }
            };
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::Env { var, message: format!("'{raw}': {e}") })
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(var: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env { var, message: format!("'{raw}' is not a boolean") }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn bool_parsing() {
        for raw in ["1", "true", "YES", "on"] {
            assert!(parse_bool("X", raw).expect("bool"));
        }
        for raw in ["0", "false", "No", "OFF"] {
            assert!(!parse_bool("X", raw).expect("bool"));
        }
        assert!(parse_bool("X", "maybe").is_err());
    }

    /// Validates that overrides replace only the variables that are set.
    ///
    /// Assertions:
    /// - Confirms each set variable lands in its section.
    /// - Confirms untouched fields keep their defaults.
    #[test]
    fn overrides_apply_to_sections() {
        let mut config = RampartConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("RAMPART_RATE_LIMIT_DEFAULT", "5"),
                ("RAMPART_RATE_LIMIT_WINDOW_MS", "1000"),
                ("RAMPART_BREAKER_OPEN_TIMEOUT_MS", "250"),
                ("RAMPART_RETRY_BACKOFF", "off"),
                ("RAMPART_LOG", "rampart=debug"),
                ("RAMPART_LOG_FORMAT", "JSON"),
            ]))
            .expect("overrides");

        assert_eq!(config.rate_limiter.default_limit, 5);
        assert_eq!(config.rate_limiter.window, Duration::from_secs(1));
        assert_eq!(config.circuit_breaker.open_timeout, Duration::from_millis(250));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(!config.retry.backoff);
        assert_eq!(config.logging.level, "rampart=debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn malformed_override_names_variable() {
        let mut config = RampartConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("RAMPART_MONITOR_CAPACITY", "lots")]))
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::Env { var: "RAMPART_MONITOR_CAPACITY", .. }));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = load_from_str(
            "[rate_limiter]\ndefault_limit = 20\n\n[monitor]\nslow_request_threshold_ms = 1500\n",
            ConfigFormat::Toml,
        )
        .expect("parse");
        assert_eq!(config.rate_limiter.default_limit, 20);
        assert_eq!(config.rate_limiter.window, Duration::from_secs(60));
        assert_eq!(config.monitor.slow_request_threshold, Duration::from_millis(1500));
        assert_eq!(config.monitor.capacity, 1000);
    }

    #[test]
    fn json_sections_parse() {
        let config = load_from_str(
            r#"{"retry":{"max_retries":5,"delay_ms":200,"backoff":false}}"#,
            ConfigFormat::Json,
        )
        .expect("parse");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.delay, Duration::from_millis(200));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")).ok(), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")).ok(), Some(ConfigFormat::Json));
        assert!(ConfigFormat::from_path(Path::new("a.yaml")).is_err());
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let err = load_from_str("not = [valid", ConfigFormat::Toml).expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
    }
}
