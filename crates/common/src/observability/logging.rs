//! `tracing` subscriber installation
//!
//! Installs a registry with an `EnvFilter` and one output layer. `RUST_LOG`
//! wins over the configured level when set.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `rampart=debug,warn`
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

/// Failure installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber is already installed.
    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}

/// Install the global subscriber
///
/// # Errors
/// - [`LoggingError::InvalidFilter`] if `config.level` is not a valid
///   directive.
/// - [`LoggingError::AlreadyInitialized`] on a second call.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_current_span(true))),
    };

    tracing_subscriber::registry().with(filter).with(pretty).with(json).try_init()?;
    tracing::debug!(level = %config.level, format = ?config.format, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_info_pretty() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn format_deserializes_lowercase() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","format":"json"}"#).expect("parse");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn invalid_directive_is_rejected() {
        let config =
            LoggingConfig { level: "rampart=verbose".to_string(), format: LogFormat::Pretty };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(build_filter(&config), Err(LoggingError::InvalidFilter(_))));
        }
    }

    /// Validates that a second initialization reports an error.
    ///
    /// Assertions:
    /// - Ensures the second call returns `AlreadyInitialized`.
    #[test]
    fn second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(LoggingError::AlreadyInitialized(_))));
    }
}
