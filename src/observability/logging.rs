//! # Structured Logging
//!
//! Installs the global `tracing` subscriber from [`LogConfig`]: JSON or text
//! output, filtered by `RUST_LOG` when set and by the configured level otherwise.

use tracing::{warn, Level};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::core::error::{CacheError, CacheResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Parse a configured log level
pub fn parse_level(level: &str) -> CacheResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(CacheError::config(format!("Unknown log level: {}", other))),
    }
}

/// Initialize the tracing subscriber.
///
/// A subscriber that is already installed (tests, embedding hosts) is left in
/// place.
pub fn init_logging(config: &LogConfig) -> CacheResult<()> {
    let level = parse_level(&config.level)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("warn").unwrap(), Level::WARN);
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LogConfig {
            level: "debug".to_string(),
            format: LogFormat::Text,
        };

        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&LogConfig::default()).is_ok());
    }

    #[test]
    fn test_init_logging_rejects_unknown_level() {
        let config = LogConfig {
            level: "loud".to_string(),
            format: LogFormat::Json,
        };

        assert!(matches!(init_logging(&config), Err(CacheError::Configuration { .. })));
    }
}
