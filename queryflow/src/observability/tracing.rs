//! Tracing subscriber setup and timing helpers.
//!
//! Library code only emits `tracing` events; binaries and tests decide where
//! they go by calling [`init_tracing`] once at startup.

use crate::errors::InitializationError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output.
    #[default]
    Pretty,
    /// Single-line human readable output.
    Compact,
    /// One JSON object per event.
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

/// The `logging` section of the runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `queryflow=debug,warn`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builds the filter. `RUST_LOG` wins over the configured level.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured level is not a valid directive.
    pub fn env_filter(&self) -> Result<EnvFilter, InitializationError> {
        EnvFilter::try_from_default_env().or_else(|_| {
            EnvFilter::try_new(&self.level).map_err(|err| {
                InitializationError::new(format!("invalid log level '{}': {err}", self.level))
            })
        })
    }
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if the level does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), InitializationError> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    installed.map_err(|err| {
        InitializationError::new(format!("failed to install tracing subscriber: {err}"))
    })
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer and returns the duration.
    #[must_use]
    pub fn finish(self) -> u64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_from_yaml() {
        let config: LoggingConfig = serde_yaml::from_str("format: json").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);

        let config: LoggingConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_level_is_reported() {
        let config = LoggingConfig::default().with_level("queryflow=verbose");
        if std::env::var("RUST_LOG").is_err() {
            let err = config.env_filter().unwrap_err();
            assert!(err.message.contains("invalid log level"));
        }
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let config = LoggingConfig::default().with_format(LogFormat::Compact);
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("step_1");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "step_1");
        assert!(timer.finish() >= 10);
    }
}
