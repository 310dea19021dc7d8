//! Logging configuration and setup.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Errors raised while installing the global subscriber.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Global subscriber already installed")]
    AlreadyInitialized,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON format for structured logging.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Include source file location.
    pub include_location: bool,
    /// Include span events (enter, close).
    pub include_span_events: bool,
    /// Custom filter string (e.g., "idscan_sw=debug,reqwest=warn").
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            include_location: false,
            include_span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Verbose configuration for local debugging.
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            include_location: true,
            include_span_events: true,
            ..Default::default()
        }
    }

    /// JSON output at info level.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            ..Default::default()
        }
    }

    /// Set a custom filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Resolve the filter: explicit filter first, then `RUST_LOG`, then `level`.
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match self.filter {
            Some(ref custom) => {
                EnvFilter::try_new(custom).map_err(|e| LoggingError::InvalidFilter {
                    filter: custom.clone(),
                    message: e.to_string(),
                })
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))),
        }
    }
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = config.env_filter()?;

    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_span_events(span_events))
            .try_init(),
    };

    installed.map_err(|_| LoggingError::AlreadyInitialized)
}
