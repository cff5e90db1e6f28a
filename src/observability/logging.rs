//! Structured logging.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter directives when neither `RUST_LOG` nor the config set one.
pub const DEFAULT_FILTER: &str = "haul=info";

/// Filter directives used with `--verbose`.
pub const VERBOSE_FILTER: &str = "haul=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to pretty output.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Optional log file; stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_settings(None, false)
    }
}

impl LoggingConfig {
    /// Builds the logging configuration.
    ///
    /// `--verbose` wins over `RUST_LOG`, which wins over the config filter.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let format = settings
            .and_then(|s| s.format.as_deref())
            .map(LogFormat::parse)
            .unwrap_or_default();
        let file = settings.and_then(|s| s.file.clone());
        let configured = settings
            .and_then(|s| s.filter.as_deref())
            .unwrap_or(DEFAULT_FILTER);

        let filter = if verbose {
            EnvFilter::new(VERBOSE_FILTER)
        } else {
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(configured))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        };

        Self {
            format,
            filter,
            file,
        }
    }
}
