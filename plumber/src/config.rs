//! Crate configuration.
//!
//! Configuration can be built in code, parsed from JSON, or read from the
//! environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PLUMBER_PREFETCH_WORKERS` | `prefetch.workers` |
//! | `PLUMBER_PREFETCH_MULTIPLIER` | `prefetch.worker_multiplier` |
//! | `PLUMBER_LOG` | `logging.filter` |
//! | `PLUMBER_LOG_JSON` | `logging.json` |

use crate::errors::PipelineError;
use crate::prefetch::PrefetchConfig;
use serde::{Deserialize, Serialize};

/// Logging configuration consumed by [`init_tracing`](crate::observability::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `"plumber=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlumberConfig {
    /// Prefetch pool sizing.
    #[serde(default)]
    pub prefetch: PrefetchConfig,

    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PlumberConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefetch section.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: PrefetchConfig) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Sets the logging section.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] when the document is malformed.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(raw)
            .map_err(|e| PipelineError::Internal(format!("invalid configuration: {e}")))
    }

    /// Reads the configuration from `PLUMBER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Fails when a numeric or boolean variable cannot be parsed.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("PLUMBER_PREFETCH_WORKERS") {
            config.prefetch.workers = Some(parse_var("PLUMBER_PREFETCH_WORKERS", &raw)?);
        }
        if let Some(raw) = lookup("PLUMBER_PREFETCH_MULTIPLIER") {
            config.prefetch.worker_multiplier = parse_var("PLUMBER_PREFETCH_MULTIPLIER", &raw)?;
        }
        if let Some(filter) = lookup("PLUMBER_LOG") {
            config.logging.filter = filter;
        }
        if let Some(raw) = lookup("PLUMBER_LOG_JSON") {
            config.logging.json = parse_var("PLUMBER_LOG_JSON", &raw)?;
        }

        Ok(config)
    }
}

fn parse_var<V>(key: &str, raw: &str) -> Result<V, PipelineError>
where
    V: std::str::FromStr,
    V::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| PipelineError::Internal(format!("invalid value for {key}: {e}")))
}
