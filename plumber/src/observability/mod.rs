//! Tracing setup.
//!
//! The library itself only emits `tracing` events; binaries and tests call
//! [`init_tracing`] once to install a subscriber.

use crate::config::LoggingConfig;
use crate::errors::PipelineError;
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber configured by `config`.
///
/// # Errors
///
/// Fails when the filter directive cannot be parsed or a global subscriber
/// is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        PipelineError::Internal(format!("invalid log filter '{}': {e}", config.filter))
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| PipelineError::Internal(format!("failed to install subscriber: {e}")))
}
