//! Prefetch pool sizing.

use crate::errors::PipelineValidationError;
use serde::{Deserialize, Serialize};

/// Configuration for the prefetch worker pool.
///
/// By default the worker count follows the buffer capacity, capped at
/// `worker_multiplier` workers per available CPU. Setting `workers` pins the
/// count independently of the capacity; it is still never larger than the
/// capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Fixed number of workers, overriding the derived count.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Workers allowed per available CPU when the count is derived.
    #[serde(default = "default_worker_multiplier")]
    pub worker_multiplier: usize,

    /// Prefix for worker thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// Stack size for worker threads, in bytes; the platform default when unset.
    #[serde(default)]
    pub stack_size: Option<usize>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: None,
            worker_multiplier: default_worker_multiplier(),
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: None,
        }
    }
}

const fn default_worker_multiplier() -> usize {
    2
}

fn default_thread_name_prefix() -> String {
    "plumber-prefetch".to_string()
}

/// Returns the platform's parallelism hint, falling back to one.
#[must_use]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

impl PrefetchConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the per-CPU worker multiplier.
    #[must_use]
    pub const fn with_worker_multiplier(mut self, multiplier: usize) -> Self {
        self.worker_multiplier = multiplier;
        self
    }

    /// Sets the worker thread stack size in bytes.
    #[must_use]
    pub const fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Checks the configuration against a requested buffer capacity.
    ///
    /// # Errors
    ///
    /// Fails when `capacity` is zero, a pinned worker count is zero, or the
    /// thread name prefix contains a NUL byte.
    pub fn validate(&self, capacity: usize) -> Result<(), PipelineValidationError> {
        if capacity == 0 {
            return Err(PipelineValidationError::invalid_capacity(capacity));
        }
        if let Some(0) = self.workers {
            return Err(PipelineValidationError::invalid_workers(0));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(PipelineValidationError::invalid_thread_name(
                &self.thread_name_prefix,
            ));
        }
        Ok(())
    }

    /// Number of workers to start for a buffer of `capacity`.
    #[must_use]
    pub fn worker_count(&self, capacity: usize) -> usize {
        let ceiling = self.workers.unwrap_or_else(|| {
            self.worker_multiplier.max(1).saturating_mul(available_parallelism())
        });
        capacity.min(ceiling).max(1)
    }
}
