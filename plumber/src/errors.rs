//! Error types for the plumber pipeline.
//!
//! Construction problems are reported as [`PipelineValidationError`] before
//! any record flows. Per-record faults travel through the output sequence as
//! [`PipelineError`] values, and [`PreconditionError`] is the signal a guard
//! uses to bypass a stage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Error code for a stage argument rejected at build time.
pub const INVALID_STAGE: &str = "PLUMBER-001-INVALID_STAGE";
/// Error code for a prefetch buffer capacity of zero.
pub const INVALID_CAPACITY: &str = "PLUMBER-002-CAPACITY";
/// Error code for a pinned worker count of zero.
pub const INVALID_WORKERS: &str = "PLUMBER-003-WORKERS";
/// Error code for a worker thread name the OS cannot accept.
pub const INVALID_THREAD_NAME: &str = "PLUMBER-004-THREAD_NAME";

/// The main error type for pipeline runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline or prefetch pool was misconfigured.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A stage transform failed for one record.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// The fault raised by the stage.
        #[source]
        source: anyhow::Error,
    },

    /// A prefetch worker panicked while pulling from the source.
    #[error("Prefetch worker {worker} panicked: {message}")]
    WorkerPanicked {
        /// Index of the worker that observed the panic.
        worker: usize,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The run was cancelled through its token before every worker finished.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// The operating system refused to start a prefetch worker.
    #[error("Failed to spawn prefetch worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Wraps a stage fault with the name of the stage that raised it.
    pub fn stage(stage: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Stage {
            stage: stage.into(),
            source,
        }
    }

    /// Returns the contract code when this is a validation error.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Validation(err) => err.error_info.as_ref().map(|info| info.code.as_str()),
            _ => None,
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PLUMBER-002-CAPACITY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline or prefetch pool cannot be constructed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<Box<ContractErrorInfo>>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(Box::new(info));
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Rejects a stage argument at `position` in the constructor list.
    #[must_use]
    pub fn invalid_stage(position: usize, name: &str, reason: &str) -> Self {
        Self::new(format!(
            "Invalid stage argument at position {position} ('{name}'): {reason}"
        ))
        .with_stages(vec![name.to_string()])
        .with_error_info(
            ContractErrorInfo::new(INVALID_STAGE, reason.to_string())
                .with_fix_hint("Pass a Stage implementation or a function wrapped with `adapt`.")
                .with_context_entry("position", position.to_string()),
        )
    }

    /// Rejects a prefetch buffer of capacity zero.
    #[must_use]
    pub fn invalid_capacity(capacity: usize) -> Self {
        Self::new(format!(
            "Prefetch buffer capacity must be at least 1, got {capacity}"
        ))
        .with_error_info(
            ContractErrorInfo::new(INVALID_CAPACITY, "Prefetch buffer capacity is zero")
                .with_fix_hint("Use a capacity of 1 or more, or run without prefetching."),
        )
    }

    /// Rejects a worker thread name prefix containing a NUL byte.
    #[must_use]
    pub fn invalid_thread_name(prefix: &str) -> Self {
        Self::new(format!(
            "Prefetch thread name prefix may not contain NUL bytes, got {prefix:?}"
        ))
        .with_error_info(
            ContractErrorInfo::new(INVALID_THREAD_NAME, "Thread name prefix contains a NUL byte")
                .with_fix_hint("Remove '\\0' from `thread_name_prefix`."),
        )
    }

    /// Rejects a pinned worker count of zero.
    #[must_use]
    pub fn invalid_workers(workers: usize) -> Self {
        Self::new(format!("Prefetch worker count must be at least 1, got {workers}"))
            .with_error_info(
                ContractErrorInfo::new(INVALID_WORKERS, "Prefetch worker count is zero")
                    .with_fix_hint("Leave `workers` unset to derive it from the capacity."),
            )
    }
}

/// Outcome of a precondition guard that did not pass.
#[derive(Debug, Error)]
pub enum PreconditionError {
    /// The record does not meet the precondition; the stage is bypassed.
    #[error("Unmet precondition: {0}")]
    Unmet(String),

    /// The guard itself failed; the fault propagates to the caller.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl PreconditionError {
    /// Creates an unmet precondition signal.
    pub fn unmet(reason: impl Into<String>) -> Self {
        Self::Unmet(reason.into())
    }

    /// Returns true if this is the bypass signal.
    #[must_use]
    pub const fn is_unmet(&self) -> bool {
        matches!(self, Self::Unmet(_))
    }
}
