//! # Plumber
//!
//! Lazily evaluated record pipelines with optional concurrent prefetching.
//!
//! Plumber provides:
//!
//! - **Stages**: named record-to-record transforms, either [`Stage`]
//!   implementations or functions wrapped with [`adapt`]
//! - **Preconditions**: guards that bypass a stage for records it should not touch
//! - **Lazy composition**: records flow through every stage one at a time,
//!   only as fast as the consumer pulls
//! - **Prefetching**: a bounded pool of worker threads that drains the
//!   composed sequence ahead of the consumer
//! - **Structured events**: run and worker lifecycle events through an [`EventSink`]
//!
//! ## Quick Start
//!
//! ```
//! use plumber::prelude::*;
//!
//! let pipeline = Pipeline::builder("clean")
//!     .adapted(adapt("trim", |s: String| Ok(s.trim().to_string())))
//!     .adapted(adapt("upper", |s: String| Ok(s.to_uppercase())))
//!     .build()?;
//!
//! let out: Vec<String> = pipeline
//!     .run(vec!["  foo  ".to_string()], RunOptions::new().with_prefetch(4))?
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(out, vec!["FOO".to_string()]);
//! # Ok::<(), plumber::errors::PipelineError>(())
//! ```
//!
//! [`Stage`]: stages::Stage
//! [`adapt`]: stages::adapt
//! [`EventSink`]: events::EventSink

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod prefetch;
pub mod stages;
pub mod testing;
pub mod utils;

#[cfg(feature = "async")]
pub mod stream;

pub use prefetch::prefetch;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{LoggingConfig, PlumberConfig};
    pub use crate::errors::{
        ContractErrorInfo, PipelineError, PipelineValidationError, PreconditionError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RunEvents,
    };
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineOutput, RunOptions};
    pub use crate::prefetch::{prefetch, PrefetchConfig, PrefetchPool, Prefetcher};
    pub use crate::stages::{
        adapt, precondition, FnStage, Guarded, Records, Stage, StageArg, StageExt,
    };
}
