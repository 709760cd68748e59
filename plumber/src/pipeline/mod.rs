//! Pipeline building and execution.
//!
//! This module provides:
//! - The pipeline builder with construction-time validation
//! - The driver that chains stages and optionally prefetches
//! - The lazy output sequence of a run

mod builder;
mod output;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use output::PipelineOutput;

use crate::errors::{PipelineError, PipelineValidationError};
use crate::events::{EventSink, RunEvents, RUN_STARTED};
use crate::prefetch::Prefetcher;
use crate::stages::{Pipe, Records, Stage, StageArg};
use crate::utils::generate_uuid;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Per-run options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Prefetch buffer capacity; `0` disables prefetching.
    #[serde(default)]
    pub prefetch: usize,
}

impl RunOptions {
    /// Options for a plain, strictly ordered run.
    #[must_use]
    pub const fn new() -> Self {
        Self { prefetch: 0 }
    }

    /// Sets the prefetch buffer capacity.
    #[must_use]
    pub const fn with_prefetch(mut self, capacity: usize) -> Self {
        self.prefetch = capacity;
        self
    }
}

/// An ordered chain of stages.
///
/// A run feeds the input through every stage lazily: nothing is transformed
/// until the output is pulled. With [`RunOptions::prefetch`] above zero the
/// chain is drained ahead of the consumer by the pipeline's [`Prefetcher`],
/// which may reorder records.
pub struct Pipeline<T> {
    name: String,
    stages: Vec<Arc<dyn Stage<T>>>,
    sink: Arc<dyn EventSink>,
    prefetcher: Arc<dyn Prefetcher<T>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Creates a pipeline from stage arguments with default settings.
    ///
    /// # Errors
    ///
    /// Fails if any argument is not a usable stage.
    pub fn new(stages: Vec<StageArg<T>>) -> Result<Self, PipelineValidationError> {
        PipelineBuilder::new("pipeline").args(stages).build()
    }

    /// Starts building a named pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<T> {
        PipelineBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        stages: Vec<Arc<dyn Stage<T>>>,
        sink: Arc<dyn EventSink>,
        prefetcher: Arc<dyn Prefetcher<T>>,
    ) -> Self {
        Self {
            name,
            stages,
            sink,
            prefetcher,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Chains every stage over `source` without prefetching.
    #[must_use]
    pub fn compose(&self, source: Records<T>) -> Records<T> {
        self.stages.iter().fold(source, |upstream, stage| {
            let piped: Records<T> = Box::new(Pipe::feed(stage.clone(), upstream));
            piped
        })
    }

    /// Runs the pipeline over `data`.
    ///
    /// ```
    /// use plumber::prelude::*;
    ///
    /// let pipeline = Pipeline::builder("words")
    ///     .adapted(adapt("trim", |s: String| Ok(s.trim().to_string())))
    ///     .adapted(adapt("upper", |s: String| Ok(s.to_uppercase())))
    ///     .build()
    ///     .unwrap();
    ///
    /// let out: Vec<String> = pipeline
    ///     .run(vec![" a ".to_string(), "b ".to_string()], RunOptions::new())
    ///     .unwrap()
    ///     .map(Result::unwrap)
    ///     .collect();
    /// assert_eq!(out, vec!["A", "B"]);
    /// ```
    ///
    /// # Errors
    ///
    /// Prefetch setup errors (such as an unusable worker configuration) are
    /// returned before any record is read. Per-record faults are yielded by
    /// the output.
    pub fn run<I>(&self, data: I, options: RunOptions) -> Result<PipelineOutput<T>, PipelineError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let events = RunEvents::new(self.sink.clone(), generate_uuid());
        events.emit(
            RUN_STARTED,
            json!({
                "pipeline": self.name,
                "stages": self.stage_names(),
                "prefetch": options.prefetch,
            }),
        );
        debug!(
            run_id = %events.run_id(),
            pipeline = %self.name,
            stages = self.stages.len(),
            prefetch = options.prefetch,
            "Pipeline run started"
        );

        let composed = self.compose(Box::new(data.into_iter().map(Ok)));
        let records = if options.prefetch > 0 {
            self.prefetcher
                .prefetch(composed, options.prefetch, events.clone())?
        } else {
            composed
        };

        Ok(PipelineOutput::new(records, events))
    }

    /// Runs the pipeline over a single record.
    ///
    /// Use this when the input is one structured value that must not be
    /// iterated into pieces.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_rewrapped(&self, record: T, options: RunOptions) -> Result<PipelineOutput<T>, PipelineError> {
        self.run(std::iter::once(record), options)
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}
