//! Pipeline builder with validation.

use super::Pipeline;
use crate::config::PlumberConfig;
use crate::errors::PipelineValidationError;
use crate::events::{EventSink, NoOpEventSink};
use crate::prefetch::{PrefetchConfig, PrefetchPool, Prefetcher};
use crate::stages::{FnStage, Stage, StageArg};
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added. Every argument is checked by
/// [`build`](Self::build), so a bad argument is reported before any record
/// flows.
pub struct PipelineBuilder<T> {
    name: String,
    args: Vec<StageArg<T>>,
    sink: Option<Arc<dyn EventSink>>,
    prefetcher: Option<Arc<dyn Prefetcher<T>>>,
    prefetch_config: PrefetchConfig,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            sink: None,
            prefetcher: None,
            prefetch_config: PrefetchConfig::default(),
        }
    }

    /// Appends a stage implementation.
    #[must_use]
    pub fn stage<S>(self, stage: S) -> Self
    where
        S: Stage<T> + 'static,
    {
        self.arg(StageArg::Stage(Arc::new(stage)))
    }

    /// Appends a function adapted with [`adapt`](crate::stages::adapt).
    #[must_use]
    pub fn adapted(self, func: FnStage<T>) -> Self {
        self.arg(StageArg::Adapted(func))
    }

    /// Appends any accepted stage argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<StageArg<T>>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several stage arguments in order.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = StageArg<T>>) -> Self {
        self.args.extend(args);
        self
    }

    /// Sets the sink receiving run and prefetch events.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces the default prefetch pool.
    #[must_use]
    pub fn prefetcher(mut self, prefetcher: Arc<dyn Prefetcher<T>>) -> Self {
        self.prefetcher = Some(prefetcher);
        self
    }

    /// Sets the configuration of the default prefetch pool.
    #[must_use]
    pub fn prefetch_config(mut self, config: PrefetchConfig) -> Self {
        self.prefetch_config = config;
        self
    }

    /// Applies the prefetch section of a loaded configuration.
    #[must_use]
    pub fn config(self, config: &PlumberConfig) -> Self {
        self.prefetch_config(config.prefetch.clone())
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stage arguments added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.args.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first stage argument without a usable
    /// name, or when the prefetch configuration pins zero workers or has a
    /// thread name prefix the OS cannot accept.
    pub fn build(self) -> Result<Pipeline<T>, PipelineValidationError> {
        for (position, arg) in self.args.iter().enumerate() {
            if arg.name().trim().is_empty() {
                return Err(PipelineValidationError::invalid_stage(
                    position,
                    arg.name(),
                    &format!("{} has an empty name", arg.kind()),
                ));
            }
        }

        if let Some(0) = self.prefetch_config.workers {
            return Err(PipelineValidationError::invalid_workers(0));
        }
        if self.prefetch_config.thread_name_prefix.contains('\0') {
            return Err(PipelineValidationError::invalid_thread_name(
                &self.prefetch_config.thread_name_prefix,
            ));
        }

        let sink = self.sink.unwrap_or_else(|| Arc::new(NoOpEventSink));
        let prefetcher = self.prefetcher.unwrap_or_else(|| {
            Arc::new(PrefetchPool::new(self.prefetch_config).with_event_sink(sink.clone()))
        });
        let stages = self.args.into_iter().map(StageArg::into_stage).collect();

        Ok(Pipeline::from_parts(self.name, stages, sink, prefetcher))
    }
}

impl<T> std::fmt::Debug for PipelineBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("prefetch_config", &self.prefetch_config)
            .finish_non_exhaustive()
    }
}
