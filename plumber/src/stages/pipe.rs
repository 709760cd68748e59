//! A stage fed with an upstream record sequence.

use super::Stage;
use crate::errors::PipelineError;
use std::fmt::Debug;
use std::sync::Arc;

/// A lazy, boxed sequence of record results.
pub type Records<T> = Box<dyn Iterator<Item = Result<T, PipelineError>> + Send>;

/// A stage bound to its upstream sequence.
///
/// Iterating a `Pipe` pulls exactly one upstream record per output record,
/// so chaining pipes never reads ahead of the consumer. Upstream errors are
/// passed through without reaching the stage.
pub struct Pipe<T> {
    stage: Arc<dyn Stage<T>>,
    upstream: Records<T>,
}

impl<T> Pipe<T> {
    /// Feeds `stage` with `upstream`.
    pub fn feed(stage: Arc<dyn Stage<T>>, upstream: Records<T>) -> Self {
        Self { stage, upstream }
    }

    /// Returns the name of the stage behind this pipe.
    pub fn stage_name(&self) -> &str {
        self.stage.name()
    }
}

impl<T> Debug for Pipe<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe").field("stage", &self.stage).finish_non_exhaustive()
    }
}

impl<T> Iterator for Pipe<T> {
    type Item = Result<T, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.upstream.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(err)),
        };

        Some(
            self.stage
                .transform(record)
                .map_err(|source| PipelineError::stage(self.stage.name(), source)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.upstream.size_hint()
    }
}
