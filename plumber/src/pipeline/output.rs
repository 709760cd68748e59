//! The lazy output of a pipeline run.

use crate::errors::PipelineError;
use crate::events::{RunEvents, RUN_COMPLETED};
use crate::stages::Records;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

/// Records produced by one pipeline run.
///
/// Each call to `next` pulls work through the pipeline; a fault for one
/// record is yielded in its place and later records still follow.
pub struct PipelineOutput<T> {
    records: Records<T>,
    events: RunEvents,
    yielded: usize,
    failed: usize,
    cancelled: bool,
    finished: bool,
}

impl<T> PipelineOutput<T> {
    pub(crate) fn new(records: Records<T>, events: RunEvents) -> Self {
        Self {
            records,
            events,
            yielded: 0,
            failed: 0,
            cancelled: false,
            finished: false,
        }
    }

    /// Returns the id tagging this run's events.
    pub const fn run_id(&self) -> Uuid {
        self.events.run_id()
    }

    /// Number of records successfully yielded so far.
    pub const fn yielded(&self) -> usize {
        self.yielded
    }

    /// Number of faults yielded so far.
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Returns true if the run was cancelled before its source was exhausted.
    pub const fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T> Iterator for PipelineOutput<T> {
    type Item = Result<T, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.records.next() {
            Some(record) => {
                match &record {
                    Ok(_) => self.yielded += 1,
                    Err(PipelineError::Cancelled(_)) => {
                        self.failed += 1;
                        self.cancelled = true;
                    }
                    Err(_) => self.failed += 1,
                }
                Some(record)
            }
            None => {
                self.finished = true;
                self.events.emit(
                    RUN_COMPLETED,
                    json!({
                        "yielded": self.yielded,
                        "failed": self.failed,
                        "cancelled": self.cancelled,
                    }),
                );
                debug!(
                    run_id = %self.events.run_id(),
                    yielded = self.yielded,
                    failed = self.failed,
                    cancelled = self.cancelled,
                    "Pipeline run completed"
                );
                None
            }
        }
    }
}

#[cfg(feature = "async")]
impl<T: Send + 'static> PipelineOutput<T> {
    /// Converts the output into an async stream.
    ///
    /// The blocking iterator is driven on tokio's blocking thread pool and
    /// up to `buffer` records are handed over through a bounded channel.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn into_stream(
        self,
        buffer: usize,
    ) -> impl futures::Stream<Item = Result<T, PipelineError>> + Send + 'static {
        crate::stream::into_async_stream(self, buffer)
    }
}

impl<T> std::fmt::Debug for PipelineOutput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOutput")
            .field("run_id", &self.events.run_id())
            .field("yielded", &self.yielded)
            .field("failed", &self.failed)
            .field("cancelled", &self.cancelled)
            .field("finished", &self.finished)
            .finish()
    }
}
