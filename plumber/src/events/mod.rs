//! Structured events emitted by pipeline runs.
//!
//! The pipeline and the prefetch pool report what they do through an
//! injected [`EventSink`]. [`RunEvents`] stamps every event with the run id
//! and a timestamp before handing it to the sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::{generate_uuid, iso_timestamp};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Emitted when a pipeline run starts.
pub const RUN_STARTED: &str = "pipeline.run_started";
/// Emitted when the pipeline output is exhausted.
pub const RUN_COMPLETED: &str = "pipeline.run_completed";
/// Emitted once the prefetch workers have been started.
pub const POOL_STARTED: &str = "prefetch.pool_started";
/// Emitted when a prefetch worker begins pulling.
pub const WORKER_STARTED: &str = "prefetch.worker_started";
/// Emitted when the consumer sees a worker's completion marker.
pub const WORKER_FINISHED: &str = "prefetch.worker_finished";
/// Emitted when a worker stops because the run was cancelled.
pub const WORKER_CANCELLED: &str = "prefetch.worker_cancelled";
/// Emitted when the merged output is dropped before exhaustion.
pub const POOL_CANCELLED: &str = "prefetch.cancelled";

/// Event emitter scoped to one pipeline run.
#[derive(Clone)]
pub struct RunEvents {
    sink: Arc<dyn EventSink>,
    run_id: Uuid,
}

impl RunEvents {
    /// Creates an emitter for the given run.
    pub fn new(sink: Arc<dyn EventSink>, run_id: Uuid) -> Self {
        Self { sink, run_id }
    }

    /// Creates an emitter with a fresh run id.
    pub fn detached(sink: Arc<dyn EventSink>) -> Self {
        Self::new(sink, generate_uuid())
    }

    /// Creates an emitter that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::detached(Arc::new(NoOpEventSink))
    }

    /// Returns the run id.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Emits an event, merging `data` into the run envelope.
    pub fn emit(&self, event_type: &str, data: Value) {
        let mut envelope = serde_json::Map::new();
        envelope.insert("run_id".to_string(), Value::String(self.run_id.to_string()));
        envelope.insert("timestamp".to_string(), Value::String(iso_timestamp()));
        if let Value::Object(fields) = data {
            envelope.extend(fields);
        }
        self.sink.try_emit(event_type, Some(Value::Object(envelope)));
    }
}

impl std::fmt::Debug for RunEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEvents").field("run_id", &self.run_id).finish_non_exhaustive()
    }
}
