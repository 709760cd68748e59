//! The lock-guarded source shared by all prefetch workers.

use crate::errors::PipelineError;
use crate::stages::Records;
use crate::utils::panic_message;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result of one pull from a [`SharedSource`].
#[derive(Debug)]
pub enum Pulled<T> {
    /// The next record, or the fault raised while producing it.
    Record(Result<T, PipelineError>),
    /// The source has no more records.
    Exhausted,
}

struct Cursor<T> {
    records: Records<T>,
    exhausted: bool,
}

/// A record source guarded by a single mutex.
///
/// Every pull checks for exhaustion and advances the iterator inside one
/// critical section, so each source record is handed to exactly one worker.
/// The source is fused: after the first `Exhausted` every later pull reports
/// exhaustion without touching the iterator again.
pub struct SharedSource<T> {
    cursor: Mutex<Cursor<T>>,
}

impl<T> SharedSource<T> {
    /// Wraps `records` for shared pulling.
    pub fn new(records: Records<T>) -> Self {
        Self {
            cursor: Mutex::new(Cursor {
                records,
                exhausted: false,
            }),
        }
    }

    /// Pulls the next record on behalf of `worker`.
    ///
    /// A panic raised by the iterator (for instance inside a stage
    /// transform) is caught, reported as [`PipelineError::WorkerPanicked`],
    /// and exhausts the source, since the iterator state can no longer be
    /// trusted.
    pub fn pull(&self, worker: usize) -> Pulled<T> {
        let mut cursor = self.cursor.lock();
        if cursor.exhausted {
            return Pulled::Exhausted;
        }

        match catch_unwind(AssertUnwindSafe(|| cursor.records.next())) {
            Ok(Some(record)) => Pulled::Record(record),
            Ok(None) => {
                cursor.exhausted = true;
                Pulled::Exhausted
            }
            Err(payload) => {
                cursor.exhausted = true;
                Pulled::Record(Err(PipelineError::WorkerPanicked {
                    worker,
                    message: panic_message(payload.as_ref()),
                }))
            }
        }
    }

    /// Returns true once the source has reported exhaustion.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.lock().exhausted
    }
}

impl<T> std::fmt::Debug for SharedSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSource")
            .field("exhausted", &self.is_exhausted())
            .finish_non_exhaustive()
    }
}
