//! The prefetch worker pool and its merged output.

use super::buffer::BoundedBuffer;
use super::config::PrefetchConfig;
use super::source::{Pulled, SharedSource};
use crate::cancellation::{CallbackId, CancellationToken};
use crate::errors::PipelineError;
use crate::events::{
    EventSink, NoOpEventSink, RunEvents, POOL_CANCELLED, POOL_STARTED, WORKER_CANCELLED,
    WORKER_FINISHED, WORKER_STARTED,
};
use crate::stages::Records;
use serde_json::json;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, trace, warn};

/// An entry in the prefetch buffer.
enum Slot<T> {
    /// A record pulled from the source, or the fault raised producing it.
    Record(Result<T, PipelineError>),
    /// Completion marker: `worker` found the source exhausted.
    Done { worker: usize, pulled: usize },
}

/// Strategy used by a pipeline to read ahead of its consumer.
pub trait Prefetcher<T>: Send + Sync {
    /// Starts reading `source` ahead into a buffer of `capacity` records.
    ///
    /// # Errors
    ///
    /// Fails before any record is read when the capacity is invalid or the
    /// read-ahead machinery cannot be started.
    fn prefetch(
        &self,
        source: Records<T>,
        capacity: usize,
        events: RunEvents,
    ) -> Result<Records<T>, PipelineError>;
}

/// Starts bounded sets of threads that read a source ahead of its consumer.
///
/// Workers race to pull from one lock-guarded source and push into one
/// shared bounded buffer. The merged output ends once every worker has
/// pushed its completion marker. With more than one worker the output order
/// may differ from the source order.
#[derive(Clone)]
pub struct PrefetchPool {
    config: PrefetchConfig,
    sink: Arc<dyn EventSink>,
}

impl Default for PrefetchPool {
    fn default() -> Self {
        Self::new(PrefetchConfig::default())
    }
}

impl PrefetchPool {
    /// Creates a pool with the given configuration.
    #[must_use]
    pub fn new(config: PrefetchConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the sink used by [`spawn`](Self::spawn).
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the pool configuration.
    #[must_use]
    pub const fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Starts prefetching `source` into a buffer of `capacity` records.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `capacity` is zero, and
    /// [`PipelineError::Spawn`] when a worker thread cannot be started.
    pub fn spawn<T, I>(&self, source: I, capacity: usize) -> Result<PrefetchStream<T>, PipelineError>
    where
        T: Send + 'static,
        I: Iterator<Item = Result<T, PipelineError>> + Send + 'static,
    {
        self.spawn_with_token(source, capacity, Arc::new(CancellationToken::new()))
    }

    /// Like [`spawn`](Self::spawn), but workers stop when `token` is
    /// cancelled.
    ///
    /// Each call runs under its own child token linked to `token`, so one
    /// token can be shared by many runs. Dropping a stream early cancels
    /// only its own run, and the link is removed once the run ends.
    ///
    /// # Errors
    ///
    /// See [`spawn`](Self::spawn).
    pub fn spawn_with_token<T, I>(
        &self,
        source: I,
        capacity: usize,
        token: Arc<CancellationToken>,
    ) -> Result<PrefetchStream<T>, PipelineError>
    where
        T: Send + 'static,
        I: Iterator<Item = Result<T, PipelineError>> + Send + 'static,
    {
        let events = RunEvents::detached(self.sink.clone());
        self.start(Box::new(source), capacity, token, events)
    }

    fn start<T: Send + 'static>(
        &self,
        source: Records<T>,
        capacity: usize,
        parent: Arc<CancellationToken>,
        events: RunEvents,
    ) -> Result<PrefetchStream<T>, PipelineError> {
        self.config.validate(capacity)?;
        let workers = self.config.worker_count(capacity);

        let buffer = Arc::new(BoundedBuffer::new(capacity)?);
        let token = Arc::new(CancellationToken::new());
        {
            let buffer = buffer.clone();
            token.on_cancel(move || buffer.close());
        }
        let link = link_to_parent(&parent, &token);
        let source = Arc::new(SharedSource::new(source));

        for worker in 0..workers {
            let source = source.clone();
            let buffer = buffer.clone();
            let worker_token = token.clone();
            let worker_events = events.clone();

            let mut builder =
                thread::Builder::new().name(format!("{}-{worker}", self.config.thread_name_prefix));
            if let Some(bytes) = self.config.stack_size {
                builder = builder.stack_size(bytes);
            }
            let spawned = builder
                .spawn(move || run_worker(worker, &source, &buffer, &worker_token, &worker_events));

            if let Err(err) = spawned {
                warn!(worker, error = %err, "Failed to spawn prefetch worker, cancelling pool");
                token.cancel("failed to spawn prefetch worker");
                parent.deregister(link);
                return Err(PipelineError::Spawn(err));
            }
        }

        events.emit(POOL_STARTED, json!({ "workers": workers, "capacity": capacity }));
        debug!(run_id = %events.run_id(), workers, capacity, "Prefetch pool started");

        Ok(PrefetchStream {
            buffer,
            live_workers: workers,
            token,
            parent,
            link: Some(link),
            events,
        })
    }
}

impl std::fmt::Debug for PrefetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Prefetcher<T> for PrefetchPool {
    fn prefetch(
        &self,
        source: Records<T>,
        capacity: usize,
        events: RunEvents,
    ) -> Result<Records<T>, PipelineError> {
        let stream = self.start(source, capacity, Arc::new(CancellationToken::new()), events)?;
        Ok(Box::new(stream))
    }
}

/// Cancels `run` whenever `parent` is cancelled, carrying the parent's reason.
fn link_to_parent(parent: &Arc<CancellationToken>, run: &Arc<CancellationToken>) -> CallbackId {
    let parent_ref: Weak<CancellationToken> = Arc::downgrade(parent);
    let run = run.clone();
    parent.on_cancel(move || {
        let reason = parent_ref
            .upgrade()
            .and_then(|parent| parent.reason())
            .unwrap_or_else(|| "parent token cancelled".to_string());
        run.cancel(reason);
    })
}

fn run_worker<T>(
    worker: usize,
    source: &SharedSource<T>,
    buffer: &BoundedBuffer<Slot<T>>,
    token: &CancellationToken,
    events: &RunEvents,
) {
    events.emit(WORKER_STARTED, json!({ "worker": worker }));
    trace!(worker, "Prefetch worker started");

    let mut pulled = 0;
    while !token.is_cancelled() {
        match source.pull(worker) {
            Pulled::Record(record) => {
                if buffer.push(Slot::Record(record)).is_err() {
                    break;
                }
                pulled += 1;
            }
            Pulled::Exhausted => {
                if buffer.push(Slot::Done { worker, pulled }).is_ok() {
                    trace!(worker, pulled, "Prefetch worker reached end of source");
                    return;
                }
                break;
            }
        }
    }

    events.emit(WORKER_CANCELLED, json!({ "worker": worker, "pulled": pulled }));
    debug!(worker, pulled, "Prefetch worker cancelled");
}

/// The merged output of a prefetch pool.
///
/// Yields records as workers deliver them and ends after the last worker's
/// completion marker. Dropping it before that cancels the run, which wakes
/// and stops any worker blocked on a full buffer. When the caller's token
/// cancels the run instead, the buffered records are drained and a single
/// [`PipelineError::Cancelled`] ends the stream.
pub struct PrefetchStream<T> {
    buffer: Arc<BoundedBuffer<Slot<T>>>,
    live_workers: usize,
    token: Arc<CancellationToken>,
    parent: Arc<CancellationToken>,
    link: Option<CallbackId>,
    events: RunEvents,
}

impl<T> PrefetchStream<T> {
    /// Number of workers that have not yet reported completion.
    pub const fn live_workers(&self) -> usize {
        self.live_workers
    }

    /// Returns the token controlling this run's workers.
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    fn unlink(&mut self) {
        if let Some(link) = self.link.take() {
            self.parent.deregister(link);
        }
    }
}

impl<T> Iterator for PrefetchStream<T> {
    type Item = Result<T, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.live_workers > 0 {
            let Some(slot) = self.buffer.pop() else {
                // Closed from outside through the parent token.
                self.live_workers = 0;
                self.unlink();
                let reason = self
                    .token
                    .reason()
                    .unwrap_or_else(|| "prefetch buffer closed".to_string());
                debug!(%reason, "Prefetch run cancelled");
                return Some(Err(PipelineError::Cancelled(reason)));
            };

            match slot {
                Slot::Record(record) => return Some(record),
                Slot::Done { worker, pulled } => {
                    self.live_workers -= 1;
                    self.events.emit(
                        WORKER_FINISHED,
                        json!({ "worker": worker, "pulled": pulled, "remaining": self.live_workers }),
                    );
                    debug!(worker, pulled, remaining = self.live_workers, "Prefetch worker finished");
                    if self.live_workers == 0 {
                        self.unlink();
                    }
                }
            }
        }
        None
    }
}

impl<T> Drop for PrefetchStream<T> {
    fn drop(&mut self) {
        if self.live_workers > 0 {
            self.events
                .emit(POOL_CANCELLED, json!({ "remaining": self.live_workers }));
            debug!(remaining = self.live_workers, "Prefetch output dropped, cancelling workers");
            self.token.cancel("prefetch output dropped before exhaustion");
        }
        self.unlink();
    }
}

impl<T> std::fmt::Debug for PrefetchStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchStream")
            .field("live_workers", &self.live_workers)
            .field("buffered", &self.buffer.len())
            .field("run_id", &self.events.run_id())
            .finish()
    }
}

/// Prefetches `source` with the default pool configuration.
///
/// ```
/// let mut out: Vec<u32> = plumber::prefetch(0..100u32, 8)
///     .unwrap()
///     .map(Result::unwrap)
///     .collect();
/// out.sort_unstable();
/// assert_eq!(out, (0..100).collect::<Vec<_>>());
/// ```
///
/// # Errors
///
/// Fails immediately when `capacity` is zero.
pub fn prefetch<I>(source: I, capacity: usize) -> Result<PrefetchStream<I::Item>, PipelineError>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    PrefetchPool::default().spawn(source.into_iter().map(Ok), capacity)
}
