//! Bounded blocking FIFO shared by prefetch workers and the consumer.

use crate::errors::PipelineValidationError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// A bounded, thread-safe FIFO queue.
///
/// `push` blocks while the queue holds `capacity` items and `pop` blocks
/// while it is empty. Closing the buffer wakes every waiter: pending pushes
/// hand their item back and `pop` drains what is left before returning
/// `None`.
pub struct BoundedBuffer<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// A capacity of zero is rejected with `PLUMBER-002-CAPACITY`.
    pub fn new(capacity: usize) -> Result<Self, PipelineValidationError> {
        if capacity == 0 {
            return Err(PipelineValidationError::invalid_capacity(capacity));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Appends an item, waiting for space if the buffer is full.
    ///
    /// # Errors
    ///
    /// Returns the item if the buffer was closed before it could be queued.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        while state.queue.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(item);
        }
        state.queue.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, waiting until one is available.
    ///
    /// Returns `None` once the buffer is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Closes the buffer and wakes every blocked producer and consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of queued items.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity)
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}
