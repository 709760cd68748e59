//! Cooperative cancellation for prefetch workers.

mod token;

pub use token::{CallbackId, CancellationToken};
