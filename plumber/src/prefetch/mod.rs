//! Concurrent read-ahead for record sequences.
//!
//! This module provides:
//! - A bounded blocking buffer
//! - A lock-guarded source shared by workers
//! - The worker pool and its merged output
//! - Pool sizing configuration

mod buffer;
mod config;
mod pool;
mod source;

pub use buffer::BoundedBuffer;
pub use config::{available_parallelism, PrefetchConfig};
pub use pool::{prefetch, PrefetchPool, PrefetchStream, Prefetcher};
pub use source::{Pulled, SharedSource};
