//! Testing utilities for plumber pipelines.
//!
//! Instrumented stages for asserting how often, and on which threads,
//! transforms ran.

mod mocks;

pub use mocks::{FailingStage, RecordingStage, SlowStage};
