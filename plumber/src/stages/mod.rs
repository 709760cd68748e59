//! Stage trait and implementations.
//!
//! Stages are the fundamental units of work in a plumber pipeline. Each one
//! turns a record into a record; a pipeline feeds them one after another.

mod pipe;
mod precondition;

pub use pipe::{Pipe, Records};
pub use precondition::{precondition, Guarded, Precondition, StageExt};

use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// A stage receives records one at a time and returns the transformed
/// record. Side effects such as fetching remote resources are up to the
/// implementation.
pub trait Stage<T>: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Transforms a single record.
    ///
    /// # Errors
    ///
    /// Any error is reported to the consumer of the pipeline output at the
    /// position of the record that caused it.
    fn transform(&self, record: T) -> anyhow::Result<T>;
}

impl<T, S> Stage<T> for Arc<S>
where
    S: Stage<T> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        (**self).transform(record)
    }
}

type TransformFn<T> = dyn Fn(T) -> anyhow::Result<T> + Send + Sync;

/// A plain function adapted into a stage.
///
/// Built with [`adapt`]. The function is the adapter's only state.
pub struct FnStage<T> {
    name: String,
    func: Box<TransformFn<T>>,
}

impl<T> FnStage<T> {
    /// Creates a new function-based stage.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl<T> Debug for FnStage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

impl<T> Stage<T> for FnStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        (self.func)(record)
    }
}

/// Adapts a function so it can be used as a pipeline stage.
///
/// ```
/// use plumber::stages::{adapt, Stage};
///
/// let trim = adapt("trim", |s: String| Ok(s.trim().to_string()));
/// assert_eq!(trim.transform("  foo ".to_string()).unwrap(), "foo");
/// ```
pub fn adapt<T, F>(name: impl Into<String>, func: F) -> FnStage<T>
where
    F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
{
    FnStage::new(name, func)
}

/// An argument accepted by the pipeline constructor.
///
/// Only stage implementations and adapted functions are representable, so a
/// bare closure cannot reach the pipeline:
///
/// ```compile_fail
/// use plumber::pipeline::PipelineBuilder;
///
/// let upper = |s: String| Ok::<_, anyhow::Error>(s.to_uppercase());
/// let _ = PipelineBuilder::<String>::new("p").arg(upper);
/// ```
pub enum StageArg<T> {
    /// A stage implementation.
    Stage(Arc<dyn Stage<T>>),
    /// A function wrapped with [`adapt`].
    Adapted(FnStage<T>),
}

impl<T: 'static> StageArg<T> {
    /// Returns the name of the wrapped stage.
    pub fn name(&self) -> &str {
        match self {
            Self::Stage(stage) => stage.name(),
            Self::Adapted(func) => func.name(),
        }
    }

    /// Returns a short label for the kind of argument.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stage(_) => "stage",
            Self::Adapted(_) => "adapted function",
        }
    }

    /// Converts the argument into a shareable stage.
    pub fn into_stage(self) -> Arc<dyn Stage<T>> {
        match self {
            Self::Stage(stage) => stage,
            Self::Adapted(func) => Arc::new(func),
        }
    }
}

impl<T> Debug for StageArg<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage(stage) => f.debug_tuple("Stage").field(stage).finish(),
            Self::Adapted(func) => f.debug_tuple("Adapted").field(func).finish(),
        }
    }
}

impl<T> From<Arc<dyn Stage<T>>> for StageArg<T> {
    fn from(stage: Arc<dyn Stage<T>>) -> Self {
        Self::Stage(stage)
    }
}

impl<T> From<FnStage<T>> for StageArg<T> {
    fn from(func: FnStage<T>) -> Self {
        Self::Adapted(func)
    }
}

/// A stage that returns every record unchanged.
#[derive(Debug, Clone)]
pub struct IdentityStage {
    name: String,
}

impl IdentityStage {
    /// Creates a new identity stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<T> Stage<T> for IdentityStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        Ok(record)
    }
}
