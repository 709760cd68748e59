//! Precondition guards for stages.
//!
//! A guard runs before a stage's transform. When it reports
//! [`PreconditionError::Unmet`] the stage is bypassed and the record passes
//! through unchanged; any other guard failure is raised as a transform error.

use super::Stage;
use crate::errors::PreconditionError;
use std::fmt::Debug;
use tracing::trace;

type FreeGuard<T> = dyn Fn(&T) -> Result<(), PreconditionError> + Send + Sync;
type BoundGuard<S, T> = dyn Fn(&S, &T) -> Result<(), PreconditionError> + Send + Sync;

/// A guard predicate attached to a stage.
pub enum Precondition<S, T> {
    /// A predicate over the record alone.
    Free(Box<FreeGuard<T>>),
    /// A predicate that also sees the stage it guards.
    Bound(Box<BoundGuard<S, T>>),
}

impl<S, T> Precondition<S, T> {
    /// Creates a free-standing guard.
    pub fn free<F>(guard: F) -> Self
    where
        F: Fn(&T) -> Result<(), PreconditionError> + Send + Sync + 'static,
    {
        Self::Free(Box::new(guard))
    }

    /// Creates a guard bound to the stage it protects.
    pub fn bound<F>(guard: F) -> Self
    where
        F: Fn(&S, &T) -> Result<(), PreconditionError> + Send + Sync + 'static,
    {
        Self::Bound(Box::new(guard))
    }

    fn check(&self, stage: &S, record: &T) -> Result<(), PreconditionError> {
        match self {
            Self::Free(guard) => guard(record),
            Self::Bound(guard) => guard(stage, record),
        }
    }
}

impl<S, T> Debug for Precondition<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free(_) => f.write_str("Precondition::Free"),
            Self::Bound(_) => f.write_str("Precondition::Bound"),
        }
    }
}

/// A stage whose transform only runs when its precondition holds.
pub struct Guarded<S, T> {
    inner: S,
    guard: Precondition<S, T>,
}

impl<S: Debug, T> Debug for Guarded<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("inner", &self.inner)
            .field("guard", &self.guard)
            .finish()
    }
}

impl<S, T> Guarded<S, T>
where
    S: Stage<T>,
{
    /// Wraps `inner` with `guard`.
    pub fn new(inner: S, guard: Precondition<S, T>) -> Self {
        Self { inner, guard }
    }

    /// Returns the wrapped stage.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S, T> Stage<T> for Guarded<S, T>
where
    S: Stage<T>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        match self.guard.check(&self.inner, &record) {
            Ok(()) => self.inner.transform(record),
            Err(PreconditionError::Unmet(reason)) => {
                trace!(stage = %self.inner.name(), %reason, "Precondition unmet, bypassing stage");
                Ok(record)
            }
            Err(PreconditionError::Failed(err)) => Err(err),
        }
    }
}

/// Extension methods for attaching preconditions to stages.
pub trait StageExt<T>: Stage<T> + Sized {
    /// Guards the stage with a predicate over the record.
    fn with_precondition<F>(self, guard: F) -> Guarded<Self, T>
    where
        F: Fn(&T) -> Result<(), PreconditionError> + Send + Sync + 'static,
    {
        Guarded::new(self, Precondition::free(guard))
    }

    /// Guards the stage with a predicate that can inspect the stage itself.
    fn with_bound_precondition<F>(self, guard: F) -> Guarded<Self, T>
    where
        F: Fn(&Self, &T) -> Result<(), PreconditionError> + Send + Sync + 'static,
    {
        Guarded::new(self, Precondition::bound(guard))
    }
}

impl<T, S: Stage<T>> StageExt<T> for S {}

/// Decorates a transform function with a guard.
///
/// The returned function checks `guard` first and returns the record
/// untouched when the precondition is unmet. Pair it with
/// [`adapt`](super::adapt) to build a guarded function stage.
///
/// ```
/// use plumber::errors::PreconditionError;
/// use plumber::stages::precondition;
///
/// let shout = precondition(
///     |s: &String| {
///         if s.is_empty() {
///             Err(PreconditionError::unmet("empty"))
///         } else {
///             Ok(())
///         }
///     },
///     |s: String| Ok(s.to_uppercase()),
/// );
/// assert_eq!(shout(String::new()).unwrap(), "");
/// assert_eq!(shout("hi".to_string()).unwrap(), "HI");
/// ```
pub fn precondition<T, P, F>(guard: P, transform: F) -> impl Fn(T) -> anyhow::Result<T> + Send + Sync
where
    P: Fn(&T) -> Result<(), PreconditionError> + Send + Sync,
    F: Fn(T) -> anyhow::Result<T> + Send + Sync,
{
    move |record: T| match guard(&record) {
        Ok(()) => transform(record),
        Err(PreconditionError::Unmet(_)) => Ok(record),
        Err(PreconditionError::Failed(err)) => Err(err),
    }
}
