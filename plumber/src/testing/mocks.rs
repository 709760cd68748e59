//! Mock stages for testing.

use parking_lot::Mutex;
use rand::Rng;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::stages::Stage;

type TransformFn<T> = dyn Fn(T) -> anyhow::Result<T> + Send + Sync;
type Predicate<T> = dyn Fn(&T) -> bool + Send + Sync;

/// A stage that counts its calls and remembers the threads they ran on.
pub struct RecordingStage<T> {
    name: String,
    func: Box<TransformFn<T>>,
    calls: AtomicUsize,
    threads: Mutex<Vec<String>>,
}

impl<T> RecordingStage<T> {
    /// Creates a recording stage around `func`.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
            calls: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the transform ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the thread name of every call, in call order.
    #[must_use]
    pub fn threads(&self) -> Vec<String> {
        self.threads.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.threads.lock().clear();
    }
}

impl<T: 'static> RecordingStage<T> {
    /// Creates a recording stage that returns records unchanged.
    pub fn passthrough(name: impl Into<String>) -> Self {
        Self::new(name, Ok)
    }
}

impl<T> Debug for RecordingStage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingStage")
            .field("name", &self.name)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl<T> Stage<T> for RecordingStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        self.threads.lock().push(thread);
        (self.func)(record)
    }
}

/// A stage that fails every record, or only the records matching a predicate.
pub struct FailingStage<T> {
    name: String,
    error: String,
    predicate: Box<Predicate<T>>,
}

impl<T> FailingStage<T> {
    /// Creates a stage that fails every record.
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::when(name, error, |_| true)
    }

    /// Creates a stage that fails only records for which `predicate` holds.
    pub fn when<P>(name: impl Into<String>, error: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            error: error.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl<T> Debug for FailingStage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailingStage")
            .field("name", &self.name)
            .field("error", &self.error)
            .finish()
    }
}

impl<T> Stage<T> for FailingStage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        if (self.predicate)(&record) {
            anyhow::bail!("{}", self.error);
        }
        Ok(record)
    }
}

/// A pass-through stage that sleeps before returning each record.
#[derive(Debug, Clone)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    jitter: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Adds up to `jitter` of random extra delay per record.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn pause(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra = rand::thread_rng().gen_range(Duration::ZERO..=self.jitter);
        self.delay + extra
    }
}

impl<T> Stage<T> for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, record: T) -> anyhow::Result<T> {
        std::thread::sleep(self.pause());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    #[test]
    fn test_recording_stage_counts_calls() {
        let stage = RecordingStage::new("double", |n: i32| Ok(n * 2));

        assert_eq!(stage.transform(2).unwrap(), 4);
        assert_eq!(stage.transform(5).unwrap(), 10);
        assert_eq!(stage.call_count(), 2);
        assert_eq!(stage.threads().len(), 2);

        stage.reset();
        assert_eq!(stage.call_count(), 0);
        assert!(stage.threads().is_empty());
    }

    #[test]
    fn test_recording_stage_records_thread_names() {
        let stage = std::sync::Arc::new(RecordingStage::<i32>::passthrough("seen"));
        let worker = stage.clone();
        std::thread::Builder::new()
            .name("probe".to_string())
            .spawn(move || worker.transform(1).unwrap())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(stage.threads(), vec!["probe".to_string()]);
    }

    #[test]
    fn test_failing_stage() {
        let always = FailingStage::<i32>::new("nope", "always fails");
        assert_eq!(always.transform(1).unwrap_err().to_string(), "always fails");

        let odd = FailingStage::when("odd", "odd record", |n: &i32| n % 2 == 1);
        assert_eq!(odd.transform(2).unwrap(), 2);
        assert!(odd.transform(3).is_err());
    }

    #[test]
    fn test_slow_stage_waits_at_least_delay() {
        let stage = SlowStage::with_delay_ms("slow", 5).with_jitter(Duration::from_millis(5));
        let start = Instant::now();
        assert_eq!(stage.transform("x").unwrap(), "x");
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(Stage::<&str>::name(&stage), "slow");
    }
}
