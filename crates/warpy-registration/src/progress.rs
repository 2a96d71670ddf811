//! Progress reporting and cooperative cancellation for registration runs.
//!
//! A [`TaskSink`] is shared between the caller and the registration engine.
//! Block registrations running on the thread pool report into it
//! concurrently, so implementations must serialise their counters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Receiver of progress increments and source of cancellation requests.
pub trait TaskSink: Send + Sync {
    /// Called before each stage of work with that stage's number of work
    /// units. Progress restarts from zero.
    fn start(&self, _name: &str, _total: usize) {
        // Default: no-op
    }

    /// Add `n` completed work units. May be called from several threads.
    fn report_progress(&self, n: usize);

    /// Whether the caller asked the task to stop.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called when the task ends, only by whoever created the task.
    fn finish(&self, _outcome: TaskOutcome) {
        // Default: no-op
    }
}

/// Thread-safe task state backed by atomics.
#[derive(Debug, Default)]
pub struct TaskHandle {
    progress: AtomicUsize,
    total: AtomicUsize,
    cancelled: AtomicBool,
    outcome: Mutex<Option<TaskOutcome>>,
}

impl TaskHandle {
    /// Create a new task handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next scale boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Work units completed so far.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    /// Total work units announced by `start`.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Completed fraction in `[0, 1]`, `None` before `start`.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| (self.progress() as f64 / total as f64).min(1.0))
    }

    /// Outcome recorded by `finish`, if any.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskSink for TaskHandle {
    fn start(&self, _name: &str, total: usize) {
        self.progress.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    fn report_progress(&self, n: usize) {
        self.progress.fetch_add(n, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn finish(&self, outcome: TaskOutcome) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
    }
}

/// Task sink that logs progress through tracing.
#[derive(Debug)]
pub struct ConsoleTaskSink {
    /// Log every `log_interval` work units.
    pub log_interval: usize,
    handle: TaskHandle,
    started: Mutex<Option<Instant>>,
}

impl Default for ConsoleTaskSink {
    fn default() -> Self {
        Self::new(25)
    }
}

impl ConsoleTaskSink {
    /// Create a new console sink.
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            handle: TaskHandle::new(),
            started: Mutex::new(None),
        }
    }

    /// Underlying counters, also usable to cancel.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    fn elapsed_secs(&self) -> f64 {
        let started = *self.started.lock().unwrap_or_else(|e| e.into_inner());
        started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}

impl TaskSink for ConsoleTaskSink {
    fn start(&self, name: &str, total: usize) {
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.handle.start(name, total);
        tracing::info!("{} started ({} blocks)", name, total);
    }

    fn report_progress(&self, n: usize) {
        let before = self.handle.progress.fetch_add(n, Ordering::SeqCst);
        let after = before + n;
        let total = self.handle.total();
        if before / self.log_interval != after / self.log_interval || after == total {
            let percent = self.handle.fraction().unwrap_or(0.0) * 100.0;
            tracing::info!(
                "Blocks {}/{} ({:.1}%) | Elapsed: {:.2}s",
                after,
                total,
                percent,
                self.elapsed_secs()
            );
        }
    }

    fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    fn finish(&self, outcome: TaskOutcome) {
        self.handle.finish(outcome);
        match outcome {
            TaskOutcome::Completed => {
                tracing::info!("Registration completed in {:.2}s", self.elapsed_secs())
            }
            TaskOutcome::Cancelled => tracing::info!(
                "Registration cancelled after {} blocks",
                self.handle.progress()
            ),
            TaskOutcome::Failed => tracing::error!("Registration failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_task_handle_counts() {
        let task = TaskHandle::new();
        assert_eq!(task.fraction(), None);
        task.start("test", 10);
        task.report_progress(3);
        task.report_progress(2);
        assert_eq!(task.progress(), 5);
        assert_eq!(task.fraction(), Some(0.5));

        task.start("second stage", 4);
        assert_eq!(task.progress(), 0);
        assert_eq!(task.total(), 4);
    }

    #[test]
    fn test_task_handle_cancel_and_finish() {
        let task = TaskHandle::new();
        assert!(!task.is_cancelled());
        task.cancel();
        assert!(task.is_cancelled());
        assert_eq!(task.outcome(), None);
        task.finish(TaskOutcome::Cancelled);
        assert_eq!(task.outcome(), Some(TaskOutcome::Cancelled));
    }

    #[test]
    fn test_concurrent_progress() {
        let task = Arc::new(TaskHandle::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let task = Arc::clone(&task);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        task.report_progress(1);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(task.progress(), 8000);
    }

    #[test]
    fn test_console_sink() {
        let sink = ConsoleTaskSink::new(2);
        sink.start("Console", 4);
        for _ in 0..4 {
            sink.report_progress(1);
        }
        sink.finish(TaskOutcome::Completed);
        assert_eq!(sink.handle().progress(), 4);
        assert_eq!(sink.handle().outcome(), Some(TaskOutcome::Completed));
    }
}
