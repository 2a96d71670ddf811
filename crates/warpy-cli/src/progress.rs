use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use warpy_registration::{TaskOutcome, TaskSink};

/// Task sink drawing an indicatif progress bar.
///
/// With a time limit the task reports itself cancelled once the limit has
/// passed, which stops the registration at the next scale boundary.
pub struct ProgressBarSink {
    bar: ProgressBar,
    deadline: Option<Instant>,
}

impl ProgressBarSink {
    pub fn new(time_limit: Option<Duration>) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(concat!(
                "{spinner:.green} {msg} [{elapsed_precise}] ",
                "[{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self {
            bar,
            deadline: time_limit.map(|limit| Instant::now() + limit),
        }
    }
}

impl TaskSink for ProgressBarSink {
    fn start(&self, name: &str, total: usize) {
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_message(name.to_string());
    }

    fn report_progress(&self, n: usize) {
        self.bar.inc(n as u64);
    }

    fn is_cancelled(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn finish(&self, outcome: TaskOutcome) {
        let message = match outcome {
            TaskOutcome::Completed => "done",
            TaskOutcome::Cancelled => "stopped at time limit",
            TaskOutcome::Failed => "failed",
        };
        self.bar.finish_with_message(message);
    }
}
