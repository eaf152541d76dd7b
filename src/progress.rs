//! Progress display for runs, fed by the engine's progress callback

use crate::ui;
use indicatif::{ProgressBar, ProgressStyle};
use taskflow::{ExecutionResult, ProgressCallback};

/// Progress bar over all dispatched tasks
pub struct RunProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl RunProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar, quiet }
    }
}

impl ProgressCallback for RunProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_level_start(&mut self, index: usize, size: usize) {
        self.bar
            .set_message(format!("level {index} ({size} tasks)"));
    }

    fn on_task_start(&mut self, task: &str) {
        self.bar.set_message(task.to_string());
    }

    fn on_task_complete(&mut self, result: &ExecutionResult) {
        if !self.quiet {
            self.bar.println(ui::result_line(result));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}
