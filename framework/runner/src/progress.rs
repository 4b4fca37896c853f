use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::notifier::{Description, RunNotifier, RunResult};

/// Shows a progress bar over the dispatched scenarios, with the one running now as its message.
pub struct ScenarioProgress {
    bar: ProgressBar,
}

impl ScenarioProgress {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for ScenarioProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunNotifier for ScenarioProgress {
    fn test_run_started(&mut self, planned: &[Description]) {
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        self.bar = ProgressBar::new(planned.len() as u64).with_style(style);
        self.bar.enable_steady_tick(Duration::from_secs(1));
    }

    fn test_started(&mut self, description: &Description) {
        self.bar.set_message(description.display_name());
    }

    fn test_ignored(&mut self, _description: &Description) {
        self.bar.inc(1);
    }

    fn test_finished(&mut self, _description: &Description) {
        self.bar.inc(1);
    }

    fn test_run_finished(&mut self, result: &RunResult) {
        self.bar.finish_with_message(format!(
            "{} passed, {} failed, {} skipped",
            result.run_count() - result.failure_count(),
            result.failure_count(),
            result.ignore_count()
        ));
    }
}
