use std::fmt::Display;
use std::time::Duration;

use longevity_core::prelude::{InterruptedError, TestTimedOutError};

/// Identifies one dispatched scenario.
///
/// The first run of a journey is described by its bare name. Later runs of the same journey in
/// the same suite carry the occurrence number, `open_settings@2`, so that results stay apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Description {
    journey: String,
    iteration: usize,
}

impl Description {
    pub fn new(journey: &str, iteration: usize) -> Self {
        Self {
            journey: journey.to_string(),
            iteration: iteration.max(1),
        }
    }

    /// Describe a sequence of journey names, numbering repeats.
    pub fn for_sequence<'a>(journeys: impl IntoIterator<Item = &'a str>) -> Vec<Self> {
        let mut seen = std::collections::HashMap::<&str, usize>::new();
        journeys
            .into_iter()
            .map(|journey| {
                let count = seen.entry(journey).or_default();
                *count += 1;
                Description::new(journey, *count)
            })
            .collect()
    }

    pub fn journey(&self) -> &str {
        &self.journey
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl Display for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.iteration > 1 {
            write!(f, "{}@{}", self.journey, self.iteration)
        } else {
            f.write_str(&self.journey)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The body did not finish within the enforced timeout.
    TimedOut,
    /// The run was interrupted while the scenario was running.
    Interrupted,
    /// A hook or the body returned an error or panicked.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    kind: FailureKind,
    message: String,
    timeout: Option<Duration>,
}

impl Failure {
    pub fn from_error(error: &anyhow::Error) -> Self {
        let (kind, timeout) = if let Some(timed_out) = error.downcast_ref::<TestTimedOutError>() {
            (FailureKind::TimedOut, Some(timed_out.timeout()))
        } else if error.is::<InterruptedError>() {
            (FailureKind::Interrupted, None)
        } else {
            (FailureKind::Error, None)
        };

        Self {
            kind,
            message: format!("{error:#}"),
            timeout,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The enforced timeout, for [FailureKind::TimedOut] failures.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// The result of one dispatched scenario.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub description: Description,
    pub failures: Vec<Failure>,
    pub duration: Duration,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn timed_out(&self) -> bool {
        self.failures.iter().any(|f| f.kind() == FailureKind::TimedOut)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub outcomes: Vec<ScenarioOutcome>,
    pub ignored: Vec<Description>,
    pub duration: Duration,
}

impl RunResult {
    pub fn run_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn ignore_count(&self) -> usize {
        self.ignored.len()
    }

    pub fn was_successful(&self) -> bool {
        self.failure_count() == 0 && self.ignored.is_empty()
    }
}

/// Receives progress and results while a suite runs. Every method defaults to doing nothing.
///
/// Each dispatched scenario gets one `test_started`, zero or more `test_failure` and one
/// `test_finished`. A failure is reported once; a body error that surfaces after its scenario
/// already timed out is not reported again.
pub trait RunNotifier {
    fn test_run_started(&mut self, _planned: &[Description]) {}

    fn test_started(&mut self, _description: &Description) {}

    fn test_failure(&mut self, _description: &Description, _failure: &Failure) {}

    fn test_ignored(&mut self, _description: &Description) {}

    fn test_finished(&mut self, _description: &Description) {}

    fn test_run_finished(&mut self, _result: &RunResult) {}
}

/// Writes every notification to the log.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl RunNotifier for LoggingNotifier {
    fn test_run_started(&mut self, planned: &[Description]) {
        log::info!("Starting run of {} scenario(s)", planned.len());
    }

    fn test_started(&mut self, description: &Description) {
        log::info!("Started {}", description);
    }

    fn test_failure(&mut self, description: &Description, failure: &Failure) {
        log::error!("{} failed: {}", description, failure.message());
    }

    fn test_ignored(&mut self, description: &Description) {
        log::warn!("Skipped {}", description);
    }

    fn test_finished(&mut self, description: &Description) {
        log::info!("Finished {}", description);
    }

    fn test_run_finished(&mut self, result: &RunResult) {
        log::info!(
            "Run finished in {:?}: {} run, {} failed, {} skipped",
            result.duration,
            result.run_count(),
            result.failure_count(),
            result.ignore_count()
        );
    }
}

/// A notification, as recorded by [RecordingNotifier].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    RunStarted(Vec<String>),
    Started(String),
    Failure(String, Failure),
    Ignored(String),
    Finished(String),
    RunFinished { run: usize, failed: usize },
}

/// Keeps every notification in memory, in the order received.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub notifications: Vec<Notification>,
}

impl RecordingNotifier {
    pub fn failures_for(&self, display_name: &str) -> Vec<&Failure> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::Failure(name, failure) if name == display_name => Some(failure),
                _ => None,
            })
            .collect()
    }
}

impl RunNotifier for RecordingNotifier {
    fn test_run_started(&mut self, planned: &[Description]) {
        self.notifications.push(Notification::RunStarted(
            planned.iter().map(Description::display_name).collect(),
        ));
    }

    fn test_started(&mut self, description: &Description) {
        self.notifications
            .push(Notification::Started(description.display_name()));
    }

    fn test_failure(&mut self, description: &Description, failure: &Failure) {
        self.notifications.push(Notification::Failure(
            description.display_name(),
            failure.clone(),
        ));
    }

    fn test_ignored(&mut self, description: &Description) {
        self.notifications
            .push(Notification::Ignored(description.display_name()));
    }

    fn test_finished(&mut self, description: &Description) {
        self.notifications
            .push(Notification::Finished(description.display_name()));
    }

    fn test_run_finished(&mut self, result: &RunResult) {
        self.notifications.push(Notification::RunFinished {
            run: result.run_count(),
            failed: result.failure_count(),
        });
    }
}

/// Forwards every notification to each wrapped notifier in turn.
#[derive(Default)]
pub struct CompositeNotifier {
    notifiers: Vec<Box<dyn RunNotifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl RunNotifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }
}

impl RunNotifier for CompositeNotifier {
    fn test_run_started(&mut self, planned: &[Description]) {
        self.notifiers
            .iter_mut()
            .for_each(|n| n.test_run_started(planned));
    }

    fn test_started(&mut self, description: &Description) {
        self.notifiers
            .iter_mut()
            .for_each(|n| n.test_started(description));
    }

    fn test_failure(&mut self, description: &Description, failure: &Failure) {
        self.notifiers
            .iter_mut()
            .for_each(|n| n.test_failure(description, failure));
    }

    fn test_ignored(&mut self, description: &Description) {
        self.notifiers
            .iter_mut()
            .for_each(|n| n.test_ignored(description));
    }

    fn test_finished(&mut self, description: &Description) {
        self.notifiers
            .iter_mut()
            .for_each(|n| n.test_finished(description));
    }

    fn test_run_finished(&mut self, result: &RunResult) {
        self.notifiers
            .iter_mut()
            .for_each(|n| n.test_run_finished(result));
    }
}
