use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use longevity_summary_model::{append_run_summary, RunSummary, ScenarioStatus, ScenarioSummary};

use crate::context::{ArgumentContext, UserValuesConstraint};
use crate::definition::SuiteDefinitionBuilder;
use crate::executor::Executor;
use crate::notifier::{CompositeNotifier, LoggingNotifier, RunResult};
use crate::profile::PROFILE_ARGUMENT;
use crate::progress::ScenarioProgress;
use crate::shutdown::start_shutdown_listener;
use crate::suite::ProfileSuite;

/// Run a suite to completion.
///
/// Configuration problems, such as a missing profile or a profile naming an unknown journey, are
/// returned as errors before any scenario runs. Scenario failures are not errors, check
/// [RunResult::was_successful].
pub fn run<V: UserValuesConstraint>(
    definition: SuiteDefinitionBuilder<V>,
) -> anyhow::Result<RunResult> {
    let definition = definition.build()?;

    log::info!("Running suite: {}", definition.name);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let interrupt_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, interrupt_handle));

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();
    let global_arguments = definition.arguments.clone();

    let mut suite = ProfileSuite::new(
        definition.journeys,
        definition.arguments,
        definition.options,
        executor,
    )?;

    let mut notifier = CompositeNotifier::new().with(LoggingNotifier);
    if !definition.no_progress {
        notifier = notifier.with(ScenarioProgress::new());
    }

    let result = suite.run(&mut notifier);

    if let Some(path) = &definition.run_summary {
        let summary = summarise(
            run_id,
            &definition.name,
            started_at,
            &global_arguments,
            &result,
        );
        write_summary(&summary, path)?;
    }

    Ok(result)
}

fn summarise(
    run_id: String,
    suite_name: &str,
    started_at: i64,
    arguments: &ArgumentContext,
    result: &RunResult,
) -> RunSummary {
    let mut summary = RunSummary::new(
        run_id,
        suite_name.to_string(),
        arguments.get(PROFILE_ARGUMENT).map(str::to_string),
        started_at,
        env!("CARGO_PKG_VERSION").to_string(),
    );
    for (key, value) in arguments.iter() {
        summary.add_argument(key.to_string(), value.to_string());
    }

    for outcome in &result.outcomes {
        let status = if outcome.passed() {
            ScenarioStatus::Passed
        } else if outcome.timed_out() {
            ScenarioStatus::TimedOut
        } else {
            ScenarioStatus::Failed
        };

        summary.add_scenario(ScenarioSummary {
            name: outcome.description.display_name(),
            status,
            duration_ms: outcome.duration.as_millis() as u64,
            failures: outcome
                .failures
                .iter()
                .map(|f| f.message().to_string())
                .collect(),
        });
    }
    for description in &result.ignored {
        summary.add_scenario(ScenarioSummary {
            name: description.display_name(),
            status: ScenarioStatus::Skipped,
            duration_ms: 0,
            failures: Vec::new(),
        });
    }

    summary
}

fn write_summary(summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    append_run_summary(summary, path)
        .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    log::info!(
        "Wrote run summary for {} with fingerprint {}",
        summary.run_id,
        summary.fingerprint()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::notifier::{Description, Failure, ScenarioOutcome};
    use longevity_core::prelude::TestTimedOutError;

    #[test]
    fn summary_lists_outcomes_then_skipped_scenarios() {
        let result = RunResult {
            outcomes: vec![
                ScenarioOutcome {
                    description: Description::new("idle_home", 1),
                    failures: vec![],
                    duration: Duration::from_millis(1500),
                },
                ScenarioOutcome {
                    description: Description::new("open_settings", 1),
                    failures: vec![Failure::from_error(
                        &TestTimedOutError::new(Duration::from_millis(2000)).into(),
                    )],
                    duration: Duration::from_millis(5000),
                },
            ],
            ignored: vec![Description::new("idle_home", 2)],
            duration: Duration::from_millis(6500),
        };
        let arguments = [("profile", "nightly"), ("mode", "fast")]
            .into_iter()
            .collect::<ArgumentContext>();

        let summary = summarise("run-1".to_string(), "suite", 0, &arguments, &result);

        assert_eq!(summary.profile.as_deref(), Some("nightly"));
        assert_eq!(summary.arguments.len(), 2);
        let statuses = summary
            .scenarios
            .iter()
            .map(|s| (s.name.as_str(), s.status))
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                ("idle_home", ScenarioStatus::Passed),
                ("open_settings", ScenarioStatus::TimedOut),
                ("idle_home@2", ScenarioStatus::Skipped),
            ]
        );
        assert_eq!(
            summary.scenarios[1].failures,
            vec!["test timed out after 2000 milliseconds"]
        );
    }
}
