//! Runs one scenario against its time budget.
//!
//! A scenario moves through `Armed -> Running -> PostBody -> Done`. The before hooks and the body
//! run on a worker thread. The body is cut off at the enforced timeout, counted from when the body
//! starts, which holds back [TEARDOWN_LEEWAY] from the total so that the after hooks have time to
//! run. Between the phases the orchestrator may idle,
//! depending on the scenario's after-test policy and whether it is the last one in the run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use longevity_core::prelude::{InterruptedError, TestTimedOutError};

use crate::context::{ArgumentContext, JourneyContext, UserValuesConstraint};
use crate::definition::JourneyDefinition;
use crate::executor::{panic_to_error, Deadline, Executor, WorkerOutcome};
use crate::lifecycle::{Failures, Statement};
use crate::notifier::{Description, Failure, RunNotifier, ScenarioOutcome};
use crate::profile::{AfterTestPolicy, ScenarioDescriptor};

/// Time reserved out of every scenario's total for its after hooks.
pub const TEARDOWN_LEEWAY: Duration = Duration::from_millis(3000);

/// How long a body that was cut off gets to hand its context back before it is abandoned.
pub const WORKER_STOP_GRACE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingBudget {
    total: Duration,
}

impl TimingBudget {
    pub fn new(total: Duration) -> Self {
        Self { total }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// The timeout applied to the body, never more than [TimingBudget::total].
    pub fn enforced(&self) -> Duration {
        self.total.saturating_sub(TEARDOWN_LEEWAY)
    }

    pub fn idle_before_teardown(&self, elapsed: Duration) -> Duration {
        self.enforced().saturating_sub(elapsed)
    }

    pub fn idle_before_next_scenario(&self, elapsed: Duration) -> Duration {
        self.total.saturating_sub(elapsed)
    }
}

/// The blocking waits the scheduler performs between scenario phases.
///
/// An idle that is cut short is not an error, so none of these can fail.
pub trait Idler: Send {
    /// Stay in the app after the body, before the after hooks run.
    fn idle_before_teardown(&mut self, description: &Description, duration: Duration);

    /// Use up the rest of the scenario's budget once its after hooks have run.
    fn idle_before_next_scenario(&mut self, description: &Description, duration: Duration);

    /// Wait until the next scenario's start offset.
    fn wait_for_scheduled_start(&mut self, description: &Description, duration: Duration);
}

/// Sleeps on the executor. Every idle ends early if the run is interrupted.
pub struct SleepingIdler {
    executor: Arc<Executor>,
}

impl SleepingIdler {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    fn sleep(&self, what: &str, description: &Description, duration: Duration) {
        log::debug!("Idling {:?} {} {}", duration, what, description);
        let listener = self.executor.interrupt_handle().new_listener();
        if let Err(e) = self.executor.sleep(duration, listener) {
            log::warn!("Idle {} {} was cut short: {}", what, description, e);
        }
    }
}

impl Idler for SleepingIdler {
    fn idle_before_teardown(&mut self, description: &Description, duration: Duration) {
        self.sleep("before tearing down", description, duration);
    }

    fn idle_before_next_scenario(&mut self, description: &Description, duration: Duration) {
        self.sleep("after", description, duration);
    }

    fn wait_for_scheduled_start(&mut self, description: &Description, duration: Duration) {
        self.sleep("until the start of", description, duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ScenarioPhase {
    Armed,
    Running,
    PostBody,
    Done,
}

/// Drives a single scenario through its phases.
///
/// Scheduled scenarios carry a [TimingBudget]. Scenarios from the default order have none, so
/// their bodies are never cut off and they never idle.
#[derive(Debug)]
pub struct ScheduledScenarioRunner {
    description: Description,
    after_test: AfterTestPolicy,
    budget: Option<TimingBudget>,
    is_last: bool,
    phase: ScenarioPhase,
}

impl ScheduledScenarioRunner {
    pub fn scheduled(
        description: Description,
        scenario: &ScenarioDescriptor,
        total: Duration,
        is_last: bool,
    ) -> Self {
        Self {
            description,
            after_test: scenario.after_test(),
            budget: Some(TimingBudget::new(total)),
            is_last,
            phase: ScenarioPhase::Armed,
        }
    }

    pub fn unscheduled(description: Description) -> Self {
        Self {
            description,
            after_test: AfterTestPolicy::Exit,
            budget: None,
            is_last: true,
            phase: ScenarioPhase::Armed,
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    pub fn budget(&self) -> Option<TimingBudget> {
        self.budget
    }

    fn advance(&mut self, phase: ScenarioPhase) {
        log::debug!("{}: {} -> {}", self.description, self.phase, phase);
        self.phase = phase;
    }

    /// Run the scenario to completion. Failures are reported through `notifier` and returned in
    /// the outcome, they never stop the caller from moving on to the next scenario.
    pub fn run<V: UserValuesConstraint>(
        mut self,
        journey: &JourneyDefinition<V>,
        arguments: ArgumentContext,
        executor: &Arc<Executor>,
        idler: &mut dyn Idler,
        notifier: &mut dyn RunNotifier,
    ) -> ScenarioOutcome {
        let started = Instant::now();
        notifier.test_started(&self.description);

        let scenario_interrupt = executor.interrupt_handle().child();
        let display_name = self.description.display_name();
        let new_context = |arguments: ArgumentContext| {
            JourneyContext::<V>::new(
                display_name.clone(),
                arguments,
                executor.clone(),
                scenario_interrupt.new_listener(),
            )
        };
        let context = new_context(arguments.clone());

        self.advance(ScenarioPhase::Running);
        let lifecycle = journey.lifecycle();
        let (arm, armed) = tokio::sync::oneshot::channel();
        let body = Statement::from_hook(journey.body());
        let timed_body = Statement::<V>::new(move |ctx| {
            // The orchestrator may have stopped listening already.
            let _ = arm.send(());
            body.evaluate(ctx)
        });
        let statement = lifecycle.with_befores(timed_body);
        let enforced = self.budget.map(|b| b.enforced());

        let mut failures = Failures::new();
        let worker_outcome = executor.run_on_worker(
            &format!("journey-{}", self.description),
            statement,
            context,
            enforced.map(|timeout| Deadline { timeout, armed }),
            WORKER_STOP_GRACE,
            &scenario_interrupt,
        );
        let returned_context = match worker_outcome {
            Ok(WorkerOutcome::Finished { context, result }) => {
                failures.extend(result.err().unwrap_or_default());
                Some(context)
            }
            Ok(WorkerOutcome::TimedOut {
                context,
                late_result,
            }) => {
                if let Err(late) = late_result {
                    log::debug!(
                        "{} failed after it timed out, not reporting again: {:?}",
                        self.description,
                        late
                    );
                }
                failures.push(TestTimedOutError::new(enforced.unwrap_or_default()).into());
                context
            }
            Ok(WorkerOutcome::Interrupted { context, result }) => {
                match result {
                    Err(errors) => failures.extend(errors),
                    Ok(()) => failures.push(InterruptedError::default().into()),
                }
                context
            }
            Err(e) => {
                failures.push(e.context("Could not run the journey body"));
                None
            }
        };
        let mut context = returned_context.unwrap_or_else(|| {
            log::warn!(
                "{} did not hand back its context, tearing down with a fresh one",
                self.description
            );
            new_context(arguments)
        });

        self.advance(ScenarioPhase::PostBody);
        context.listen_to(executor.interrupt_handle().new_listener());
        let teardown_budget = match self.after_test {
            AfterTestPolicy::StayInApp if !self.is_last => self.budget,
            _ => None,
        };
        let description = &self.description;
        let idle = Statement::<V>::new(|_| {
            if let Some(budget) = teardown_budget {
                let duration = budget.idle_before_teardown(started.elapsed());
                idler.idle_before_teardown(description, duration);
            }
            Ok(())
        });
        let teardown = lifecycle.with_afters(idle);
        let teardown_result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            teardown.evaluate(&mut context)
        }))
        .unwrap_or_else(|panic| Err(vec![panic_to_error(panic)]));
        failures.extend(teardown_result.err().unwrap_or_default());

        let duration = started.elapsed();
        let failures = failures
            .iter()
            .map(|e| {
                let failure = Failure::from_error(e);
                notifier.test_failure(&self.description, &failure);
                failure
            })
            .collect::<Vec<_>>();
        notifier.test_finished(&self.description);

        self.advance(ScenarioPhase::Done);
        if let Some(budget) = self.budget.filter(|_| !self.is_last) {
            idler.idle_before_next_scenario(
                &self.description,
                budget.idle_before_next_scenario(started.elapsed()),
            );
        }

        ScenarioOutcome {
            description: self.description,
            failures,
            duration,
        }
    }
}
