use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::context::{ArgumentContext, UserValuesConstraint};
use crate::definition::JourneyDefinition;
use crate::error::ConfigurationError;
use crate::executor::Executor;
use crate::notifier::{Description, RunNotifier, RunResult, ScenarioOutcome};
use crate::profile::{compute_order, resolve_configuration, resolve_runnable_units, ScenarioDescriptor};
use crate::timing::{Idler, ScheduledScenarioRunner, SleepingIdler};

/// How many times the default order is run.
pub const ITERATIONS_ARGUMENT: &str = "iterations";
/// Shuffle each iteration of the default order.
pub const SHUFFLE_ARGUMENT: &str = "shuffle";
/// Seed for [SHUFFLE_ARGUMENT], so that a shuffled run can be repeated.
pub const SEED_ARGUMENT: &str = "seed";
/// Stop dispatching scenarios after the first failure.
pub const QUITTER_ARGUMENT: &str = "quitter";

#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// Where bundled profiles are looked up by name.
    pub profile_dir: PathBuf,
    /// The total timeout of the last scheduled scenario, which has no next start time to run up to.
    pub last_scenario_timeout: Duration,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("profiles"),
            last_scenario_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Where a suite is up to. Only the suite changes this, and only between scenarios.
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    current_index: usize,
    run_start: Option<Instant>,
}

impl ScheduleState {
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Set when the first scenario is dispatched.
    pub fn run_start(&self) -> Option<Instant> {
        self.run_start
    }

    fn start(&mut self) -> Instant {
        *self.run_start.get_or_insert_with(Instant::now)
    }

    fn advance(&mut self, len: usize) {
        self.current_index = (self.current_index + 1).min(len);
    }
}

enum Plan {
    /// Scenarios from a profile, sorted by start offset, with the journey each one runs.
    Scheduled {
        order: Vec<ScenarioDescriptor>,
        units: Vec<usize>,
    },
    /// Journeys in declaration order, repeated and optionally shuffled.
    Default { units: Vec<usize> },
}

impl Plan {
    fn units(&self) -> &[usize] {
        match self {
            Plan::Scheduled { units, .. } => units,
            Plan::Default { units } => units,
        }
    }
}

/// Runs the journeys of a suite, either on the schedule of a profile or in declaration order.
///
/// Everything that can be wrong with the configuration is checked by [ProfileSuite::new], so a
/// suite that was built will dispatch every scenario unless the run is interrupted.
pub struct ProfileSuite<V: UserValuesConstraint> {
    journeys: Vec<JourneyDefinition<V>>,
    global_arguments: ArgumentContext,
    current_arguments: ArgumentContext,
    options: SuiteOptions,
    plan: Plan,
    descriptions: Vec<Description>,
    state: ScheduleState,
    quitter: bool,
    executor: Arc<Executor>,
    idler: Box<dyn Idler>,
}

impl<V: UserValuesConstraint> ProfileSuite<V> {
    pub fn new(
        journeys: Vec<JourneyDefinition<V>>,
        arguments: ArgumentContext,
        options: SuiteOptions,
        executor: Arc<Executor>,
    ) -> Result<Self, ConfigurationError> {
        let discovered = journeys.iter().map(|j| j.name()).collect::<Vec<_>>();

        let plan = match resolve_configuration(&arguments, &options.profile_dir)? {
            Some(configuration) => {
                let order = compute_order(&configuration)?;
                let units = resolve_runnable_units(&order, &discovered)?;
                log::info!(
                    "Scheduling {} scenario(s) from a {} profile",
                    order.len(),
                    configuration.schedule()
                );
                Plan::Scheduled { order, units }
            }
            None => Plan::Default {
                units: default_order(journeys.len(), &arguments)?,
            },
        };

        let quitter = arguments
            .get_parsed::<bool>(QUITTER_ARGUMENT)?
            .unwrap_or(false);
        let descriptions =
            Description::for_sequence(plan.units().iter().map(|i| discovered[*i]));

        Ok(Self {
            idler: Box::new(SleepingIdler::new(executor.clone())),
            journeys,
            current_arguments: arguments.clone(),
            global_arguments: arguments,
            options,
            plan,
            descriptions,
            state: ScheduleState::default(),
            quitter,
            executor,
        })
    }

    /// Replace how the suite waits between phases and scenarios.
    pub fn with_idler(mut self, idler: impl Idler + 'static) -> Self {
        self.idler = Box::new(idler);
        self
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.plan, Plan::Scheduled { .. })
    }

    /// Every scenario this suite will dispatch, in order.
    pub fn planned(&self) -> &[Description] {
        &self.descriptions
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// The arguments in force right now. Between scenarios these are always the global arguments.
    pub fn current_arguments(&self) -> &ArgumentContext {
        &self.current_arguments
    }

    /// Dispatch every planned scenario, reporting to `notifier`.
    ///
    /// Scenarios left over when the run is interrupted, or after a failure in quitter mode, are
    /// reported as ignored.
    pub fn run(&mut self, notifier: &mut dyn RunNotifier) -> RunResult {
        let started = Instant::now();
        notifier.test_run_started(&self.descriptions);

        let mut result = RunResult::default();
        let run_start = self.state.start();
        if let (Plan::Scheduled { order, .. }, Some(first)) =
            (&self.plan, self.descriptions.first())
        {
            let wait = scheduled_wait(&order[0], run_start);
            if !wait.is_zero() {
                self.idler.wait_for_scheduled_start(first, wait);
            }
        }

        while self.state.current_index < self.descriptions.len() {
            if self.executor.interrupt_handle().is_interrupted() {
                log::warn!("Run interrupted, skipping the remaining scenarios");
                break;
            }
            if self.quitter && result.failure_count() > 0 {
                log::warn!("A scenario failed and quitter is set, skipping the remaining scenarios");
                break;
            }

            match self.run_child(notifier) {
                Some(outcome) => result.outcomes.push(outcome),
                None => break,
            }
        }

        for description in &self.descriptions[self.state.current_index..] {
            notifier.test_ignored(description);
            result.ignored.push(description.clone());
        }

        result.duration = started.elapsed();
        notifier.test_run_finished(&result);
        result
    }

    /// Dispatch the scenario at the current index and move on to the next one.
    ///
    /// Returns `None` once every scenario has been dispatched.
    pub fn run_child(&mut self, notifier: &mut dyn RunNotifier) -> Option<ScenarioOutcome> {
        let index = self.state.current_index;
        let description = self.descriptions.get(index)?.clone();
        let run_start = self.state.start();

        let outcome = match &self.plan {
            Plan::Scheduled { order, units } => {
                let scenario = &order[index];
                let next = order.get(index + 1);
                let total = match next {
                    Some(next) => scheduled_wait(next, run_start),
                    None => self.options.last_scenario_timeout,
                };

                self.current_arguments = self.global_arguments.with_extras(scenario.extras());
                log::info!(
                    "Dispatching {} with a total timeout of {:?}",
                    description,
                    total
                );
                let outcome = ScheduledScenarioRunner::scheduled(
                    description,
                    scenario,
                    total,
                    next.is_none(),
                )
                .run(
                    &self.journeys[units[index]],
                    self.current_arguments.clone(),
                    &self.executor,
                    self.idler.as_mut(),
                    notifier,
                );
                self.current_arguments = self.global_arguments.clone();
                outcome
            }
            Plan::Default { units } => {
                log::info!("Dispatching {}", description);
                ScheduledScenarioRunner::unscheduled(description).run(
                    &self.journeys[units[index]],
                    self.current_arguments.clone(),
                    &self.executor,
                    self.idler.as_mut(),
                    notifier,
                )
            }
        };

        self.state.advance(self.descriptions.len());

        if let Plan::Scheduled { order, .. } = &self.plan {
            if let (Some(next), Some(next_description)) = (
                order.get(self.state.current_index),
                self.descriptions.get(self.state.current_index),
            ) {
                let wait = scheduled_wait(next, run_start);
                if !wait.is_zero() && !self.executor.interrupt_handle().is_interrupted() {
                    self.idler.wait_for_scheduled_start(next_description, wait);
                }
            }
        }

        Some(outcome)
    }
}

/// Time left until `scenario` is due, measured from `run_start`.
fn scheduled_wait(scenario: &ScenarioDescriptor, run_start: Instant) -> Duration {
    scenario
        .start_offset()
        .unwrap_or_default()
        .saturating_sub(run_start.elapsed())
}

fn default_order(
    journey_count: usize,
    arguments: &ArgumentContext,
) -> Result<Vec<usize>, ConfigurationError> {
    let iterations = arguments
        .get_parsed::<usize>(ITERATIONS_ARGUMENT)?
        .unwrap_or(1);
    let shuffle = arguments
        .get_parsed::<bool>(SHUFFLE_ARGUMENT)?
        .unwrap_or(false);

    let too_many = || ConfigurationError::InvalidArgument {
        key: ITERATIONS_ARGUMENT.to_string(),
        value: iterations.to_string(),
    };
    let mut units = Vec::new();
    units
        .try_reserve_exact(iterations.checked_mul(journey_count).ok_or_else(too_many)?)
        .map_err(|_| too_many())?;
    if shuffle {
        let seed = match arguments.get_parsed::<u64>(SEED_ARGUMENT)? {
            Some(seed) => seed,
            None => rand::random(),
        };
        log::info!("Shuffling journeys with seed {seed}");

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for _ in 0..iterations {
            let mut iteration = (0..journey_count).collect::<Vec<_>>();
            iteration.shuffle(&mut rng);
            units.extend(iteration);
        }
    } else {
        for _ in 0..iterations {
            units.extend(0..journey_count);
        }
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn arguments(pairs: &[(&str, &str)]) -> ArgumentContext {
        pairs.iter().copied().collect()
    }

    #[test]
    fn default_order_repeats_declaration_order() {
        let units = default_order(3, &arguments(&[("iterations", "2")])).unwrap();
        assert_eq!(units, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn seeded_shuffle_is_repeatable() {
        let args = arguments(&[("iterations", "3"), ("shuffle", "true"), ("seed", "42")]);

        let first = default_order(4, &args).unwrap();
        let second = default_order(4, &args).unwrap();
        assert_eq!(first, second);

        for iteration in first.chunks(4) {
            let mut sorted = iteration.to_vec();
            sorted.sort();
            assert_eq!(sorted, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn bad_iteration_count_is_a_configuration_error() {
        let err = default_order(2, &arguments(&[("iterations", "many")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value 'many' for argument 'iterations'"
        );
    }

    #[test]
    fn iteration_count_too_large_to_plan_is_a_configuration_error() {
        let overflowing = usize::MAX.to_string();
        let err =
            default_order(2, &arguments(&[("iterations", overflowing.as_str())])).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid value '{overflowing}' for argument 'iterations'")
        );

        let unallocatable = (usize::MAX / 4).to_string();
        assert!(matches!(
            default_order(2, &arguments(&[("iterations", unallocatable.as_str())])),
            Err(ConfigurationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn offsets_already_passed_need_no_wait() {
        let run_start = Instant::now()
            .checked_sub(Duration::from_secs(10))
            .unwrap();

        let overdue = ScenarioDescriptor::new("idle_home").at(Duration::from_secs(4));
        assert_eq!(scheduled_wait(&overdue, run_start), Duration::ZERO);

        let upcoming = ScenarioDescriptor::new("idle_home").at(Duration::from_secs(60));
        let wait = scheduled_wait(&upcoming, run_start);
        assert!(wait <= Duration::from_secs(50) && wait > Duration::from_secs(45));
    }

    #[test]
    fn schedule_state_never_passes_the_end() {
        let mut state = ScheduleState::default();
        assert_eq!(state.run_start(), None);

        let start = state.start();
        assert_eq!(state.start(), start);

        state.advance(2);
        state.advance(2);
        state.advance(2);
        assert_eq!(state.current_index(), 2);
    }
}
