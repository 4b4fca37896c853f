use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use longevity_core::prelude::{InterruptListener, InterruptedError};

use crate::error::ConfigurationError;
use crate::executor::Executor;
use crate::profile::ExtraArgument;

pub trait UserValuesConstraint: Default + Debug + Send + 'static {}

impl UserValuesConstraint for () {}

/// The runtime arguments for a run, as an opaque key/value map.
///
/// The suite owns one global context built from the command line. Each scheduled scenario gets a
/// copy with that scenario's extras laid over it, so overrides never leak into later scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentContext {
    values: BTreeMap<String, String>,
}

impl ArgumentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse the value for `key`, if it is set.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigurationError> {
        self.get(key)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| ConfigurationError::InvalidArgument {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
            })
            .transpose()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// A copy of this context with `extras` applied in order. Later extras win over earlier ones.
    pub fn with_extras(&self, extras: &[ExtraArgument]) -> Self {
        let mut overlaid = self.clone();
        for extra in extras {
            overlaid.insert(extra.key.as_str(), extra.value.as_str());
        }
        overlaid
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ArgumentContext {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut context = Self::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}

/// Everything a journey hook can see while it runs.
///
/// A fresh context, with a fresh `V`, is created for every scenario dispatch. It moves to the
/// worker thread for the body and comes back to the orchestrator for teardown.
pub struct JourneyContext<V: UserValuesConstraint> {
    journey: String,
    arguments: ArgumentContext,
    executor: Arc<Executor>,
    interrupt_listener: InterruptListener,
    value: V,
}

impl<V: UserValuesConstraint> JourneyContext<V> {
    pub(crate) fn new(
        journey: String,
        arguments: ArgumentContext,
        executor: Arc<Executor>,
        interrupt_listener: InterruptListener,
    ) -> Self {
        Self {
            journey,
            arguments,
            executor,
            interrupt_listener,
            value: Default::default(),
        }
    }

    /// The display name of the scenario being run, including the iteration suffix for repeats.
    pub fn journey(&self) -> &str {
        &self.journey
    }

    /// The arguments in force for this scenario.
    pub fn arguments(&self) -> &ArgumentContext {
        &self.arguments
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Fires when this scenario hits its enforced timeout, or when the whole run is interrupted.
    ///
    /// Long running journey code must check this, or use [JourneyContext::pause] and
    /// [JourneyContext::execute_in_place], so that it can be stopped. A body that ignores it is
    /// abandoned shortly after its timeout and torn down with a fresh context.
    pub fn interrupt_listener(&self) -> &InterruptListener {
        &self.interrupt_listener
    }

    /// Swap the listener, so that teardown is not cut short by the body's timeout.
    pub(crate) fn listen_to(&mut self, interrupt_listener: InterruptListener) {
        self.interrupt_listener = interrupt_listener;
    }

    /// Sleep for `duration`, returning early with an error if this scenario is interrupted.
    pub fn pause(&self, duration: Duration) -> Result<(), InterruptedError> {
        self.executor
            .sleep(duration, self.interrupt_listener.clone())
    }

    /// Run async code in place. The future is dropped, and an [InterruptedError] returned, as soon
    /// as this scenario is interrupted.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.executor
            .execute_until_interrupted(fut, self.interrupt_listener.clone())
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}

impl<V: UserValuesConstraint> Debug for JourneyContext<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyContext")
            .field("journey", &self.journey)
            .field("arguments", &self.arguments)
            .field("value", &self.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extras_overlay_a_copy() {
        let global = [("mode", "slow"), ("iterations", "2")]
            .into_iter()
            .collect::<ArgumentContext>();

        let scenario = global.with_extras(&[
            ExtraArgument::new("mode", "fast"),
            ExtraArgument::new("account", "test"),
        ]);

        assert_eq!(scenario.get("mode"), Some("fast"));
        assert_eq!(scenario.get("account"), Some("test"));
        assert_eq!(scenario.get("iterations"), Some("2"));
        assert_eq!(global.get("mode"), Some("slow"));
        assert_eq!(global.get("account"), None);
    }

    #[test]
    fn parsed_argument_reports_bad_values() {
        let arguments = [("iterations", "three")]
            .into_iter()
            .collect::<ArgumentContext>();

        assert!(arguments.get_parsed::<u64>("missing").unwrap().is_none());
        let err = arguments.get_parsed::<u64>("iterations").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value 'three' for argument 'iterations'"
        );
    }

    #[test]
    fn execute_in_place_gives_up_when_the_scenario_is_interrupted() {
        use longevity_core::prelude::InterruptHandle;

        let executor = Arc::new(Executor::new(
            tokio::runtime::Runtime::new().unwrap(),
            InterruptHandle::new(),
        ));
        let scenario = executor.interrupt_handle().child();
        let ctx = JourneyContext::<()>::new(
            "open_settings".to_string(),
            ArgumentContext::new(),
            executor.clone(),
            scenario.new_listener(),
        );

        let trigger = scenario.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.interrupt();
        });

        let started = std::time::Instant::now();
        let err = ctx
            .execute_in_place(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .unwrap_err();

        assert!(err.is::<InterruptedError>());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!executor.interrupt_handle().is_interrupted());
    }
}
