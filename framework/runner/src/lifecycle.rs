//! Merges a journey's once-per-class hooks into its per-scenario hooks.
//!
//! Scenarios may run in a freshly installed argument context, so the runner cannot pay for
//! class level setup once and share it. Instead `before_class` hooks run as the first `before`
//! hooks and `after_class` hooks as the last `after` hooks of every scenario.

use crate::context::{JourneyContext, UserValuesConstraint};
use crate::definition::{DeclaredHooks, Hook, HookKind, JourneyHookMut};

/// Every failure collected while evaluating a statement, in the order they happened.
pub type Failures = Vec<anyhow::Error>;

pub type StatementResult = Result<(), Failures>;

/// A deferred piece of journey execution that can be wrapped by hooks.
pub struct Statement<'a, V: UserValuesConstraint> {
    run: Box<dyn FnOnce(&mut JourneyContext<V>) -> StatementResult + Send + 'a>,
    layers: usize,
}

impl<'a, V: UserValuesConstraint> Statement<'a, V> {
    pub fn new(run: impl FnOnce(&mut JourneyContext<V>) -> StatementResult + Send + 'a) -> Self {
        Self {
            run: Box::new(run),
            layers: 0,
        }
    }

    pub fn from_hook(hook: JourneyHookMut<V>) -> Self {
        Self::new(move |ctx| hook(ctx).map_err(|e| vec![e]))
    }

    fn wrap(
        self,
        run: impl FnOnce(Statement<'a, V>, &mut JourneyContext<V>) -> StatementResult + Send + 'a,
    ) -> Self {
        let layers = self.layers + 1;
        Self {
            run: Box::new(move |ctx: &mut JourneyContext<V>| run(self, ctx)),
            layers,
        }
    }

    /// How many hook layers wrap the original statement.
    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn evaluate(self, ctx: &mut JourneyContext<V>) -> StatementResult {
        (self.run)(ctx)
    }
}

/// The merged hook lists that run around every scenario of one journey.
pub struct Lifecycle<V: UserValuesConstraint> {
    before: Vec<Hook<V>>,
    after: Vec<Hook<V>>,
}

impl<V: UserValuesConstraint> Lifecycle<V> {
    /// `before = before_class ++ before` and `after = after ++ after_class`.
    pub fn merge(hooks: &DeclaredHooks<V>) -> Self {
        let before = [HookKind::BeforeClass, HookKind::Before]
            .into_iter()
            .flat_map(|kind| hooks.hooks_annotated_with(kind).iter().copied())
            .collect();
        let after = [HookKind::After, HookKind::AfterClass]
            .into_iter()
            .flat_map(|kind| hooks.hooks_annotated_with(kind).iter().copied())
            .collect();

        Self { before, after }
    }

    pub fn before(&self) -> &[Hook<V>] {
        &self.before
    }

    pub fn after(&self) -> &[Hook<V>] {
        &self.after
    }

    /// Run the before hooks, then `statement`. The first failing hook stops the chain and the
    /// statement does not run.
    pub fn with_befores<'a>(&self, statement: Statement<'a, V>) -> Statement<'a, V> {
        if self.before.is_empty() {
            return statement;
        }

        let befores = self.before.clone();
        statement.wrap(move |next, ctx| {
            for hook in &befores {
                hook.invoke(ctx).map_err(|e| vec![e])?;
            }
            next.evaluate(ctx)
        })
    }

    /// Run `statement`, then every after hook regardless of how the statement or earlier hooks
    /// did. All failures are kept.
    pub fn with_afters<'a>(&self, statement: Statement<'a, V>) -> Statement<'a, V> {
        if self.after.is_empty() {
            return statement;
        }

        let afters = self.after.clone();
        statement.wrap(move |next, ctx| {
            let mut failures = next.evaluate(ctx).err().unwrap_or_default();
            for hook in &afters {
                if let Err(e) = hook.invoke(ctx) {
                    log::warn!("{} hook failed for {}: {:?}", hook.label(), ctx.journey(), e);
                    failures.push(e);
                }
            }

            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use longevity_core::prelude::InterruptHandle;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::context::ArgumentContext;
    use crate::definition::{HookResult, JourneyDefinitionBuilder};
    use crate::executor::Executor;

    #[derive(Debug, Default)]
    struct Calls {
        log: Vec<&'static str>,
    }

    impl UserValuesConstraint for Calls {}

    fn before_class(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("before_class");
        Ok(())
    }

    fn before(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("before");
        Ok(())
    }

    fn failing_before(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("failing_before");
        anyhow::bail!("could not unlock device")
    }

    fn body(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("body");
        Ok(())
    }

    fn failing_body(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("failing_body");
        anyhow::bail!("settings did not open")
    }

    fn after(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("after");
        Ok(())
    }

    fn failing_after(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("failing_after");
        anyhow::bail!("could not press home")
    }

    fn after_class(ctx: &mut JourneyContext<Calls>) -> HookResult {
        ctx.get_mut().log.push("after_class");
        Ok(())
    }

    fn context() -> JourneyContext<Calls> {
        let executor = Arc::new(Executor::new(
            tokio::runtime::Runtime::new().unwrap(),
            InterruptHandle::new(),
        ));
        let listener = executor.interrupt_handle().new_listener();
        JourneyContext::new(
            "open_settings".to_string(),
            ArgumentContext::new(),
            executor,
            listener,
        )
    }

    fn labels(hooks: &[Hook<Calls>]) -> Vec<String> {
        hooks.iter().map(Hook::label).collect()
    }

    #[test]
    fn class_hooks_become_the_outermost_scenario_hooks() {
        let journey = JourneyDefinitionBuilder::<Calls>::new("open_settings")
            .use_after_class(after_class)
            .use_after(after)
            .use_before(before)
            .use_before_class(before_class)
            .use_body(body)
            .build()
            .unwrap();

        let lifecycle = Lifecycle::merge(journey.hooks());
        assert_eq!(labels(lifecycle.before()), vec!["before_class[0]", "before[0]"]);
        assert_eq!(labels(lifecycle.after()), vec!["after[0]", "after_class[0]"]);
    }

    #[test]
    fn no_hooks_leaves_the_statement_unwrapped() {
        let journey = JourneyDefinitionBuilder::<Calls>::new("idle_home")
            .use_body(body)
            .build()
            .unwrap();

        let lifecycle = journey.lifecycle();
        let statement =
            lifecycle.with_afters(lifecycle.with_befores(Statement::from_hook(journey.body())));
        assert_eq!(statement.layers(), 0);

        let mut ctx = context();
        statement.evaluate(&mut ctx).unwrap();
        assert_eq!(ctx.get().log, vec!["body"]);
    }

    #[test]
    fn one_direction_empty_only_wraps_the_other() {
        let journey = JourneyDefinitionBuilder::<Calls>::new("idle_home")
            .use_before(before)
            .use_body(body)
            .build()
            .unwrap();

        let lifecycle = journey.lifecycle();
        let statement =
            lifecycle.with_afters(lifecycle.with_befores(Statement::from_hook(journey.body())));
        assert_eq!(statement.layers(), 1);
    }

    #[test]
    fn afters_run_once_even_when_the_body_fails() {
        let journey = JourneyDefinitionBuilder::<Calls>::new("open_settings")
            .use_before_class(before_class)
            .use_before(before)
            .use_after(after)
            .use_after_class(after_class)
            .use_body(failing_body)
            .build()
            .unwrap();

        let lifecycle = journey.lifecycle();
        let statement =
            lifecycle.with_afters(lifecycle.with_befores(Statement::from_hook(journey.body())));

        let mut ctx = context();
        let failures = statement.evaluate(&mut ctx).unwrap_err();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].to_string(), "settings did not open");
        assert_eq!(
            ctx.get().log,
            vec!["before_class", "before", "failing_body", "after", "after_class"]
        );
    }

    #[test]
    fn failing_before_skips_the_body_but_not_the_afters() {
        let journey = JourneyDefinitionBuilder::<Calls>::new("open_settings")
            .use_before(failing_before)
            .use_before(before)
            .use_after(failing_after)
            .use_after_class(after_class)
            .use_body(body)
            .build()
            .unwrap();

        let lifecycle = journey.lifecycle();
        let statement =
            lifecycle.with_afters(lifecycle.with_befores(Statement::from_hook(journey.body())));

        let mut ctx = context();
        let failures = statement.evaluate(&mut ctx).unwrap_err();

        let messages = failures.iter().map(|e| e.to_string()).collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec!["could not unlock device", "could not press home"]
        );
        assert_eq!(
            ctx.get().log,
            vec!["failing_before", "failing_after", "after_class"]
        );
    }
}
