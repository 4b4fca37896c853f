use std::path::PathBuf;
use std::time::Duration;

use crate::cli::LongevityCli;
use crate::context::{ArgumentContext, JourneyContext, UserValuesConstraint};
use crate::lifecycle::Lifecycle;
use crate::suite::SuiteOptions;

pub type HookResult = anyhow::Result<()>;

pub type JourneyHookMut<V> = fn(&mut JourneyContext<V>) -> HookResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum HookKind {
    #[display("before_class")]
    BeforeClass,
    #[display("before")]
    Before,
    #[display("after")]
    After,
    #[display("after_class")]
    AfterClass,
}

/// A registered hook, remembering what kind it was declared as and its position among hooks of
/// that kind.
pub struct Hook<V: UserValuesConstraint> {
    kind: HookKind,
    position: usize,
    func: JourneyHookMut<V>,
}

impl<V: UserValuesConstraint> Clone for Hook<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: UserValuesConstraint> Copy for Hook<V> {}

impl<V: UserValuesConstraint> Hook<V> {
    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// For example `before_class[0]`.
    pub fn label(&self) -> String {
        format!("{}[{}]", self.kind, self.position)
    }

    pub fn invoke(&self, ctx: &mut JourneyContext<V>) -> HookResult {
        log::trace!("Running {} hook for {}", self.label(), ctx.journey());
        (self.func)(ctx)
    }
}

impl<V: UserValuesConstraint> std::fmt::Debug for Hook<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// The hooks a journey declared, grouped by kind, each group in declaration order.
pub struct DeclaredHooks<V: UserValuesConstraint> {
    before_class: Vec<Hook<V>>,
    before: Vec<Hook<V>>,
    after: Vec<Hook<V>>,
    after_class: Vec<Hook<V>>,
}

impl<V: UserValuesConstraint> Default for DeclaredHooks<V> {
    fn default() -> Self {
        Self {
            before_class: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            after_class: Vec::new(),
        }
    }
}

impl<V: UserValuesConstraint> DeclaredHooks<V> {
    pub fn hooks_annotated_with(&self, kind: HookKind) -> &[Hook<V>] {
        match kind {
            HookKind::BeforeClass => &self.before_class,
            HookKind::Before => &self.before,
            HookKind::After => &self.after,
            HookKind::AfterClass => &self.after_class,
        }
    }

    fn push(&mut self, kind: HookKind, func: JourneyHookMut<V>) {
        let hooks = match kind {
            HookKind::BeforeClass => &mut self.before_class,
            HookKind::Before => &mut self.before,
            HookKind::After => &mut self.after,
            HookKind::AfterClass => &mut self.after_class,
        };
        let position = hooks.len();
        hooks.push(Hook {
            kind,
            position,
            func,
        });
    }
}

/// The builder for a journey, one named unit of work that a profile can schedule.
pub struct JourneyDefinitionBuilder<V: UserValuesConstraint> {
    /// The name that profiles refer to this journey by. It must be unique within the suite.
    name: String,
    hooks: DeclaredHooks<V>,
    /// The journey itself. It runs on its own thread and is stopped by the scenario's timeout.
    body: Option<JourneyHookMut<V>>,
}

impl<V: UserValuesConstraint> JourneyDefinitionBuilder<V> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hooks: DeclaredHooks::default(),
            body: None,
        }
    }

    /// Add a hook that would run once before all of this journey's tests.
    ///
    /// Every scenario starts from a freshly installed argument context, so the runner runs these
    /// before every scenario, ahead of the [JourneyDefinitionBuilder::use_before] hooks.
    pub fn use_before_class(mut self, hook: JourneyHookMut<V>) -> Self {
        self.hooks.push(HookKind::BeforeClass, hook);
        self
    }

    /// Add a hook that runs before the body of every scenario.
    pub fn use_before(mut self, hook: JourneyHookMut<V>) -> Self {
        self.hooks.push(HookKind::Before, hook);
        self
    }

    /// Set the body of this journey.
    pub fn use_body(mut self, body: JourneyHookMut<V>) -> Self {
        if self.body.replace(body).is_some() {
            panic!("Body for journey [{}] is already defined", self.name);
        }
        self
    }

    /// Add a hook that runs after every scenario, even when the body failed or timed out.
    pub fn use_after(mut self, hook: JourneyHookMut<V>) -> Self {
        self.hooks.push(HookKind::After, hook);
        self
    }

    /// Add a hook that would run once after all of this journey's tests. Like
    /// [JourneyDefinitionBuilder::use_before_class], it runs for every scenario, after the
    /// [JourneyDefinitionBuilder::use_after] hooks.
    pub fn use_after_class(mut self, hook: JourneyHookMut<V>) -> Self {
        self.hooks.push(HookKind::AfterClass, hook);
        self
    }

    pub fn build(self) -> anyhow::Result<JourneyDefinition<V>> {
        let body = self
            .body
            .ok_or_else(|| anyhow::anyhow!("Journey [{}] has no body", self.name))?;

        Ok(JourneyDefinition {
            name: self.name,
            lifecycle: Lifecycle::merge(&self.hooks),
            hooks: self.hooks,
            body,
        })
    }
}

pub struct JourneyDefinition<V: UserValuesConstraint> {
    name: String,
    hooks: DeclaredHooks<V>,
    lifecycle: Lifecycle<V>,
    body: JourneyHookMut<V>,
}

impl<V: UserValuesConstraint> JourneyDefinition<V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> &DeclaredHooks<V> {
        &self.hooks
    }

    /// The merged per-scenario lifecycle.
    pub fn lifecycle(&self) -> &Lifecycle<V> {
        &self.lifecycle
    }

    pub fn body(&self) -> JourneyHookMut<V> {
        self.body
    }
}

/// The builder for a suite definition.
///
/// This must be used in the suite's `main` to declare every journey the suite can run.
pub struct SuiteDefinitionBuilder<V: UserValuesConstraint> {
    /// The name of the suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: LongevityCli,
    /// Where bundled profiles live when the CLI doesn't say otherwise.
    default_profile_dir: PathBuf,
    journeys: Vec<JourneyDefinitionBuilder<V>>,
}

pub struct SuiteDefinition<V: UserValuesConstraint> {
    pub name: String,
    pub journeys: Vec<JourneyDefinition<V>>,
    pub arguments: ArgumentContext,
    pub options: SuiteOptions,
    pub no_progress: bool,
    pub run_summary: Option<PathBuf>,
    pub run_id: Option<String>,
}

impl<V: UserValuesConstraint> SuiteDefinitionBuilder<V> {
    /// Initialise a new suite definition from the suite name and command line arguments.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Initialise a new suite definition with an already parsed CLI, for tests and embedding.
    pub fn new(name: &str, cli: LongevityCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_profile_dir: PathBuf::from("profiles"),
            journeys: Vec::new(),
        }
    }

    /// Set the directory that bundled profiles are loaded from, unless `--profile-dir` is given.
    pub fn with_default_profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_profile_dir = dir.into();
        self
    }

    /// Add a journey to the suite. Journeys run in the order they are added when no profile is
    /// requested.
    pub fn use_journey(mut self, journey: JourneyDefinitionBuilder<V>) -> Self {
        if self.journeys.iter().any(|j| j.name == journey.name) {
            panic!("Journey [{}] is already defined", journey.name);
        }

        self.journeys.push(journey);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<SuiteDefinition<V>> {
        if self.journeys.is_empty() {
            anyhow::bail!("Suite [{}] has no journeys", self.name);
        }

        let journeys = self
            .journeys
            .into_iter()
            .map(JourneyDefinitionBuilder::build)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(SuiteDefinition {
            name: self.name,
            journeys,
            arguments: self.cli.argument_context(),
            options: SuiteOptions {
                profile_dir: self.cli.profile_dir.unwrap_or(self.default_profile_dir),
                last_scenario_timeout: Duration::from_secs(self.cli.last_scenario_timeout_s),
            },
            no_progress: self.cli.no_progress,
            run_summary: self.cli.run_summary,
            run_id: self.cli.run_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &mut JourneyContext<()>) -> HookResult {
        Ok(())
    }

    #[test]
    fn hooks_keep_declaration_order_within_a_kind() {
        let journey = JourneyDefinitionBuilder::<()>::new("open_settings")
            .use_before(noop)
            .use_after_class(noop)
            .use_before(noop)
            .use_body(noop)
            .build()
            .unwrap();

        let labels = journey
            .hooks()
            .hooks_annotated_with(HookKind::Before)
            .iter()
            .map(Hook::label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["before[0]", "before[1]"]);
        assert_eq!(
            journey.hooks().hooks_annotated_with(HookKind::AfterClass)[0].kind(),
            HookKind::AfterClass
        );
        assert!(journey
            .hooks()
            .hooks_annotated_with(HookKind::BeforeClass)
            .is_empty());
    }

    #[test]
    fn journey_without_body_is_rejected() {
        let err = JourneyDefinitionBuilder::<()>::new("idle_home")
            .use_before(noop)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Journey [idle_home] has no body");
    }

    #[test]
    #[should_panic(expected = "Journey [idle_home] is already defined")]
    fn duplicate_journey_names_panic() {
        let cli = <LongevityCli as clap::Parser>::parse_from(["suite"]);
        let _ = SuiteDefinitionBuilder::<()>::new("suite", cli)
            .use_journey(JourneyDefinitionBuilder::new("idle_home").use_body(noop))
            .use_journey(JourneyDefinitionBuilder::new("idle_home").use_body(noop));
    }
}
