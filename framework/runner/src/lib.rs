mod cli;
mod context;
mod definition;
mod error;
mod executor;
mod init;
mod lifecycle;
mod notifier;
mod profile;
mod progress;
mod run;
mod shutdown;
mod suite;
mod timing;
mod types;

pub mod prelude {
    pub use crate::cli::LongevityCli;
    pub use crate::context::{ArgumentContext, JourneyContext, UserValuesConstraint};
    pub use crate::definition::{
        DeclaredHooks, Hook, HookKind, HookResult, JourneyDefinition, JourneyDefinitionBuilder,
        SuiteDefinitionBuilder,
    };
    pub use crate::error::ConfigurationError;
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::lifecycle::{Lifecycle, Statement};
    pub use crate::notifier::{
        CompositeNotifier, Description, Failure, FailureKind, LoggingNotifier, Notification,
        RecordingNotifier, RunNotifier, RunResult, ScenarioOutcome,
    };
    pub use crate::profile::{
        compute_order, resolve_configuration, resolve_runnable_units, AfterTestPolicy,
        ExtraArgument, RunConfiguration, ScenarioDescriptor, ScheduleMode, PROFILE_ARGUMENT,
    };
    pub use crate::run::run;
    pub use crate::suite::{ProfileSuite, ScheduleState, SuiteOptions, QUITTER_ARGUMENT};
    pub use crate::timing::{
        Idler, ScenarioPhase, ScheduledScenarioRunner, SleepingIdler, TimingBudget,
        TEARDOWN_LEEWAY, WORKER_STOP_GRACE,
    };
    pub use crate::types::LongevityResult;
    pub use longevity_core::prelude::{
        InterruptHandle, InterruptListener, InterruptedError, TestTimedOutError,
    };
}
