//! Profiles describe which journeys a scheduled run contains and when each of them starts.
//!
//! A profile is read once, while the suite is being constructed, and never changes afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::context::ArgumentContext;
use crate::error::ConfigurationError;

/// The runtime argument that selects a profile.
pub const PROFILE_ARGUMENT: &str = "profile";

/// Bundled profiles are looked up by name with this suffix appended.
pub const BUNDLED_PROFILE_SUFFIX: &str = ".profile.yaml";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleMode {
    /// Every scenario has an `at` offset and the run is ordered by it.
    #[default]
    #[display("TIMESTAMPED")]
    Timestamped,
    /// Reserved. Profiles with this schedule are rejected.
    #[serde(alias = "INDEXED")]
    #[display("UNORDERED")]
    Unordered,
}

/// What to do once a scenario's body is done, before its teardown hooks run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AfterTestPolicy {
    /// Idle until the scenario's enforced timeout is used up, leaving the app in the foreground.
    StayInApp,
    /// Go straight to teardown.
    #[default]
    Exit,
}

/// A runtime argument that only applies while one scenario runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraArgument {
    pub key: String,
    pub value: String,
}

impl ExtraArgument {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// One entry in a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDescriptor {
    journey: String,
    start_offset: Option<Duration>,
    after_test: AfterTestPolicy,
    extras: Vec<ExtraArgument>,
}

impl ScenarioDescriptor {
    pub fn new(journey: &str) -> Self {
        Self {
            journey: journey.to_string(),
            start_offset: None,
            after_test: AfterTestPolicy::default(),
            extras: Vec::new(),
        }
    }

    pub fn at(mut self, start_offset: Duration) -> Self {
        self.start_offset = Some(start_offset);
        self
    }

    pub fn with_after_test(mut self, after_test: AfterTestPolicy) -> Self {
        self.after_test = after_test;
        self
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.push(ExtraArgument::new(key, value));
        self
    }

    /// The name of the journey this scenario runs.
    pub fn journey(&self) -> &str {
        &self.journey
    }

    /// The offset from the start of the run at which this scenario is due.
    pub fn start_offset(&self) -> Option<Duration> {
        self.start_offset
    }

    pub fn after_test(&self) -> AfterTestPolicy {
        self.after_test
    }

    pub fn extras(&self) -> &[ExtraArgument] {
        &self.extras
    }
}

/// A parsed profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    schedule: ScheduleMode,
    scenarios: Vec<ScenarioDescriptor>,
}

impl RunConfiguration {
    pub fn new(schedule: ScheduleMode, scenarios: Vec<ScenarioDescriptor>) -> Self {
        Self {
            schedule,
            scenarios,
        }
    }

    pub fn schedule(&self) -> ScheduleMode {
        self.schedule
    }

    pub fn scenarios(&self) -> &[ScenarioDescriptor] {
        &self.scenarios
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileDocument {
    #[serde(default)]
    schedule: ScheduleMode,
    #[serde(default)]
    scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioEntry {
    journey: String,
    #[serde(default)]
    at: Option<String>,
    #[serde(default)]
    after_test: AfterTestPolicy,
    #[serde(default)]
    extras: Vec<ExtraArgument>,
}

impl TryFrom<ProfileDocument> for RunConfiguration {
    type Error = ConfigurationError;

    fn try_from(document: ProfileDocument) -> Result<Self, Self::Error> {
        let scenarios = document
            .scenarios
            .into_iter()
            .map(|entry| {
                let start_offset = entry
                    .at
                    .as_deref()
                    .map(|at| {
                        parse_timestamp(at).ok_or_else(|| ConfigurationError::InvalidTimestamp {
                            journey: entry.journey.clone(),
                            value: at.to_string(),
                        })
                    })
                    .transpose()?;

                Ok(ScenarioDescriptor {
                    journey: entry.journey,
                    start_offset,
                    after_test: entry.after_test,
                    extras: entry.extras,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(RunConfiguration::new(document.schedule, scenarios))
    }
}

/// Parse an `HH:MM:SS` timestamp as an offset from the start of the run.
///
/// Hours are not limited to a day, so `26:00:00` is two hours into the second day of a run.
pub fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut fields = value.trim().split(':');
    let (hours, minutes, seconds) = (fields.next()?, fields.next()?, fields.next()?);
    if fields.next().is_some() {
        return None;
    }

    let hours = parse_digits(hours, 1..=usize::MAX)?;
    let minutes = parse_digits(minutes, 2..=2).filter(|m| *m < 60)?;
    let seconds = parse_digits(seconds, 2..=2).filter(|s| *s < 60)?;

    let total = hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?;
    Some(Duration::from_secs(total))
}

fn parse_digits(field: &str, width: std::ops::RangeInclusive<usize>) -> Option<u64> {
    if !width.contains(&field.len()) || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFormat {
    Yaml,
    Json,
    Toml,
}

impl ProfileFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Where a profile argument points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// A profile shipped with the suite, found by name in the profile directory.
    Bundled { name: String, path: PathBuf },
    /// A profile file given by path.
    File(PathBuf),
}

impl ProfileSource {
    /// Any value containing `/` is a path, anything else names a bundled profile.
    pub fn from_argument(value: &str, profile_dir: &Path) -> Self {
        if value.contains('/') {
            Self::File(PathBuf::from(value))
        } else {
            Self::Bundled {
                name: value.to_string(),
                path: profile_dir.join(format!("{value}{BUNDLED_PROFILE_SUFFIX}")),
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Bundled { path, .. } | Self::File(path) => path,
        }
    }

    pub fn load(&self) -> Result<RunConfiguration, ConfigurationError> {
        let path = self.path();
        let format = ProfileFormat::from_path(path).ok_or_else(|| {
            ConfigurationError::UnsupportedFormat {
                path: path.to_path_buf(),
            }
        })?;

        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigurationError::ProfileNotFound {
                name: match self {
                    Self::Bundled { name, .. } => name.clone(),
                    Self::File(path) => path.display().to_string(),
                },
                path: path.to_path_buf(),
            },
            _ => ConfigurationError::ProfileRead {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        parse_profile(&content, format).map_err(|reason| ConfigurationError::MalformedProfile {
            path: path.to_path_buf(),
            reason,
        })?
        .try_into()
    }
}

fn parse_profile(content: &str, format: ProfileFormat) -> Result<ProfileDocument, String> {
    match format {
        ProfileFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        ProfileFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ProfileFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    }
}

/// Look up the profile requested by the runtime arguments.
///
/// Returns `None` when no profile was requested, in which case the suite runs in its default order.
pub fn resolve_configuration(
    arguments: &ArgumentContext,
    profile_dir: &Path,
) -> Result<Option<RunConfiguration>, ConfigurationError> {
    let Some(value) = arguments.get(PROFILE_ARGUMENT) else {
        return Ok(None);
    };

    let source = ProfileSource::from_argument(value, profile_dir);
    log::debug!("Loading profile from {}", source.path().display());

    source.load().map(Some)
}

/// Order the scenarios of a timestamped profile by their start offset.
///
/// The sort is stable, scenarios due at the same time keep the order they were declared in.
pub fn compute_order(
    configuration: &RunConfiguration,
) -> Result<Vec<ScenarioDescriptor>, ConfigurationError> {
    if configuration.schedule() != ScheduleMode::Timestamped {
        return Err(ConfigurationError::UnsupportedSchedule {
            schedule: configuration.schedule(),
        });
    }

    if let Some(missing) = configuration
        .scenarios()
        .iter()
        .find(|s| s.start_offset().is_none())
    {
        return Err(ConfigurationError::MissingTimestamp {
            journey: missing.journey().to_string(),
        });
    }

    let mut ordered = configuration.scenarios().to_vec();
    ordered.sort_by_key(|s| s.start_offset());

    Ok(ordered)
}

/// Match each scenario to a discovered journey by exact name, returning indices into `discovered`.
pub fn resolve_runnable_units(
    order: &[ScenarioDescriptor],
    discovered: &[&str],
) -> Result<Vec<usize>, ConfigurationError> {
    order
        .iter()
        .map(|scenario| {
            discovered
                .iter()
                .position(|name| *name == scenario.journey())
                .ok_or_else(|| ConfigurationError::UnknownJourney {
                    journey: scenario.journey().to_string(),
                    available: discovered.iter().map(|n| n.to_string()).collect(),
                })
        })
        .collect()
}
