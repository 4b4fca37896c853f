use std::path::PathBuf;

use crate::profile::ScheduleMode;

/// Problems with the requested profile or runtime arguments.
///
/// These are raised while the suite is being constructed, before any scenario runs, and are never
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Profile '{name}' not found at {}", path.display())]
    ProfileNotFound { name: String, path: PathBuf },
    #[error("Failed to read profile {}: {source}", path.display())]
    ProfileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed profile {}: {reason}", path.display())]
    MalformedProfile { path: PathBuf, reason: String },
    #[error("Unsupported profile format for {}, expected a .yaml, .yml, .json or .toml file", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("Invalid timestamp '{value}' for journey '{journey}', expected HH:MM:SS")]
    InvalidTimestamp { journey: String, value: String },
    #[error("Journey '{journey}' has no timestamp but the profile is scheduled by timestamp")]
    MissingTimestamp { journey: String },
    #[error("Only scheduled profiles are supported, got a {schedule} schedule")]
    UnsupportedSchedule { schedule: ScheduleMode },
    #[error("Journey '{journey}' is not part of this suite. Available journeys: [{}]", available.join(", "))]
    UnknownJourney {
        journey: String,
        available: Vec<String>,
    },
    #[error("Invalid value '{value}' for argument '{key}'")]
    InvalidArgument { key: String, value: String },
}
