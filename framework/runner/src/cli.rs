use std::path::PathBuf;

use clap::Parser;

use crate::context::ArgumentContext;
use crate::profile::PROFILE_ARGUMENT;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct LongevityCli {
    /// A runtime argument for the suite, in the format `key=value`.
    ///
    /// These form the global argument context that every journey can read. Profiles can override
    /// them per scenario through `extras`. You can pass the flag multiple times, for example
    /// `-e iterations=3 -e shuffle=true`.
    ///
    /// Arguments understood by the runner itself are `profile`, `iterations`, `shuffle`, `seed`
    /// and `quitter`.
    #[clap(short = 'e', long = "arg", value_parser = parse_argument)]
    pub arguments: Vec<(String, String)>,

    /// The profile to schedule the run with. Shorthand for `-e profile=<value>`.
    ///
    /// A value containing `/` is read as a path to a `.yaml`, `.yml`, `.json` or `.toml` file.
    /// Anything else is the name of a bundled profile, looked up as `<profile-dir>/<name>.profile.yaml`.
    ///
    /// Without a profile every journey runs once, in the order the suite declares them.
    #[clap(long)]
    pub profile: Option<String>,

    /// The directory holding bundled profiles. Defaults to the suite's own profile directory.
    #[clap(long)]
    pub profile_dir: Option<PathBuf>,

    /// The total timeout, in seconds, for the last scenario of a scheduled run.
    ///
    /// Every other scenario gets the time until the next scenario is due to start.
    #[clap(long, default_value = "1800")]
    pub last_scenario_timeout_s: u64,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Append a summary of the run to this file, as a single JSON line.
    #[clap(long)]
    pub run_summary: Option<PathBuf>,

    /// The ID of this run, recorded in the run summary.
    ///
    /// A random ID is generated when none is given.
    #[clap(long)]
    pub run_id: Option<String>,
}

impl LongevityCli {
    /// Build the global argument context. An explicit `--profile` wins over `-e profile=...`.
    pub fn argument_context(&self) -> ArgumentContext {
        let mut arguments = self.arguments.iter().cloned().collect::<ArgumentContext>();
        if let Some(profile) = &self.profile {
            arguments.insert(PROFILE_ARGUMENT, profile);
        }
        arguments
    }
}

fn parse_argument(s: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or(anyhow::anyhow!("Expected an argument in the format key=value, got [{}]", s))?;

    if key.is_empty() {
        anyhow::bail!("No key specified for argument [{}]", s);
    }

    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_arguments_and_profile_shorthand() {
        let cli = LongevityCli::try_parse_from([
            "suite",
            "-e",
            "iterations=3",
            "--arg",
            "mode=a=b",
            "--profile",
            "nightly",
        ])
        .unwrap();

        let arguments = cli.argument_context();
        assert_eq!(arguments.get("iterations"), Some("3"));
        assert_eq!(arguments.get("mode"), Some("a=b"));
        assert_eq!(arguments.get(PROFILE_ARGUMENT), Some("nightly"));
        assert_eq!(cli.last_scenario_timeout_s, 1800);
    }

    #[test]
    fn rejects_argument_without_value() {
        assert!(LongevityCli::try_parse_from(["suite", "-e", "iterations"]).is_err());
        assert!(LongevityCli::try_parse_from(["suite", "-e", "=3"]).is_err());
    }
}
