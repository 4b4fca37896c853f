use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// How a dispatched scenario ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Failed because the body ran past its enforced timeout.
    TimedOut,
    /// Never dispatched, because the run was interrupted or stopped after a failure.
    Skipped,
}

/// One scenario of a run, in the order it was planned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioSummary {
    /// The journey name, with an `@N` suffix for repeated runs of the same journey.
    pub name: String,
    pub status: ScenarioStatus,
    /// Wall time from dispatch until the after hooks finished, excluding any idle before the next
    /// scenario.
    pub duration_ms: u64,
    pub failures: Vec<String>,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the suite that was run
    pub suite_name: String,
    /// The profile argument, if the run followed a profile
    pub profile: Option<String>,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The runtime arguments, without per-scenario extras
    pub arguments: HashMap<String, String>,
    pub scenarios: Vec<ScenarioSummary>,
    /// The version of the runner that was used for this run
    pub longevity_version: String,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        suite_name: String,
        profile: Option<String>,
        started_at: i64,
        longevity_version: String,
    ) -> Self {
        Self {
            run_id,
            suite_name,
            profile,
            started_at,
            arguments: HashMap::new(),
            scenarios: Vec::new(),
            longevity_version,
        }
    }

    pub fn add_argument(&mut self, key: String, value: String) {
        self.arguments.insert(key, value);
    }

    pub fn add_scenario(&mut self, scenario: ScenarioSummary) {
        self.scenarios.push(scenario);
    }

    pub fn count(&self, status: ScenarioStatus) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to identify the configuration a suite ran with, so that runs
    /// can be compared. It uses the
    ///     - Suite name
    ///     - Profile
    ///     - Runtime arguments
    ///     - Planned scenario names
    ///     - Runner version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.suite_name.as_bytes());
        if let Some(profile) = &self.profile {
            Digest::update(&mut hasher, profile.as_bytes());
        }
        self.arguments
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        self.scenarios.iter().for_each(|s| {
            Digest::update(&mut hasher, s.name.as_bytes());
        });
        Digest::update(&mut hasher, self.longevity_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: &Path) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
