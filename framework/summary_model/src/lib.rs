use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// Metadata describing how a run was configured and how long it actually took.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The time the run ended, as a Unix timestamp in seconds
    pub ended_at: i64,
    /// The number of virtual users configured
    pub user_count: usize,
    /// The ramp-up period the run was configured with, in seconds
    pub ramp_up_seconds: u64,
    /// The steady-state duration the run was configured with, in seconds
    pub configured_duration_seconds: u64,
    /// The actual wall-clock duration of the run, in seconds
    ///
    /// This can exceed the configured durations when shutdown is delayed by in-flight
    /// iterations. Throughput is computed against this value, not the configured one.
    pub actual_duration_seconds: f64,
}

/// Counts and rates aggregated across all users and steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverallStats {
    pub total_iterations: u64,
    pub failed_iterations: u64,
    pub iteration_error_rate: f64,
    pub total_steps: u64,
    pub failed_steps: u64,
    pub step_error_rate: f64,
    /// Completed iterations per wall-clock second of the run
    pub throughput_iterations_per_sec: f64,
}

/// The outcome of a single virtual user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub user_id: usize,
    pub iterations_completed: u64,
    pub iterations_failed: u64,
    /// Unix timestamp in seconds, unset if the user never started
    pub started_at: Option<f64>,
    /// Unix timestamp in seconds, unset if the user never finished cleanly
    pub ended_at: Option<f64>,
    /// The most recent errors seen by this user, oldest dropped first
    pub errors: Vec<String>,
}

/// Aggregated statistics for one named step.
///
/// Always recomputed from the full sample set, never maintained incrementally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepStats {
    pub name: String,
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_rate: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub metadata: RunMetadata,
    pub overall: OverallStats,
    pub per_user: Vec<UserSummary>,
    pub per_step: HashMap<String, StepStats>,
    /// Non-fatal conditions that degraded the run, such as the event log becoming unwritable
    pub warnings: Vec<String>,
}

impl RunSummary {
    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used for the run, so
    /// that runs with comparable settings can be grouped. It uses the
    ///     - Scenario name
    ///     - User count
    ///     - Ramp-up and configured duration
    ///     - Step names that appeared in the run
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.metadata.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.metadata.user_count.to_le_bytes());
        Digest::update(&mut hasher, self.metadata.ramp_up_seconds.to_le_bytes());
        Digest::update(
            &mut hasher,
            self.metadata.configured_duration_seconds.to_le_bytes(),
        );
        self.per_step
            .keys()
            .sorted()
            .for_each(|name| Digest::update(&mut hasher, name.as_bytes()));

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    let _ = file.write("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
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
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_summary() -> RunSummary {
        RunSummary {
            metadata: RunMetadata {
                run_id: "test-run".to_string(),
                scenario_name: "sample".to_string(),
                started_at: 1_700_000_000,
                ended_at: 1_700_000_060,
                user_count: 3,
                ramp_up_seconds: 10,
                configured_duration_seconds: 50,
                actual_duration_seconds: 60.5,
            },
            overall: OverallStats {
                total_iterations: 120,
                failed_iterations: 2,
                iteration_error_rate: 2.0 / 122.0,
                total_steps: 240,
                failed_steps: 2,
                step_error_rate: 2.0 / 240.0,
                throughput_iterations_per_sec: 1.98,
            },
            per_user: vec![UserSummary {
                user_id: 1,
                iterations_completed: 40,
                iterations_failed: 1,
                started_at: Some(1_700_000_000.5),
                ended_at: Some(1_700_000_060.0),
                errors: vec!["boom".to_string()],
            }],
            per_step: HashMap::from([(
                "login".to_string(),
                StepStats {
                    name: "login".to_string(),
                    count: 240,
                    success_count: 238,
                    failure_count: 2,
                    error_rate: 2.0 / 240.0,
                    min_ms: 4.2,
                    max_ms: 310.0,
                    mean_ms: 42.0,
                    p50_ms: 38.0,
                    p90_ms: 95.0,
                    p95_ms: 120.0,
                    p99_ms: 250.0,
                },
            )]),
            warnings: vec![],
        }
    }

    #[test]
    fn round_trip_through_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.jsonl");

        let summary = sample_summary();
        append_run_summary(summary.clone(), path.clone()).unwrap();
        append_run_summary(summary.clone(), path.clone()).unwrap();

        let loaded = load_summary_runs(path).unwrap();
        assert_eq!(2, loaded.len());
        assert_eq!(summary, loaded[0]);
        assert_eq!(summary, loaded[1]);
    }

    #[test]
    fn fingerprint_is_stable_for_same_configuration() {
        let a = sample_summary();
        let mut b = sample_summary();
        // Results differ but the configuration does not
        b.overall.total_iterations = 999;
        b.metadata.run_id = "another-run".to_string();

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_configuration() {
        let a = sample_summary();
        let mut b = sample_summary();
        b.metadata.user_count = 4;

        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
