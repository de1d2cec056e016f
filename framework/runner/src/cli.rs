use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::run::DRAIN_GRACE;
use crate::spec::RunSpec;

/// Upper bound on concurrent virtual users. A single generator process degrades well before
/// this; distributed generation is the answer beyond it, not a bigger number here.
const MAX_USERS: usize = 1000;

/// Command line surface shared by every Gust scenario binary.
#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct ScenarioCli {
    /// The number of concurrent virtual users to run
    #[clap(long, default_value = "5", value_parser = parse_user_count)]
    pub users: usize,

    /// The number of seconds over which to start the users incrementally
    #[clap(long, default_value = "0")]
    pub ramp_up: u64,

    /// The steady-state duration of the run in seconds, measured from the end of ramp-up
    #[clap(long, default_value = "60")]
    pub duration: u64,

    /// Base think time between iterations, in milliseconds
    #[clap(long, default_value = "1000")]
    pub think_time: u64,

    /// Uniform jitter applied to the think time, as +/- this percentage divided by two
    #[clap(long, default_value = "20", value_parser = parse_jitter)]
    pub think_time_jitter: f64,

    /// Directory to write the event log and run summary into
    #[clap(long, short, default_value = "output")]
    pub output: PathBuf,

    /// Seconds to wait for in-flight iterations after the stop signal before forcing
    /// cancellation. Defaults to 10.
    #[clap(long)]
    pub drain_grace: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at
    /// by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Use this run id instead of generating one
    #[clap(long)]
    pub run_id: Option<String>,
}

impl ScenarioCli {
    /// Build the immutable [RunSpec] for this invocation.
    ///
    /// Each run gets its own output directory under `--output`, named after the scenario, the
    /// start time and the run id.
    pub fn into_spec(self, scenario_name: &str) -> RunSpec {
        let run_id = self.run_id.unwrap_or_else(|| nanoid::nanoid!(10));
        let started = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let output_dir = self
            .output
            .join(format!("{scenario_name}-{started}-{run_id}"));

        RunSpec {
            run_id,
            scenario_name: scenario_name.to_string(),
            user_count: self.users,
            ramp_up: Duration::from_secs(self.ramp_up),
            duration: Duration::from_secs(self.duration),
            think_time: Duration::from_millis(self.think_time),
            think_time_jitter_pct: self.think_time_jitter,
            output_dir,
            drain_grace: self
                .drain_grace
                .map(Duration::from_secs)
                .unwrap_or(DRAIN_GRACE),
            no_progress: self.no_progress,
        }
    }
}

fn parse_user_count(s: &str) -> anyhow::Result<usize> {
    let users: usize = s.parse()?;
    anyhow::ensure!(
        (1..=MAX_USERS).contains(&users),
        "users must be between 1 and {MAX_USERS}"
    );
    Ok(users)
}

fn parse_jitter(s: &str) -> anyhow::Result<f64> {
    let jitter: f64 = s.parse()?;
    anyhow::ensure!(
        (0.0..=100.0).contains(&jitter),
        "think time jitter must be a percentage between 0 and 100"
    );
    Ok(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_count_is_capped() {
        assert!(parse_user_count("1").is_ok());
        assert!(parse_user_count("1000").is_ok());
        assert!(parse_user_count("0").is_err());
        assert!(parse_user_count("1001").is_err());
    }

    #[test]
    fn jitter_must_be_a_percentage() {
        assert!(parse_jitter("0").is_ok());
        assert!(parse_jitter("100").is_ok());
        assert!(parse_jitter("-1").is_err());
        assert!(parse_jitter("150").is_err());
    }

    #[test]
    fn spec_carries_defaults_and_scoped_output_dir() {
        let cli = ScenarioCli::parse_from(["scenario", "--users", "3", "--ramp-up", "5"]);
        let spec = cli.into_spec("login_flow");

        assert_eq!(3, spec.user_count);
        assert_eq!(Duration::from_secs(5), spec.ramp_up);
        assert_eq!(DRAIN_GRACE, spec.drain_grace);
        assert!(spec
            .output_dir
            .to_string_lossy()
            .contains("login_flow"));
    }
}
