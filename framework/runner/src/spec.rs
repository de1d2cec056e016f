use std::path::PathBuf;
use std::time::Duration;

/// The immutable configuration for one run.
///
/// Constructed once, before any user starts, and passed into [crate::run::run] by value. There
/// is deliberately no ambient or cached configuration anywhere else. Values are expected to be
/// validated by whatever constructed them, typically [crate::cli::ScenarioCli].
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Unique id for this run, used to label output
    pub run_id: String,
    /// Name of the scenario being run
    pub scenario_name: String,
    /// Number of virtual users to run concurrently, at least 1
    pub user_count: usize,
    /// The period over which users are started incrementally
    pub ramp_up: Duration,
    /// The steady-state duration, measured from the end of ramp-up
    pub duration: Duration,
    /// Base pause between iterations
    pub think_time: Duration,
    /// Uniform jitter applied to the think time, +/- this percentage / 2, in [0, 100]
    pub think_time_jitter_pct: f64,
    /// Directory receiving the event log and run summary
    pub output_dir: PathBuf,
    /// How long to wait for in-flight iterations after the stop signal before forcing
    /// cancellation
    pub drain_grace: Duration,
    /// Suppress the progress bar
    pub no_progress: bool,
}

impl RunSpec {
    /// The offset from the start of ramp-up at which the user at `index` should begin, so that
    /// `user_count` users start uniformly across `ramp_up`.
    ///
    /// Every user starts immediately when there is a single user or no ramp-up period.
    pub fn start_offset(&self, index: usize) -> Duration {
        if self.user_count <= 1 || self.ramp_up.is_zero() {
            return Duration::ZERO;
        }
        self.ramp_up.mul_f64(index as f64 / self.user_count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(user_count: usize, ramp_up: Duration) -> RunSpec {
        RunSpec {
            run_id: "test".to_string(),
            scenario_name: "spec_test".to_string(),
            user_count,
            ramp_up,
            duration: Duration::from_secs(1),
            think_time: Duration::ZERO,
            think_time_jitter_pct: 0.0,
            output_dir: "out".into(),
            drain_grace: Duration::from_secs(10),
            no_progress: true,
        }
    }

    #[test]
    fn offsets_are_uniform_across_ramp_up() {
        let spec = spec(4, Duration::from_secs(20));
        assert_eq!(Duration::ZERO, spec.start_offset(0));
        assert_eq!(Duration::from_secs(5), spec.start_offset(1));
        assert_eq!(Duration::from_secs(10), spec.start_offset(2));
        assert_eq!(Duration::from_secs(15), spec.start_offset(3));
    }

    #[test]
    fn offsets_are_monotone_and_bounded() {
        let spec = spec(7, Duration::from_secs(13));
        let mut last = Duration::ZERO;
        for index in 0..spec.user_count {
            let offset = spec.start_offset(index);
            assert!(offset >= last);
            assert!(offset < spec.ramp_up);
            last = offset;
        }
    }

    #[test]
    fn single_user_starts_immediately() {
        let spec = spec(1, Duration::from_secs(60));
        assert_eq!(Duration::ZERO, spec.start_offset(0));
    }

    #[test]
    fn zero_ramp_up_starts_everyone_immediately() {
        let spec = spec(10, Duration::ZERO);
        for index in 0..10 {
            assert_eq!(Duration::ZERO, spec.start_offset(index));
        }
    }
}
