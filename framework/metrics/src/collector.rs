use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use gust_summary_model::{OverallStats, RunMetadata, RunSummary, UserSummary};
use parking_lot::Mutex;

use crate::stats::compute_step_stats;
use crate::{unix_now, EventType, LogEvent, StepRecord};

/// Most recent errors kept per user, oldest dropped first.
const MAX_TRACKED_ERRORS: usize = 10;

/// Name of the durable event log within the output directory.
const EVENT_LOG_NAME: &str = "events.ndjson";

/// Running totals for one virtual user, updated by that user's recording calls.
#[derive(Debug, Clone, PartialEq)]
pub struct UserResult {
    pub user_id: usize,
    pub iterations_completed: u64,
    pub iterations_failed: u64,
    pub started_at: Option<f64>,
    pub ended_at: Option<f64>,
    pub errors: Vec<String>,
}

impl UserResult {
    fn new(user_id: usize) -> Self {
        Self {
            user_id,
            iterations_completed: 0,
            iterations_failed: 0,
            started_at: None,
            ended_at: None,
            errors: Vec::new(),
        }
    }

    fn push_error(&mut self, error: String) {
        if self.errors.len() == MAX_TRACKED_ERRORS {
            self.errors.remove(0);
        }
        self.errors.push(error);
    }
}

/// The configuration facts needed to label a [RunSummary].
///
/// Provided by the runner so that this crate does not need to know about its run spec type.
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub run_id: String,
    pub scenario_name: String,
    pub user_count: usize,
    pub ramp_up_seconds: u64,
    pub duration_seconds: u64,
}

/// Serializes concurrent writes from many user threads into a consistent event log and sample
/// set.
///
/// Every recording call takes the single internal lock, appends to the in-memory state and
/// writes one line to the durable event log, flushed before the lock is released. The lock is
/// never held across an async suspension point because nothing here is async.
///
/// If the event log cannot be written the collector degrades to in-memory only. Collection
/// continues and the condition is surfaced as a warning on the computed summary.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

struct Inner {
    steps: Vec<StepRecord>,
    users: HashMap<usize, UserResult>,
    events: Vec<LogEvent>,
    log_file: Option<File>,
    log_degraded: bool,
    run_started_at: Option<f64>,
    run_ended_at: Option<f64>,
}

impl Inner {
    fn append_event(&mut self, event: LogEvent) {
        if let Some(file) = self.log_file.as_mut() {
            if let Err(e) = write_event_line(file, &event) {
                log::warn!("Event log write failed, continuing in-memory only: {e:?}");
                self.log_file = None;
                self.log_degraded = true;
            }
        }
        self.events.push(event);
    }
}

fn write_event_line(file: &mut File, event: &LogEvent) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *file, event)?;
    file.write_all(b"\n")?;
    // Flushed per event so a killed process still leaves a readable partial log.
    file.flush()?;
    Ok(())
}

impl MetricsCollector {
    /// Create a collector writing its event log into `output_dir`.
    ///
    /// Failure to open the log is not fatal, see the type level docs.
    pub fn new(output_dir: &Path) -> Self {
        let (log_file, log_degraded) = match open_event_log(output_dir) {
            Ok(file) => (Some(file), false),
            Err(e) => {
                log::warn!(
                    "Could not open event log in {}, events will be kept in memory only: {e:?}",
                    output_dir.display()
                );
                (None, true)
            }
        };

        Self {
            inner: Mutex::new(Inner {
                steps: Vec::new(),
                users: HashMap::new(),
                events: Vec::new(),
                log_file,
                log_degraded,
                run_started_at: None,
                run_ended_at: None,
            }),
        }
    }

    /// Mark the start of the run. The actual duration reported on the summary is measured from
    /// here.
    pub fn start_run(&self) {
        self.inner.lock().run_started_at = Some(unix_now());
    }

    /// Mark the end of the run, once no further writes will occur.
    pub fn end_run(&self) {
        self.inner.lock().run_ended_at = Some(unix_now());
    }

    pub fn register_user(&self, user_id: usize) {
        let mut inner = self.inner.lock();
        inner.users.insert(user_id, UserResult::new(user_id));
    }

    pub fn user_started(&self, user_id: usize) {
        let mut inner = self.inner.lock();
        let now = unix_now();
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.started_at = Some(now);
        }
        inner.append_event(LogEvent::new(EventType::UserStart).with_user(user_id));
    }

    pub fn user_ended(&self, user_id: usize) {
        let mut inner = self.inner.lock();
        let now = unix_now();
        match inner.users.get_mut(&user_id) {
            Some(user) if user.ended_at.is_none() => {
                user.ended_at = Some(now);
            }
            // Already ended, either by a racing forced cancel or a repeated call. Recording it
            // again would double-count the user.
            _ => return,
        }
        inner.append_event(LogEvent::new(EventType::UserEnd).with_user(user_id));
    }

    pub fn iteration_started(&self, user_id: usize, iteration: u64) {
        let mut inner = self.inner.lock();
        inner.append_event(
            LogEvent::new(EventType::IterationStart)
                .with_user(user_id)
                .with_iteration(iteration),
        );
    }

    pub fn iteration_completed(&self, user_id: usize, iteration: u64) {
        let mut inner = self.inner.lock();
        // Users that already ended, e.g. by a racing forced cancel, are not counted further.
        if let Some(user) = inner.users.get_mut(&user_id) {
            if user.ended_at.is_none() {
                user.iterations_completed += 1;
            }
        }
        inner.append_event(
            LogEvent::new(EventType::IterationEnd)
                .with_user(user_id)
                .with_iteration(iteration)
                .with_success(true),
        );
    }

    pub fn iteration_failed(&self, user_id: usize, iteration: u64, error: &str) {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.users.get_mut(&user_id) {
            if user.ended_at.is_none() {
                user.iterations_failed += 1;
                user.push_error(error.to_string());
            }
        }
        inner.append_event(
            LogEvent::new(EventType::IterationError)
                .with_user(user_id)
                .with_iteration(iteration)
                .with_success(false)
                .with_error(error),
        );
    }

    /// Record a user-level failure outside any iteration, such as a failed session setup.
    pub fn user_error(&self, user_id: usize, error: &str) {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.users.get_mut(&user_id) {
            if user.ended_at.is_none() {
                user.push_error(error.to_string());
            }
        }
        inner.append_event(
            LogEvent::new(EventType::IterationError)
                .with_user(user_id)
                .with_success(false)
                .with_error(error),
        );
    }

    /// Record that a user was cut off by the runner because it did not settle within the drain
    /// grace period. No-op if the user has already ended cleanly.
    pub fn force_cancel_user(&self, user_id: usize, error: &str) {
        let mut inner = self.inner.lock();
        let now = unix_now();
        match inner.users.get_mut(&user_id) {
            Some(user) if user.ended_at.is_none() => {
                user.iterations_failed += 1;
                user.push_error(error.to_string());
                user.ended_at = Some(now);
            }
            _ => return,
        }
        inner.append_event(
            LogEvent::new(EventType::IterationError)
                .with_user(user_id)
                .with_success(false)
                .with_error(error),
        );
        inner.append_event(LogEvent::new(EventType::UserEnd).with_user(user_id));
    }

    /// Accept an immutable step record into the sample set and the event log.
    pub fn record_step(&self, record: StepRecord) {
        let mut inner = self.inner.lock();
        let event_type = if record.success {
            EventType::StepEnd
        } else {
            EventType::StepError
        };
        let mut event = LogEvent::new(event_type)
            .with_user(record.user_id)
            .with_iteration(record.iteration)
            .with_step_name(record.step_name.clone())
            .with_duration_ms(record.duration_ms)
            .with_success(record.success);
        if let Some(error) = &record.error {
            event = event.with_error(error.clone());
        }
        inner.steps.push(record);
        inner.append_event(event);
    }

    /// Aggregate the current sample set per step name.
    ///
    /// Valid at any time; a mid-run call sees a consistent snapshot but may miss in-flight
    /// steps.
    pub fn compute_step_stats(&self) -> HashMap<String, gust_summary_model::StepStats> {
        let inner = self.inner.lock();
        compute_step_stats(&inner.steps)
    }

    /// Combine per-user and per-step aggregates into the final [RunSummary].
    ///
    /// Throughput is computed against the actual elapsed run time, not the configured duration,
    /// so delayed shutdowns are reflected honestly.
    pub fn compute_summary(&self, descriptor: &RunDescriptor) -> RunSummary {
        let inner = self.inner.lock();

        let started_at = inner.run_started_at.unwrap_or_else(unix_now);
        let ended_at = inner.run_ended_at.unwrap_or_else(unix_now);
        let actual_duration = (ended_at - started_at).max(0.0);

        let total_iterations: u64 = inner.users.values().map(|u| u.iterations_completed).sum();
        let failed_iterations: u64 = inner.users.values().map(|u| u.iterations_failed).sum();
        let total_steps = inner.steps.len() as u64;
        let failed_steps = inner.steps.iter().filter(|s| !s.success).count() as u64;

        let mut per_user: Vec<UserSummary> = inner
            .users
            .values()
            .map(|u| UserSummary {
                user_id: u.user_id,
                iterations_completed: u.iterations_completed,
                iterations_failed: u.iterations_failed,
                started_at: u.started_at,
                ended_at: u.ended_at,
                errors: u.errors.clone(),
            })
            .collect();
        per_user.sort_by_key(|u| u.user_id);

        let mut warnings = Vec::new();
        if inner.log_degraded {
            warnings.push(
                "Event log writing failed during the run, the durable event log is missing or \
                 incomplete"
                    .to_string(),
            );
        }

        RunSummary {
            metadata: RunMetadata {
                run_id: descriptor.run_id.clone(),
                scenario_name: descriptor.scenario_name.clone(),
                started_at: started_at as i64,
                ended_at: ended_at as i64,
                user_count: descriptor.user_count,
                ramp_up_seconds: descriptor.ramp_up_seconds,
                configured_duration_seconds: descriptor.duration_seconds,
                actual_duration_seconds: actual_duration,
            },
            overall: OverallStats {
                total_iterations,
                failed_iterations,
                iteration_error_rate: failed_iterations as f64
                    / std::cmp::max(total_iterations + failed_iterations, 1) as f64,
                total_steps,
                failed_steps,
                step_error_rate: failed_steps as f64 / std::cmp::max(total_steps, 1) as f64,
                throughput_iterations_per_sec: total_iterations as f64
                    / actual_duration.max(1.0),
            },
            per_user,
            per_step: compute_step_stats(&inner.steps),
            warnings,
        }
    }

    /// Snapshot of the in-memory sample set.
    pub fn step_records(&self) -> Vec<StepRecord> {
        self.inner.lock().steps.clone()
    }

    /// Snapshot of the in-memory event list.
    pub fn events(&self) -> Vec<LogEvent> {
        self.inner.lock().events.clone()
    }

    /// Snapshot of the per-user running totals.
    pub fn user_results(&self) -> Vec<UserResult> {
        let inner = self.inner.lock();
        let mut users: Vec<UserResult> = inner.users.values().cloned().collect();
        users.sort_by_key(|u| u.user_id);
        users
    }
}

fn open_event_log(output_dir: &Path) -> anyhow::Result<File> {
    std::fs::create_dir_all(output_dir)?;
    let file = File::create(output_dir.join(EVENT_LOG_NAME))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::BufRead;

    fn step(user_id: usize, iteration: u64, name: &str, duration_ms: f64, success: bool) -> StepRecord {
        let started_at = unix_now();
        StepRecord {
            user_id,
            iteration,
            step_name: name.to_string(),
            started_at,
            ended_at: started_at + duration_ms / 1000.0,
            duration_ms,
            success,
            error: (!success).then(|| "step failed".to_string()),
        }
    }

    fn descriptor() -> RunDescriptor {
        RunDescriptor {
            run_id: "test".to_string(),
            scenario_name: "collector_test".to_string(),
            user_count: 2,
            ramp_up_seconds: 0,
            duration_seconds: 1,
        }
    }

    #[test]
    fn accepted_steps_round_trip_through_memory_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());

        collector.register_user(1);
        collector.user_started(1);
        let records = vec![
            step(1, 1, "login", 12.5, true),
            step(1, 1, "browse", 40.0, true),
            step(1, 2, "login", 99.0, false),
        ];
        for record in &records {
            collector.record_step(record.clone());
        }

        // In-memory sample set holds the records verbatim
        assert_eq!(records, collector.step_records());

        // And the same facts are on disk, one JSON object per line
        let file = std::fs::File::open(dir.path().join("events.ndjson")).unwrap();
        let logged: Vec<LogEvent> = std::io::BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect();
        assert_eq!(collector.events(), logged);

        let step_events: Vec<&LogEvent> = logged
            .iter()
            .filter(|e| matches!(e.event_type, EventType::StepEnd | EventType::StepError))
            .collect();
        assert_eq!(records.len(), step_events.len());
        for (record, event) in records.iter().zip(step_events) {
            assert_eq!(Some(record.user_id), event.user_id);
            assert_eq!(Some(record.iteration), event.iteration);
            assert_eq!(Some(record.step_name.clone()), event.step_name);
            assert_eq!(Some(record.duration_ms), event.duration_ms);
            assert_eq!(Some(record.success), event.success);
            assert_eq!(record.error, event.error);
        }
    }

    #[test]
    fn iteration_bookkeeping_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());

        collector.register_user(1);
        collector.register_user(2);
        collector.iteration_completed(1, 1);
        collector.iteration_completed(1, 2);
        collector.iteration_failed(1, 3, "boom");
        collector.iteration_completed(2, 1);

        let users = collector.user_results();
        assert_eq!(2, users[0].iterations_completed);
        assert_eq!(1, users[0].iterations_failed);
        assert_eq!(vec!["boom".to_string()], users[0].errors);
        assert_eq!(1, users[1].iterations_completed);
        assert_eq!(0, users[1].iterations_failed);
    }

    #[test]
    fn tracked_errors_are_bounded_oldest_dropped_first() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());

        collector.register_user(1);
        for i in 0..15 {
            collector.iteration_failed(1, i, &format!("error {i}"));
        }

        let users = collector.user_results();
        assert_eq!(MAX_TRACKED_ERRORS, users[0].errors.len());
        assert_eq!("error 5", users[0].errors[0]);
        assert_eq!("error 14", users[0].errors[MAX_TRACKED_ERRORS - 1]);
    }

    #[test]
    fn user_end_is_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());

        collector.register_user(1);
        collector.user_started(1);
        collector.user_ended(1);
        collector.user_ended(1);

        let end_events = collector
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::UserEnd)
            .count();
        assert_eq!(1, end_events);
    }

    #[test]
    fn forced_cancel_marks_user_failed_and_ended() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());

        collector.register_user(1);
        collector.user_started(1);
        collector.force_cancel_user(1, "forcibly cancelled");

        let users = collector.user_results();
        assert_eq!(1, users[0].iterations_failed);
        assert!(users[0].ended_at.is_some());

        // A later clean end must not double-record
        collector.user_ended(1);
        let end_events = collector
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::UserEnd)
            .count();
        assert_eq!(1, end_events);
    }

    #[test]
    fn forced_cancel_after_clean_end_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());

        collector.register_user(1);
        collector.user_started(1);
        collector.user_ended(1);
        collector.force_cancel_user(1, "forcibly cancelled");

        let users = collector.user_results();
        assert_eq!(0, users[0].iterations_failed);
    }

    #[test]
    fn unwritable_log_degrades_to_in_memory_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        // Occupy the output path with a file so the directory cannot be created
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"not a directory").unwrap();

        let collector = MetricsCollector::new(&blocked);
        collector.register_user(1);
        collector.record_step(step(1, 1, "login", 10.0, true));

        // Collection still works
        assert_eq!(1, collector.step_records().len());

        let summary = collector.compute_summary(&descriptor());
        assert!(!summary.warnings.is_empty());
    }

    #[test]
    fn summary_aggregates_counts_rates_and_throughput() {
        let dir = tempfile::tempdir().unwrap();
        let collector = MetricsCollector::new(dir.path());
        collector.start_run();

        collector.register_user(1);
        collector.register_user(2);
        collector.iteration_completed(1, 1);
        collector.iteration_completed(2, 1);
        collector.iteration_failed(2, 2, "boom");
        collector.record_step(step(1, 1, "login", 10.0, true));
        collector.record_step(step(2, 1, "login", 20.0, true));
        collector.record_step(step(2, 2, "login", 30.0, false));

        collector.end_run();
        let summary = collector.compute_summary(&descriptor());

        assert_eq!(2, summary.overall.total_iterations);
        assert_eq!(1, summary.overall.failed_iterations);
        assert_eq!(3, summary.overall.total_steps);
        assert_eq!(1, summary.overall.failed_steps);
        assert_eq!(2, summary.per_user.len());
        assert_eq!(3, summary.per_step["login"].count);
        // Run took well under a second, so the denominator is clamped to 1s
        assert_eq!(2.0, summary.overall.throughput_iterations_per_sec);
        assert!(summary.warnings.is_empty());
    }
}
