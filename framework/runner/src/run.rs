use std::collections::HashMap;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use gust_core::prelude::ForcedCancelError;
use gust_metrics::{print_step_summary, MetricsCollector, RunDescriptor};
use gust_summary_model::{append_run_summary, RunSummary};

use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::ramp::{RampScheduler, ScheduleOutcome};
use crate::scenario::Scenario;
use crate::shutdown::start_shutdown_listener;
use crate::spec::RunSpec;
use crate::user::{spawn_user, UserReport};

/// Default time allowed for in-flight iterations to finish after the stop signal before they
/// are forcibly cancelled. Applied uniformly to all users from the moment draining begins.
pub const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Extra time for forcibly cancelled users to observe the cancellation and settle.
const FORCE_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Ramping,
    SteadyState,
    Draining,
    Done,
}

fn advance(phase: &mut RunPhase, next: RunPhase) {
    log::debug!("Run phase {phase:?} -> {next:?}");
    *phase = next;
}

/// Execute one load run to completion and return its summary.
///
/// Owns the whole lifecycle: ramp-up, the steady-state duration timer racing the interrupt
/// signal, bounded-grace draining and the final aggregation. The spec is consumed; a new run
/// needs a new spec.
pub fn run<S: Scenario>(spec: RunSpec, scenario: S) -> anyhow::Result<RunSummary> {
    log::info!(
        "Starting run {} of scenario '{}': {} users, {}s ramp-up, {}s steady state",
        spec.run_id,
        spec.scenario_name,
        spec.user_count,
        spec.ramp_up.as_secs(),
        spec.duration.as_secs(),
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let stop = start_shutdown_listener(&runtime);
    let force = gust_core::prelude::ShutdownHandle::new();
    let executor = Arc::new(Executor::new(runtime, stop.clone(), force.clone()));

    let metrics = Arc::new(MetricsCollector::new(&spec.output_dir));
    metrics.start_run();

    if !spec.no_progress {
        start_progress(spec.ramp_up + spec.duration, stop.new_listener());
    }
    // Report high resource usage by the generator itself, which would make the results
    // misleading.
    start_monitor(stop.new_listener());

    let spec = Arc::new(spec);
    let scenario = Arc::new(scenario);
    let mut phase = RunPhase::Idle;

    // Ramp-up
    advance(&mut phase, RunPhase::Ramping);
    let (report_tx, report_rx) = std::sync::mpsc::channel::<UserReport>();
    let mut scheduler = RampScheduler::new(&spec, stop.new_listener());
    let mut running: HashMap<usize, JoinHandle<()>> = HashMap::new();
    loop {
        match executor.block_on(scheduler.schedule_next()) {
            ScheduleOutcome::Start(index) => {
                let user_id = index + 1;
                metrics.register_user(user_id);
                running.insert(
                    user_id,
                    spawn_user(
                        user_id,
                        spec.clone(),
                        scenario.clone(),
                        executor.clone(),
                        metrics.clone(),
                        stop.clone(),
                        report_tx.clone(),
                    ),
                );
                log::debug!("Started user {user_id}/{}", spec.user_count);
            }
            ScheduleOutcome::Complete => break,
            ScheduleOutcome::Aborted => {
                log::info!(
                    "Ramp-up interrupted, continuing with {} of {} users",
                    running.len(),
                    spec.user_count
                );
                break;
            }
        }
    }
    drop(report_tx);

    // Steady state, until the duration timer or the stop signal wins
    if !stop.is_shutdown() {
        advance(&mut phase, RunPhase::SteadyState);
        log::info!(
            "Ramp-up complete, running for {}s",
            spec.duration.as_secs()
        );
        let mut stop_listener = stop.new_listener();
        let steady = spec.duration;
        executor.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(steady) => {},
                _ = stop_listener.wait_for_shutdown() => {},
            }
        });
    }

    // Draining
    advance(&mut phase, RunPhase::Draining);
    log::info!("Stopping {} users...", running.len());
    stop.shutdown();

    let deadline = Instant::now() + spec.drain_grace;
    collect_reports(&report_rx, &mut running, deadline);

    if !running.is_empty() {
        log::warn!(
            "{} users still running after the {}s drain grace period, forcing cancellation",
            running.len(),
            spec.drain_grace.as_secs()
        );
        force.shutdown();
        collect_reports(&report_rx, &mut running, Instant::now() + FORCE_SETTLE);

        // Anything left is stuck in work that cannot observe cancellation. Record the cut-off
        // rather than dropping it silently, and detach the thread.
        let marker = ForcedCancelError::default().to_string();
        for (user_id, _handle) in running.drain() {
            log::error!("User {user_id} did not settle after forced cancellation, detaching");
            metrics.force_cancel_user(user_id, &marker);
        }
    }

    metrics.end_run();
    advance(&mut phase, RunPhase::Done);

    let summary = metrics.compute_summary(&RunDescriptor {
        run_id: spec.run_id.clone(),
        scenario_name: spec.scenario_name.clone(),
        user_count: spec.user_count,
        ramp_up_seconds: spec.ramp_up.as_secs(),
        duration_seconds: spec.duration.as_secs(),
    });

    print_step_summary(&summary.per_step);
    for warning in &summary.warnings {
        log::warn!("{warning}");
    }

    let summary_path = spec.output_dir.join("summary.jsonl");
    if let Err(e) = append_run_summary(summary.clone(), summary_path.clone()) {
        log::error!(
            "Failed to write run summary to {}: {e:?}",
            summary_path.display()
        );
    }

    log::info!(
        "Run {} complete: {} iterations, {} failed, results in {}",
        spec.run_id,
        summary.overall.total_iterations,
        summary.overall.failed_iterations,
        spec.output_dir.display()
    );

    Ok(summary)
}

/// Receive user reports until every running user has settled or the deadline passes, joining
/// each settled user's thread as its report arrives.
fn collect_reports(
    report_rx: &std::sync::mpsc::Receiver<UserReport>,
    running: &mut HashMap<usize, JoinHandle<()>>,
    deadline: Instant,
) {
    while !running.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match report_rx.recv_timeout(remaining) {
            Ok(report) => {
                if let Some(handle) = running.remove(&report.state.id) {
                    if handle.join().is_err() {
                        log::error!("Thread for user {} panicked", report.state.id);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
