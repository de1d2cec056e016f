use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use gust_core::prelude::{
    DelegatedShutdownListener, ForcedCancelError, ShutdownHandle, ShutdownSignalError,
};
use gust_metrics::{MetricsCollector, StepRecord};
use rand::Rng;

use crate::executor::Executor;
use crate::scenario::Scenario;
use crate::spec::RunSpec;

/// Most recent errors kept on the user state, oldest dropped first.
const LAST_ERRORS_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Pending,
    Running,
    Stopping,
    Done,
}

/// The mutable state of one virtual user.
///
/// Owned exclusively by the user's own thread; nothing else mutates it. A snapshot is handed
/// back to the orchestrator when the user exits.
#[derive(Debug, Clone)]
pub struct VirtualUserState {
    pub id: usize,
    pub status: UserStatus,
    pub iterations_completed: u64,
    pub iterations_failed: u64,
    /// Unix timestamp in seconds
    pub started_at: Option<f64>,
    /// Unix timestamp in seconds, set once the user is done
    pub ended_at: Option<f64>,
    pub last_errors: Vec<String>,
}

impl VirtualUserState {
    fn new(id: usize) -> Self {
        Self {
            id,
            status: UserStatus::Pending,
            iterations_completed: 0,
            iterations_failed: 0,
            started_at: None,
            ended_at: None,
            last_errors: Vec::new(),
        }
    }

    fn push_error(&mut self, error: String) {
        if self.last_errors.len() == LAST_ERRORS_CAP {
            self.last_errors.remove(0);
        }
        self.last_errors.push(error);
    }
}

/// Final snapshot of a user, sent to the orchestrator as the user thread exits.
#[derive(Debug)]
pub(crate) struct UserReport {
    pub state: VirtualUserState,
}

/// Handed to the scenario for every hook call. Carries the user's identity, the reporting
/// surface and the cancellation signal.
pub struct UserContext {
    user_id: usize,
    iteration: u64,
    executor: Arc<Executor>,
    metrics: Arc<MetricsCollector>,
    shutdown_listener: DelegatedShutdownListener,
    stop: ShutdownHandle,
}

impl UserContext {
    fn new(
        user_id: usize,
        executor: Arc<Executor>,
        metrics: Arc<MetricsCollector>,
        shutdown_listener: DelegatedShutdownListener,
        stop: ShutdownHandle,
    ) -> Self {
        Self {
            user_id,
            iteration: 0,
            executor,
            metrics,
            shutdown_listener,
            stop,
        }
    }

    pub fn user_id(&self) -> usize {
        self.user_id
    }

    /// The current iteration number, starting at 1.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// Request a graceful stop of the whole run, as if the duration had elapsed.
    pub fn stop_run(&self) {
        self.stop.shutdown();
    }

    /// Time a named sub-action of the current iteration and record it.
    ///
    /// A record is created whether the closure succeeds or fails, and the closure's result is
    /// handed back unchanged so it can be propagated with `?`.
    pub fn timed_step<T>(
        &mut self,
        step_name: &str,
        f: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let started_wall = unix_now();
        let started = std::time::Instant::now();
        let result = f();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.metrics.record_step(StepRecord {
            user_id: self.user_id,
            iteration: self.iteration,
            step_name: step_name.to_string(),
            started_at: started_wall,
            ended_at: started_wall + duration_ms / 1000.0,
            duration_ms,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| format!("{e:#}")),
        });

        result
    }
}

/// Start one virtual user on its own named thread and return the join handle.
///
/// The thread runs the user's whole lifecycle: session setup, the iteration loop, think-time
/// pacing and teardown. It reports every boundary to the collector and sends a final state
/// snapshot through `report_tx` just before exiting.
pub(crate) fn spawn_user<S: Scenario>(
    user_id: usize,
    spec: Arc<RunSpec>,
    scenario: Arc<S>,
    executor: Arc<Executor>,
    metrics: Arc<MetricsCollector>,
    stop: ShutdownHandle,
    report_tx: Sender<UserReport>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("user-{user_id}"))
        .spawn(move || {
            let shutdown_listener = stop.new_listener();
            let mut state = VirtualUserState::new(user_id);
            let mut context = UserContext::new(
                user_id,
                executor.clone(),
                metrics.clone(),
                shutdown_listener.clone(),
                stop,
            );

            metrics.user_started(user_id);
            state.status = UserStatus::Running;
            state.started_at = Some(unix_now());

            match scenario.setup(&mut context) {
                Ok(mut session) => {
                    run_loop(
                        &spec,
                        scenario.as_ref(),
                        &executor,
                        &metrics,
                        &shutdown_listener,
                        &mut context,
                        &mut state,
                        &mut session,
                    );

                    if let Err(e) = scenario.teardown(&mut context, session) {
                        log::error!("Teardown failed for user {user_id}: {e:?}");
                    }
                }
                Err(e) => {
                    // Fatal for this user only. The rest of the run carries on.
                    log::error!("Setup failed for user {user_id}: {e:?}");
                    let msg = format!("setup failed: {e:#}");
                    state.push_error(msg.clone());
                    metrics.user_error(user_id, &msg);
                }
            }

            state.status = UserStatus::Done;
            state.ended_at = Some(unix_now());
            metrics.user_ended(user_id);
            log::debug!(
                "User {user_id} done after {} completed / {} failed iterations",
                state.iterations_completed,
                state.iterations_failed
            );

            // The orchestrator may have stopped listening after the drain grace expired.
            let _ = report_tx.send(UserReport { state });
        })
        .expect("Failed to spawn thread for virtual user")
}

#[allow(clippy::too_many_arguments)]
fn run_loop<S: Scenario>(
    spec: &RunSpec,
    scenario: &S,
    executor: &Executor,
    metrics: &MetricsCollector,
    shutdown_listener: &DelegatedShutdownListener,
    context: &mut UserContext,
    state: &mut VirtualUserState,
    session: &mut S::Session,
) {
    let mut iteration: u64 = 0;
    loop {
        if shutdown_listener.should_shutdown() {
            log::debug!("Stopping user {}", state.id);
            state.status = UserStatus::Stopping;
            break;
        }

        iteration += 1;
        context.iteration = iteration;
        metrics.iteration_started(state.id, iteration);

        match scenario.run_iteration(context, session) {
            Ok(()) => {
                state.iterations_completed += 1;
                metrics.iteration_completed(state.id, iteration);
            }
            Err(e) if e.is::<ShutdownSignalError>() => {
                // Expected when the scenario observed the stop signal mid-iteration. Not a
                // failure; the check at the top of the loop will break out.
            }
            Err(e) if e.is::<ForcedCancelError>() => {
                // The drain grace period expired while this iteration was in flight. Record
                // the cut-off rather than dropping it silently, then exit.
                let msg = format!("{e:#}");
                state.iterations_failed += 1;
                state.push_error(msg.clone());
                metrics.iteration_failed(state.id, iteration, &msg);
                state.status = UserStatus::Stopping;
                break;
            }
            Err(e) => {
                // A failed iteration never terminates the user's loop.
                let msg = format!("{e:#}");
                log::error!("User {} iteration {iteration} failed: {e:?}", state.id);
                state.iterations_failed += 1;
                state.push_error(msg.clone());
                metrics.iteration_failed(state.id, iteration, &msg);
            }
        }

        let pause = jittered_think_time(spec.think_time, spec.think_time_jitter_pct);
        if !pause.is_zero() && !shutdown_listener.should_shutdown() {
            executor.cancellable_sleep(pause);
        }
    }
}

/// Apply uniform jitter of up to +/- half the configured percentage to the base think time.
fn jittered_think_time(base: Duration, jitter_pct: f64) -> Duration {
    if base.is_zero() || jitter_pct <= 0.0 {
        return base;
    }
    let half = jitter_pct / 100.0 / 2.0;
    let factor = 1.0 + rand::thread_rng().gen_range(-half..=half);
    base.mul_f64(factor.max(0.0))
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
