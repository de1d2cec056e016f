use gust_core::prelude::DelegatedShutdownListener;

use crate::spec::RunSpec;

/// What the scheduler decided about the next user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The user at this index should start now
    Start(usize),
    /// Every user has been scheduled
    Complete,
    /// The run was cancelled, no further users will be scheduled
    Aborted,
}

/// Decides when each virtual user starts, spreading starts uniformly across the ramp-up
/// period.
///
/// Users already started are unaffected by cancellation; this only stops the scheduling of
/// the remainder.
pub struct RampScheduler {
    spec: RunSpec,
    next_index: usize,
    started_at: tokio::time::Instant,
    shutdown_listener: DelegatedShutdownListener,
}

impl RampScheduler {
    pub fn new(spec: &RunSpec, shutdown_listener: DelegatedShutdownListener) -> Self {
        Self {
            spec: spec.clone(),
            next_index: 0,
            started_at: tokio::time::Instant::now(),
            shutdown_listener,
        }
    }

    /// Suspend until the next user's start offset elapses or the stop signal fires, whichever
    /// is first.
    ///
    /// Start outcomes are strictly increasing by index and never exceed the configured user
    /// count, regardless of cancellation races.
    pub async fn schedule_next(&mut self) -> ScheduleOutcome {
        if self.next_index >= self.spec.user_count {
            return ScheduleOutcome::Complete;
        }
        if self.shutdown_listener.should_shutdown() {
            return ScheduleOutcome::Aborted;
        }

        let index = self.next_index;
        let deadline = self.started_at + self.spec.start_offset(index);
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                self.next_index += 1;
                ScheduleOutcome::Start(index)
            }
            _ = self.shutdown_listener.wait_for_shutdown() => ScheduleOutcome::Aborted,
        }
    }
}
