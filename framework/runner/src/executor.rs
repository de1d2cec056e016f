use std::future::Future;
use std::time::Duration;

use gust_core::prelude::{ForcedCancelError, ShutdownHandle, ShutdownSignalError};

/// Bridge between the user threads and the shared Tokio runtime.
///
/// User loops are plain threads. Any async work they need, including the scenario's own I/O,
/// goes through this type so that it observes the run's cancellation signals.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    stop: ShutdownHandle,
    force: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(
        runtime: tokio::runtime::Runtime,
        stop: ShutdownHandle,
        force: ShutdownHandle,
    ) -> Self {
        Self {
            runtime,
            stop,
            force,
        }
    }

    /// Run async work in place, blocking until it completes.
    ///
    /// The future is only cancelled by the forced-cancellation signal that fires when the drain
    /// grace period expires, not by the graceful stop signal, so in-flight iterations get their
    /// chance to finish during draining. A future which never suspends cannot be cancelled and
    /// may hold up shutdown.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut force_listener = self.force.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = force_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ForcedCancelError::default()))
                },
            }
        })
    }

    /// Run async work in place, abandoning it when the graceful stop signal is raised.
    ///
    /// On cancellation the future is dropped and a [ShutdownSignalError] is returned, which
    /// the user loop treats as a clean exit rather than a failed iteration. Use this for work
    /// that is safe to abandon mid-flight; work that should be allowed to finish during
    /// draining belongs in [Executor::execute_in_place].
    pub fn execute_cancellable<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut stop_listener = self.stop.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = stop_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Sleep for `duration`, waking early if the graceful stop signal is raised.
    ///
    /// Returns false if the sleep was cut short or the signal was already set, in which case
    /// the caller should head for its exit path.
    pub fn cancellable_sleep(&self, duration: Duration) -> bool {
        let mut stop_listener = self.stop.new_listener();
        if stop_listener.should_shutdown() {
            return false;
        }
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = stop_listener.wait_for_shutdown() => false,
            }
        })
    }

    /// Submit async work to run in the background.
    ///
    /// The future is not tied to either cancellation signal and the runner will not wait for it
    /// before shutting down.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }

    /// Run a future to completion without any cancellation. Orchestrator use only, the
    /// orchestrator does its own signal racing.
    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}
