use std::sync::Arc;

use tokio::sync::watch::{Receiver, Sender};

/// The shared stop flag for a run.
///
/// Raising the flag is idempotent and the flag stays raised for the rest of the run. Listeners
/// created after the flag has been raised will still observe it, which is what makes this safe to
/// use for cancelling work that has not started yet.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Raise the stop flag. May be called from any thread, any number of times.
    pub fn shutdown(&self) {
        let was_set = self.sender.send_replace(true);
        if was_set {
            log::debug!("Shutdown signal raised again, no further effect");
        }
    }

    /// Point in time check of the flag without creating a listener.
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the stop flag has been raised. If this returns true then work
    /// should be stopped so that the run can shut down.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the stop flag is raised. It is safe to race this with another future so that
    /// the signal can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        // An Err here means the handle was dropped, which we treat the same as a shutdown.
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}
