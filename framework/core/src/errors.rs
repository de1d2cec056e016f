/// Returned from work that was cancelled by the graceful stop signal.
///
/// This is not a failure. The user loop checks for it so that a cancelled operation is not
/// counted as a failed iteration.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}

/// Returned from work that was forcibly cancelled because it did not finish within the drain
/// grace period.
///
/// Unlike [ShutdownSignalError] this marks the interrupted iteration as failed, so that the
/// cut-off is visible in the results rather than silently dropped.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ForcedCancelError {
    msg: String,
}

impl Default for ForcedCancelError {
    fn default() -> Self {
        Self {
            msg: "Iteration forcibly cancelled after the drain grace period".to_string(),
        }
    }
}
