use crate::user::UserContext;

pub type HookResult = anyhow::Result<()>;

/// The work each virtual user performs, supplied to [crate::run::run] as an already
/// constructed object. The runner decides how many users run and when they start and stop; the
/// scenario decides what a user actually does.
///
/// One scenario instance is shared by every user, so any state on `self` must be safe for
/// concurrent use. Per-user state belongs in the [Scenario::Session].
pub trait Scenario: Send + Sync + 'static {
    /// Whatever per-user resource the scenario needs for its iterations, such as a browser
    /// context or an HTTP client with a session cookie. Exclusively owned by one user for its
    /// lifetime.
    type Session: Send + 'static;

    /// Acquire the session for one user. An error here is fatal for that user only: it is
    /// marked done with zero iterations and the rest of the run continues.
    fn setup(&self, user: &mut UserContext) -> anyhow::Result<Self::Session>;

    /// One full pass of the scenario's unit of work.
    ///
    /// Report timed sub-actions through [UserContext::timed_step] as you go. Returning an
    /// error marks the iteration failed and is recorded, but never terminates the user's loop.
    fn run_iteration(&self, user: &mut UserContext, session: &mut Self::Session) -> HookResult;

    /// Release the session. Runs on every exit path, including after a failed iteration or
    /// cancellation. Best effort; errors are logged and ignored.
    fn teardown(&self, _user: &mut UserContext, _session: Self::Session) -> HookResult {
        Ok(())
    }
}
