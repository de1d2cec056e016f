mod errors;
mod shutdown;

pub mod prelude {
    pub use crate::errors::{ForcedCancelError, ShutdownSignalError};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
