mod cli;
mod executor;
mod init;
mod monitor;
mod progress;
mod ramp;
mod run;
mod scenario;
mod shutdown;
mod spec;
mod types;
mod user;

pub mod prelude {
    pub use crate::cli::ScenarioCli;
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::ramp::{RampScheduler, ScheduleOutcome};
    pub use crate::run::{run, DRAIN_GRACE};
    pub use crate::scenario::{HookResult, Scenario};
    pub use crate::spec::RunSpec;
    pub use crate::types::GustResult;
    pub use crate::user::{UserContext, UserStatus, VirtualUserState};
    pub use gust_core::prelude::*;
    pub use gust_metrics::{MetricsCollector, StepRecord};
    pub use gust_summary_model::RunSummary;
}
