mod collector;
mod percentile;
mod report;
mod stats;

use serde::{Deserialize, Serialize};

pub use collector::{MetricsCollector, RunDescriptor, UserResult};
pub use percentile::percentile;
pub use report::print_step_summary;
pub use stats::compute_step_stats;

/// An immutable record of one timed step attempt within an iteration.
///
/// Created exactly once when the step finishes or fails, then appended to the collector and
/// never edited again.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub user_id: usize,
    pub iteration: u64,
    pub step_name: String,
    /// Unix timestamp in seconds
    pub started_at: f64,
    /// Unix timestamp in seconds
    pub ended_at: f64,
    pub duration_ms: f64,
    pub success: bool,
    /// Present iff the step failed
    pub error: Option<String>,
}

/// The kinds of event written to the durable event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserStart,
    UserEnd,
    IterationStart,
    IterationEnd,
    IterationError,
    StepEnd,
    StepError,
}

/// One line of the newline-delimited JSON event log.
///
/// Every recording call on the collector appends one of these to `events.ndjson`, flushed per
/// event so that a killed process still leaves a readable partial record behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    /// The same instant in RFC 3339 form, for humans reading the log
    pub datetime: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            timestamp: unix_now(),
            datetime: chrono::Local::now().to_rfc3339(),
            event_type,
            user_id: None,
            iteration: None,
            step_name: None,
            duration_ms: None,
            success: None,
            error: None,
        }
    }

    pub fn with_user(mut self, user_id: usize) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_iteration(mut self, iteration: u64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_step_name(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub(crate) fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
