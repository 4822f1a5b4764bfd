use serde::Serialize;
use std::fmt;
use std::future::Future;

/// Identifier of one scheduled piece of work, unique per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkId(pub(crate) u64);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            WorkState::Succeeded | WorkState::Failed | WorkState::Cancelled
        )
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkState::Enqueued => "ENQUEUED",
            WorkState::Running => "RUNNING",
            WorkState::Succeeded => "SUCCEEDED",
            WorkState::Failed => "FAILED",
            WorkState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Latest known state of a piece of work.
///
/// For periodic work `state` describes the current period's run and
/// `run_attempt_count` restarts at zero each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkInfo {
    pub id: WorkId,
    pub state: WorkState,
    pub run_attempt_count: u32,
}

/// Result of a single attempt, as reported by a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    /// Known transient failure: re-run after the request's backoff.
    Retry,
    /// Terminal failure: not retried.
    Failure,
}

/// The unit of work an engine executes.
///
/// A panic inside `do_work` is treated as [`WorkOutcome::Failure`].
pub trait Worker: Send + Sync + 'static {
    fn do_work(&self) -> impl Future<Output = WorkOutcome> + Send;
}
