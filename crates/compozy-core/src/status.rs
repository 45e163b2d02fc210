//! Workflow/task status and the allowed transition graph (invariant 1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Waiting,
    Paused,
    Success,
    Failed,
    Canceled,
    TimedOut,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Canceled | Status::TimedOut
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Waiting => "waiting",
            Status::Paused => "paused",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Canceled => "canceled",
            Status::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// Whether `to` is a legal successor of `from` in the state machine.
///
/// Terminal statuses have no outgoing edges. `Pending` is the only entry
/// point. `Waiting`/`Paused` are the two suspension states and both resume
/// back into `Running`.
pub fn allowed_transition(from: Status, to: Status) -> bool {
    use Status::*;
    if from == to {
        return false;
    }
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (Pending, Running)
            | (Pending, Canceled)
            | (Running, Waiting)
            | (Running, Paused)
            | (Running, Success)
            | (Running, Failed)
            | (Running, Canceled)
            | (Running, TimedOut)
            | (Waiting, Running)
            | (Waiting, Canceled)
            | (Waiting, TimedOut)
            | (Paused, Running)
            | (Paused, Canceled)
    )
}
