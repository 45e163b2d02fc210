use compozy_core::ids::{TaskExecId, TaskId, WorkflowExecId};
use compozy_core::state::TaskState;
use compozy_core::task_config::{Component, TaskConfig};
use serde_json::Value;

use crate::error::ResponseError;

/// What the activity that backed this task produced, already classified by
/// the caller (the durable runtime tells the Execution Driver which of
/// these happened).
#[derive(Debug, Clone)]
pub enum ActivityOutcome {
    Success(Value),
    Failed(compozy_core::error::CompozyError),
    Canceled,
    TimedOut,
}

pub enum NextDirective {
    Complete,
    Next(TaskId),
    WaitForSignal { name: String, timeout_ms: u64 },
    PendingChildren,
}

pub struct ResponseOutcome {
    pub persisted_state: TaskState,
    pub next: NextDirective,
}

/// Everything a `ResponseHandler` needs. For `parallel`/`collection`/
/// `composite` tasks, the Execution Driver calls the handler again after
/// *every* child arrival, not just the last: `children` holds whichever
/// terminal child states have reported so far (in arrival order), and
/// `children_total` is the number of children the container actually
/// dispatched. A handler must treat `children.len() < children_total` as
/// "still waiting" (`NextDirective::PendingChildren`) — `children` alone
/// can never distinguish "1 of 1 reported" from "1 of 5 reported", since
/// every element of it is by construction already terminal.
pub struct ResponseInput<'a> {
    pub task_exec_id: TaskExecId,
    pub task_id: TaskId,
    pub workflow_exec_id: WorkflowExecId,
    pub parent_state_id: Option<TaskExecId>,
    pub component: Component,
    pub cfg: &'a TaskConfig,
    pub outcome: ActivityOutcome,
    /// Context vars (`workflow`, `tasks`, `env`, `parent`, ...) the Outputs
    /// transformation renders against; `output` is bound in internally from
    /// the raw activity result.
    pub vars: Value,
    pub attempt: u32,
    pub children: Vec<TaskState>,
    pub children_total: usize,
}

pub type ResponseResult<T> = Result<T, ResponseError>;
