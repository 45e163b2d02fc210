//! Persisted workflow/task state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentExecId, CorrelationId, TaskExecId, TaskId, ToolExecId, WorkflowExecId, WorkflowId};
use crate::status::Status;
use crate::task_config::{Component, ExecutionType};
use crate::usage::Usage;

/// User-visible failure object persisted on a terminal state. No stack
/// traces; `details` carries minimal structured context only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateError {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl From<&crate::error::CompozyError> for StateError {
    fn from(err: &crate::error::CompozyError) -> Self {
        let (message, details) = match err {
            crate::error::CompozyError::Validation(d)
            | crate::error::CompozyError::Template(d)
            | crate::error::CompozyError::TemplateSecurity(d)
            | crate::error::CompozyError::RouterNoMatch(d)
            | crate::error::CompozyError::CollectionTooLarge(d)
            | crate::error::CompozyError::Activity(d)
            | crate::error::CompozyError::Timeout(d)
            | crate::error::CompozyError::Cancellation(d)
            | crate::error::CompozyError::Conflict(d)
            | crate::error::CompozyError::EtagMismatch(d)
            | crate::error::CompozyError::InvalidTransition(d)
            | crate::error::CompozyError::NotFound(d) => (d.message.clone(), d.details.clone()),
        };
        Self {
            kind: err.kind().to_string(),
            message,
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_exec_id: WorkflowExecId,
    pub workflow_id: WorkflowId,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    pub status: Status,
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<StateError>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Materialized on read for template evaluation; never a lazy join.
    #[serde(default)]
    pub tasks: HashMap<TaskId, TaskState>,
}

impl WorkflowState {
    pub fn new(workflow_id: WorkflowId, input: serde_json::Value, correlation_id: Option<CorrelationId>) -> Self {
        let now = Utc::now();
        Self {
            workflow_exec_id: WorkflowExecId::new(),
            workflow_id,
            correlation_id,
            status: Status::Pending,
            input,
            output: None,
            error: None,
            env: HashMap::new(),
            usage: Usage::new(),
            created_at: now,
            updated_at: now,
            tasks: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_exec_id: TaskExecId,
    pub task_id: TaskId,
    pub workflow_exec_id: WorkflowExecId,
    #[serde(default)]
    pub parent_state_id: Option<TaskExecId>,
    pub component: Component,
    pub execution_type: ExecutionType,
    pub status: Status,
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<StateError>,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<AgentExecId>,
    #[serde(default)]
    pub tool_id: Option<ToolExecId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempt: u32,
}

impl TaskState {
    pub fn new_pending(
        task_id: TaskId,
        workflow_exec_id: WorkflowExecId,
        parent_state_id: Option<TaskExecId>,
        component: Component,
        execution_type: ExecutionType,
        input: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_exec_id: TaskExecId::new(),
            task_id,
            workflow_exec_id,
            parent_state_id,
            component,
            execution_type,
            status: Status::Pending,
            input,
            output: None,
            error: None,
            action_id: None,
            agent_id: None,
            tool_id: None,
            created_at: now,
            updated_at: now,
            attempt: 1,
        }
    }

    /// Invariant 2: on a terminal status, exactly one of `output`/`error` is
    /// set. Non-terminal statuses permit both to be absent.
    pub fn invariant_check(&self) -> bool {
        if !self.status.is_terminal() {
            return true;
        }
        self.output.is_some() ^ self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::Pending),
            Just(Status::Running),
            Just(Status::Waiting),
            Just(Status::Paused),
            Just(Status::Success),
            Just(Status::Failed),
            Just(Status::Canceled),
            Just(Status::TimedOut),
        ]
    }

    proptest! {
        #[test]
        fn terminal_states_satisfy_output_xor_error(
            status in arb_status(),
            has_output in any::<bool>(),
            has_error in any::<bool>(),
        ) {
            let mut state = TaskState::new_pending(
                TaskId::from("t"),
                WorkflowExecId::new(),
                None,
                Component::Task,
                ExecutionType::Basic,
                serde_json::json!({}),
            );
            state.status = status;
            state.output = has_output.then(|| serde_json::json!("out"));
            state.error = has_error.then(|| StateError { kind: "ActivityError".into(), message: "x".into(), details: None });

            if status.is_terminal() {
                prop_assert_eq!(state.invariant_check(), has_output ^ has_error);
            } else {
                prop_assert!(state.invariant_check());
            }
        }
    }
}
