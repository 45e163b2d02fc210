//! Assembles the variable namespace the Template Engine renders against.
//!
//! The result is a plain `serde_json::Value` snapshot captured once per
//! normalization/response-handling site. It is never recomputed mid-flight:
//! later child completions must not retroactively affect an already-rendered
//! template.

use compozy_core::state::{TaskState, WorkflowState};
use compozy_core::status::Status;
use compozy_core::ids::TaskId;
use serde_json::{json, Map, Value};

/// Present only inside a collection iteration.
pub struct ItemBinding<'a> {
    pub item_var: &'a str,
    pub index_var: &'a str,
    pub item: Value,
    pub index: usize,
}

/// The immediate parent task, when the task being evaluated has one.
pub struct ParentBinding<'a> {
    pub id: &'a TaskId,
    pub input: Value,
    pub output: Option<Value>,
}

#[derive(Default)]
pub struct ContextBuilder<'a> {
    item: Option<ItemBinding<'a>>,
    /// Present only in `Outputs` transformations: the task's just-produced
    /// raw output, before the transformation runs.
    output: Option<Value>,
    parent: Option<ParentBinding<'a>>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: ItemBinding<'a>) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_parent(mut self, parent: ParentBinding<'a>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Builds `{workflow, tasks, env, item, index, output, parent}` from a
    /// `WorkflowState` snapshot. Only terminal tasks are exposed under
    /// `tasks` — siblings that have not yet terminated are simply absent,
    /// never present-with-a-null-output.
    pub fn build(self, workflow: &WorkflowState) -> Value {
        let mut root = Map::new();

        root.insert(
            "workflow".to_string(),
            json!({
                "id": workflow.workflow_id.as_str(),
                "input": workflow.input,
                "env": workflow.env,
                "status": workflow.status.to_string(),
            }),
        );

        let mut tasks = Map::new();
        for (task_id, state) in &workflow.tasks {
            if !matches!(
                state.status,
                Status::Success | Status::Failed | Status::Canceled | Status::TimedOut
            ) {
                continue;
            }
            tasks.insert(task_id.to_string(), task_namespace(state));
        }
        root.insert("tasks".to_string(), Value::Object(tasks));

        root.insert(
            "env".to_string(),
            serde_json::to_value(&workflow.env).unwrap_or(Value::Null),
        );

        if let Some(item) = &self.item {
            root.insert(item.item_var.to_string(), item.item.clone());
            root.insert(item.index_var.to_string(), json!(item.index));
        }

        if let Some(output) = self.output {
            root.insert("output".to_string(), output);
        }

        if let Some(parent) = self.parent {
            root.insert(
                "parent".to_string(),
                json!({
                    "id": parent.id.as_str(),
                    "input": parent.input,
                    "output": parent.output,
                }),
            );
        }

        Value::Object(root)
    }
}

fn task_namespace(state: &TaskState) -> Value {
    json!({
        "input": state.input,
        "output": state.output,
        "status": state.status.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compozy_core::ids::{WorkflowExecId, WorkflowId};
    use compozy_core::task_config::{Component, ExecutionType};

    fn workflow_with_task(task_id: &str, status: Status, output: Option<Value>) -> WorkflowState {
        let mut wf = WorkflowState::new(WorkflowId::from("wf"), json!({"message": "Hello"}), None);
        let mut task = TaskState::new_pending(
            TaskId::from(task_id),
            wf.workflow_exec_id.clone(),
            None,
            Component::Task,
            ExecutionType::Basic,
            json!({}),
        );
        task.status = status;
        task.output = output;
        wf.tasks.insert(TaskId::from(task_id), task);
        wf
    }

    #[test]
    fn non_terminal_siblings_are_absent_from_tasks_namespace() {
        let wf = workflow_with_task("step-1", Status::Running, None);
        let ctx = ContextBuilder::new().build(&wf);
        assert!(ctx["tasks"].get("step-1").is_none());
    }

    #[test]
    fn terminal_siblings_expose_input_output_status() {
        let wf = workflow_with_task("step-1", Status::Success, Some(json!({"x": 1})));
        let ctx = ContextBuilder::new().build(&wf);
        assert_eq!(ctx["tasks"]["step-1"]["status"], json!("success"));
        assert_eq!(ctx["tasks"]["step-1"]["output"], json!({"x": 1}));
    }

    #[test]
    fn item_and_index_are_present_only_when_bound() {
        let wf = workflow_with_task("step-1", Status::Success, None);
        let without_item = ContextBuilder::new().build(&wf);
        assert!(without_item.get("item").is_none());

        let with_item = ContextBuilder::new()
            .with_item(ItemBinding {
                item_var: "item",
                index_var: "index",
                item: json!({"active": true}),
                index: 2,
            })
            .build(&wf);
        assert_eq!(with_item["item"], json!({"active": true}));
        assert_eq!(with_item["index"], json!(2));
    }

    #[test]
    fn workflow_namespace_reflects_input_and_status() {
        let wf = workflow_with_task("step-1", Status::Success, None);
        let ctx = ContextBuilder::new().build(&wf);
        assert_eq!(ctx["workflow"]["input"]["message"], json!("Hello"));
        assert_eq!(ctx["workflow"]["status"], json!("pending"));
    }
}
