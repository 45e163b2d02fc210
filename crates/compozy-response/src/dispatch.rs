//! One `ResponseHandler` per `ExecutionType`, dispatched the same way as
//! the normalizer: an exhaustive match over `TaskConfig`.
//!
//! Idempotency: every handler computes its `TaskState` purely from its
//! `ResponseInput` — no read-modify-write against any store happens here.
//! The caller (the Execution Driver) owns the `UpsertTaskState` call.

use compozy_core::state::{StateError, TaskState};
use compozy_core::status::Status;
use compozy_core::task_config::{ParallelStrategy, TaskConfig};
use compozy_template::TemplateEngine;
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::ResponseError;
use crate::types::{ActivityOutcome, NextDirective, ResponseInput, ResponseOutcome};

pub trait ResponseHandler {
    fn handle(&self, input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError>;
}

#[instrument(skip_all, fields(task_id = %input.task_id))]
pub fn handle_response(input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    match input.cfg {
        TaskConfig::Basic(_) => handle_basic(input, engine),
        TaskConfig::Router(_) => handle_router(input, engine),
        TaskConfig::Parallel(c) => handle_parallel(input, engine, c.strategy),
        TaskConfig::Collection(_) => handle_collection(input, engine),
        TaskConfig::Composite(_) => handle_composite(input, engine),
        TaskConfig::Aggregate(_) => handle_aggregate(input, engine),
        TaskConfig::Wait(_) | TaskConfig::Signal(_) => handle_wait_signal(input, engine),
    }
}

fn outcome_status(outcome: &ActivityOutcome) -> Status {
    match outcome {
        ActivityOutcome::Success(_) => Status::Success,
        ActivityOutcome::Failed(_) => Status::Failed,
        ActivityOutcome::Canceled => Status::Canceled,
        ActivityOutcome::TimedOut => Status::TimedOut,
    }
}

fn base_state(input: &ResponseInput, status: Status) -> TaskState {
    let mut state = TaskState::new_pending(
        input.task_id.clone(),
        input.workflow_exec_id.clone(),
        input.parent_state_id.clone(),
        input.component,
        input.cfg.execution_type(),
        input.cfg.base().with.clone(),
    );
    state.task_exec_id = input.task_exec_id.clone();
    state.attempt = input.attempt;
    state.status = status;
    state
}

/// Applies the `Outputs` transformation over the raw activity output merged
/// with the rendering context, binding `output` to the raw result.
fn render_outputs(
    outputs: &std::collections::HashMap<String, Value>,
    raw_output: &Value,
    vars: &Value,
    engine: &TemplateEngine,
) -> Result<Value, ResponseError> {
    if outputs.is_empty() {
        return Ok(raw_output.clone());
    }
    let mut merged = vars.as_object().cloned().unwrap_or_default();
    merged.insert("output".to_string(), raw_output.clone());
    let tree = Value::Object(outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    engine.render(&tree, &Value::Object(merged)).map_err(ResponseError::from)
}

fn resolve_next(on_success: &Option<compozy_core::ids::TaskId>, on_error: &Option<compozy_core::ids::TaskId>, status: Status) -> NextDirective {
    let target = if status == Status::Success { on_success } else { on_error };
    match target {
        Some(id) => NextDirective::Next(id.clone()),
        None => NextDirective::Complete,
    }
}

fn handle_basic(input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    let status = outcome_status(&input.outcome);
    let mut state = base_state(&input, status);
    let base = input.cfg.base();

    match &input.outcome {
        ActivityOutcome::Success(raw) => {
            state.output = Some(render_outputs(&base.outputs, raw, &input.vars, engine)?);
        }
        ActivityOutcome::Failed(err) => state.error = Some(StateError::from(err)),
        ActivityOutcome::Canceled | ActivityOutcome::TimedOut => {
            state.error = Some(StateError {
                kind: if matches!(input.outcome, ActivityOutcome::TimedOut) {
                    "TimeoutError".into()
                } else {
                    "CancellationError".into()
                },
                message: "activity did not complete".into(),
                details: None,
            });
        }
    }

    let next = resolve_next(&base.on_success, &base.on_error, status);
    Ok(ResponseOutcome { persisted_state: state, next })
}

fn handle_router(input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    let TaskConfig::Router(router_cfg) = input.cfg else {
        unreachable!("dispatch guarantees cfg matches the handler");
    };

    // `condition` was already resolved to a scalar string by the normalizer.
    let route_taken = router_cfg.routes.get(&router_cfg.condition).cloned();

    let status = match (&input.outcome, &route_taken) {
        (ActivityOutcome::Failed(_), _) | (_, None) => Status::Failed,
        _ => Status::Success,
    };

    let mut state = base_state(&input, status);
    if let Some(next_task) = &route_taken {
        state.output = Some(json!({
            "condition": router_cfg.condition,
            "route_taken": next_task.as_str(),
            "router_type": "conditional",
        }));
    } else {
        state.error = Some(StateError {
            kind: "RouterNoMatchError".into(),
            message: format!("condition {:?} did not match any route", router_cfg.condition),
            details: None,
        });
    }

    let next = match route_taken {
        Some(next_task) if status == Status::Success => NextDirective::Next(next_task),
        _ => NextDirective::Complete,
    };
    let _ = engine; // router never renders further templates beyond normalization
    Ok(ResponseOutcome { persisted_state: state, next })
}

/// `children` holds only the children that have reported a terminal state
/// so far, in arrival order; `total` is how many the container actually
/// dispatched. Every element of `children` is terminal by construction, so
/// "every reported child succeeded" is a different question from "every
/// dispatched child has reported" — `children.len() == total` answers the
/// latter and must gate `WaitAll`/`BestEffort`, which otherwise resolve on
/// the first arrival instead of the last.
fn aggregate_strategy_status(strategy: ParallelStrategy, children: &[TaskState], total: usize) -> Status {
    let all_reported = children.len() == total;
    match strategy {
        ParallelStrategy::WaitAll => {
            if !all_reported {
                Status::Running
            } else if children.iter().all(|c| c.status == Status::Success) {
                Status::Success
            } else {
                Status::Failed
            }
        }
        ParallelStrategy::WaitAny => {
            if children.iter().any(|c| c.status == Status::Success) {
                Status::Success
            } else if all_reported {
                Status::Failed
            } else {
                Status::Running
            }
        }
        ParallelStrategy::Race => {
            // The first arrival is always terminal, so the first element
            // (if any) is the winner regardless of how many are still out.
            match children.first() {
                Some(first) => first.status,
                None => Status::Running,
            }
        }
        ParallelStrategy::BestEffort => {
            if all_reported {
                Status::Success
            } else {
                Status::Running
            }
        }
    }
}

fn handle_parallel(
    input: ResponseInput,
    _engine: &TemplateEngine,
    strategy: ParallelStrategy,
) -> Result<ResponseOutcome, ResponseError> {
    let status = aggregate_strategy_status(strategy, &input.children, input.children_total);
    if status == Status::Running {
        // The caller (`TaskExecutionWorkflow::resolve_tracker`) re-registers
        // the tracker and waits for the next child arrival instead of
        // calling this again until the strategy is actually satisfied.
        let mut state = base_state(&input, Status::Running);
        state.output = None;
        return Ok(ResponseOutcome {
            persisted_state: state,
            next: NextDirective::PendingChildren,
        });
    }

    let mut state = base_state(&input, status);
    let outputs: Vec<Value> = input.children.iter().map(|c| c.output.clone().unwrap_or(Value::Null)).collect();
    if status == Status::Success {
        state.output = Some(Value::Array(outputs));
    } else {
        state.error = Some(StateError {
            kind: "ActivityError".into(),
            message: "one or more parallel children failed".into(),
            details: Some(Value::Array(outputs)),
        });
    }

    let base = input.cfg.base();
    let next = resolve_next(&base.on_success, &base.on_error, status);
    Ok(ResponseOutcome { persisted_state: state, next })
}

fn handle_collection(input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    let TaskConfig::Collection(_) = input.cfg else {
        unreachable!("dispatch guarantees cfg matches the handler");
    };
    // Collection shares parallel's strategy rules but always runs `wait_all`
    // semantics over the filtered/materialized set (parallel/sequential mode
    // only affects dispatch order, not aggregation).
    handle_parallel(input, engine, ParallelStrategy::WaitAll)
}

fn handle_composite(input: ResponseInput, _engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    let TaskConfig::Composite(_) = input.cfg else {
        unreachable!("dispatch guarantees cfg matches the handler");
    };

    if input.children.len() < input.children_total {
        let mut state = base_state(&input, Status::Running);
        state.output = None;
        return Ok(ResponseOutcome {
            persisted_state: state,
            next: NextDirective::PendingChildren,
        });
    }

    let all_succeeded = input.children.iter().all(|c| c.status == Status::Success);
    let status = if all_succeeded { Status::Success } else { Status::Failed };

    let mut state = base_state(&input, status);
    let outputs: Vec<Value> = input.children.iter().map(|c| c.output.clone().unwrap_or(Value::Null)).collect();
    if all_succeeded {
        state.output = Some(Value::Array(outputs));
    } else {
        let failing = input.children.iter().find(|c| c.status != Status::Success);
        state.error = Some(
            failing
                .and_then(|c| c.error.clone())
                .unwrap_or(StateError {
                    kind: "ActivityError".into(),
                    message: "composite sequence did not complete".into(),
                    details: None,
                }),
        );
    }

    let base = input.cfg.base();
    let next = resolve_next(&base.on_success, &base.on_error, status);
    Ok(ResponseOutcome { persisted_state: state, next })
}

fn handle_aggregate(input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    let TaskConfig::Aggregate(aggregate_cfg) = input.cfg else {
        unreachable!("dispatch guarantees cfg matches the handler");
    };

    let tree = Value::Object(aggregate_cfg.outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    let rendered = engine.render(&tree, &input.vars)?;

    let mut state = base_state(&input, Status::Success);
    state.output = Some(rendered);

    let base = input.cfg.base();
    let next = resolve_next(&base.on_success, &base.on_error, Status::Success);
    Ok(ResponseOutcome { persisted_state: state, next })
}

fn handle_wait_signal(input: ResponseInput, engine: &TemplateEngine) -> Result<ResponseOutcome, ResponseError> {
    let base = input.cfg.base();
    match &input.outcome {
        ActivityOutcome::Success(payload) => {
            let mut state = base_state(&input, Status::Success);
            state.output = Some(payload.clone());
            let next = resolve_next(&base.on_success, &base.on_error, Status::Success);
            let _ = engine;
            Ok(ResponseOutcome { persisted_state: state, next })
        }
        ActivityOutcome::TimedOut => {
            let mut state = base_state(&input, Status::TimedOut);
            state.error = Some(StateError {
                kind: "TimeoutError".into(),
                message: "wait task exceeded its deadline".into(),
                details: None,
            });
            Ok(ResponseOutcome {
                persisted_state: state,
                next: resolve_next(&base.on_success, &base.on_error, Status::TimedOut),
            })
        }
        ActivityOutcome::Canceled => {
            let mut state = base_state(&input, Status::Canceled);
            state.error = Some(StateError {
                kind: "CancellationError".into(),
                message: "wait task was canceled".into(),
                details: None,
            });
            Ok(ResponseOutcome {
                persisted_state: state,
                next: NextDirective::Complete,
            })
        }
        ActivityOutcome::Failed(err) => {
            let mut state = base_state(&input, Status::Failed);
            state.error = Some(StateError::from(err));
            Ok(ResponseOutcome {
                persisted_state: state,
                next: resolve_next(&base.on_success, &base.on_error, Status::Failed),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compozy_core::ids::{TaskExecId, TaskId, WorkflowExecId};
    use compozy_core::task_config::{BaseConfig, BasicConfig, Component, RouterConfig};
    use std::collections::HashMap;

    fn engine() -> TemplateEngine {
        TemplateEngine::default()
    }

    #[test]
    fn basic_success_applies_outputs_transformation() {
        let cfg = TaskConfig::Basic(BasicConfig {
            base: BaseConfig {
                id: TaskId::from("echo"),
                outputs: HashMap::from([("echo".to_string(), json!("{{ output.message }}"))]),
                ..Default::default()
            },
            action: "echo".into(),
        });
        let input = ResponseInput {
            task_exec_id: TaskExecId::new(),
            task_id: TaskId::from("echo"),
            workflow_exec_id: WorkflowExecId::new(),
            parent_state_id: None,
            component: Component::Tool,
            cfg: &cfg,
            outcome: ActivityOutcome::Success(json!({"message": "Hello"})),
            vars: json!({}),
            attempt: 1,
            children: vec![],
            children_total: 0,
        };
        let outcome = handle_response(input, &engine()).unwrap();
        assert_eq!(outcome.persisted_state.status, Status::Success);
        assert_eq!(outcome.persisted_state.output.unwrap()["echo"], json!("Hello"));
    }

    #[test]
    fn replaying_the_same_input_yields_identical_state() {
        let cfg = TaskConfig::Basic(BasicConfig {
            base: BaseConfig { id: TaskId::from("t"), ..Default::default() },
            action: "noop".into(),
        });
        let make_input = || ResponseInput {
            task_exec_id: TaskExecId::from("fixed-exec-id"),
            task_id: TaskId::from("t"),
            workflow_exec_id: WorkflowExecId::from("fixed-wf-id"),
            parent_state_id: None,
            component: Component::Task,
            cfg: &cfg,
            outcome: ActivityOutcome::Success(json!({"x": 1})),
            vars: json!({}),
            attempt: 1,
            children: vec![],
            children_total: 0,
        };
        let first = handle_response(make_input(), &engine()).unwrap();
        let second = handle_response(make_input(), &engine()).unwrap();
        assert_eq!(
            serde_json::to_value(&first.persisted_state).unwrap(),
            serde_json::to_value(&second.persisted_state).unwrap()
        );
    }

    #[test]
    fn router_missing_route_fails_the_task() {
        let cfg = TaskConfig::Router(RouterConfig {
            base: BaseConfig { id: TaskId::from("route"), ..Default::default() },
            condition: "super_admin".into(),
            routes: HashMap::from([
                ("admin".to_string(), TaskId::from("admin-task")),
                ("user".to_string(), TaskId::from("user-task")),
            ]),
        });
        let input = ResponseInput {
            task_exec_id: TaskExecId::new(),
            task_id: TaskId::from("route"),
            workflow_exec_id: WorkflowExecId::new(),
            parent_state_id: None,
            component: Component::Task,
            cfg: &cfg,
            outcome: ActivityOutcome::Success(Value::Null),
            vars: json!({}),
            attempt: 1,
            children: vec![],
            children_total: 0,
        };
        let outcome = handle_response(input, &engine()).unwrap();
        assert_eq!(outcome.persisted_state.status, Status::Failed);
        assert_eq!(outcome.persisted_state.error.unwrap().kind, "RouterNoMatchError");
    }

    #[test]
    fn parallel_wait_all_succeeds_only_if_every_child_succeeded() {
        let cfg = TaskConfig::Parallel(compozy_core::task_config::ParallelConfig {
            base: BaseConfig { id: TaskId::from("par"), ..Default::default() },
            tasks: vec![],
            strategy: ParallelStrategy::WaitAll,
            max_concurrency: None,
        });
        let mut child_ok = TaskState::new_pending(
            TaskId::from("a"), WorkflowExecId::new(), None, Component::Task, compozy_core::task_config::ExecutionType::Basic, json!({}),
        );
        child_ok.status = Status::Success;
        child_ok.output = Some(json!(1));

        let mut child_fail = child_ok.clone();
        child_fail.status = Status::Failed;
        child_fail.output = None;
        child_fail.error = Some(StateError { kind: "ActivityError".into(), message: "x".into(), details: None });

        let input = ResponseInput {
            task_exec_id: TaskExecId::new(),
            task_id: TaskId::from("par"),
            workflow_exec_id: WorkflowExecId::new(),
            parent_state_id: None,
            component: Component::Task,
            cfg: &cfg,
            outcome: ActivityOutcome::Success(Value::Null),
            vars: json!({}),
            attempt: 1,
            children: vec![child_ok.clone(), child_ok.clone()],
            children_total: 2,
        };
        let outcome = handle_response(input, &engine()).unwrap();
        assert_eq!(outcome.persisted_state.status, Status::Success);

        let input_with_failure = ResponseInput {
            task_exec_id: TaskExecId::new(),
            task_id: TaskId::from("par"),
            workflow_exec_id: WorkflowExecId::new(),
            parent_state_id: None,
            component: Component::Task,
            cfg: &cfg,
            outcome: ActivityOutcome::Success(Value::Null),
            vars: json!({}),
            attempt: 1,
            children: vec![child_ok, child_fail],
            children_total: 2,
        };
        let outcome = handle_response(input_with_failure, &engine()).unwrap();
        assert_eq!(outcome.persisted_state.status, Status::Failed);
    }
}
