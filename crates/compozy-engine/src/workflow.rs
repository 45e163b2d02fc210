//! `TaskExecutionWorkflow`: the durable workflow body that drives
//! normalization, activity dispatch, and response handling over a task
//! graph (spec §4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use compozy_context::ContextBuilder;
use compozy_core::error::{CompozyError, ErrorDetails};
use compozy_core::ids::{TaskExecId, WorkflowExecId};
use compozy_core::state::{TaskState, WorkflowState};
use compozy_core::status::Status;
use compozy_core::task_config::{Component, TaskConfig};
use compozy_durable::{ActivityError, ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowSignal};
use compozy_normalizer::{evaluate_collection, normalize_task, NormalizationContext};
use compozy_response::{handle_response, ActivityOutcome, NextDirective, ResponseInput};
use compozy_template::{Clock, FixedClock, TemplateEngine};
use serde_json::Value;

use crate::definition::{WorkflowDefinition, WorkflowTrigger};
use crate::error::EngineError;

const MAX_COLLECTION_ITEMS: usize = 10_000;
const CANCEL_GRACE: Duration = Duration::from_secs(30);
const PERSIST_PREFIX: &str = "persist-";
const WAIT_TIMER_PREFIX: &str = "wait-timeout-";
const CANCEL_TIMER: &str = "cancel-grace";

/// An in-flight leaf dispatch (basic/router/wait-resolved/aggregate) waiting
/// on its `"dispatch_task"` activity to complete.
struct PendingActivity {
    cfg: TaskConfig,
    parent_state_id: Option<TaskExecId>,
    component: Component,
    attempt: u32,
}

/// Tracks a `parallel`/`collection`/`composite` parent's children as they
/// resolve. Re-evaluated via `compozy_response::handle_response` after every
/// arrival so strategies like `wait_any`/`race` can resolve early.
struct ChildTracker {
    parent_cfg: TaskConfig,
    parent_state_id: Option<TaskExecId>,
    collected: Vec<TaskState>,
    total: usize,
}

/// A suspended `wait`/`signal` task, resolved either by a matching signal or
/// by its durable timeout timer.
struct WaitEntry {
    signal_name: String,
    cfg: TaskConfig,
    parent_state_id: Option<TaskExecId>,
    attempt: u32,
}

pub struct TaskExecutionWorkflow {
    definition: WorkflowDefinition,
    workflow_state: WorkflowState,
    engine: TemplateEngine,
    pending: HashMap<TaskExecId, PendingActivity>,
    composite_children: HashMap<TaskExecId, ChildTracker>,
    waiting: HashMap<TaskExecId, WaitEntry>,
    paused: bool,
    deferred: Vec<TaskConfig>,
    canceling: bool,
    completed: bool,
    canceled: bool,
    output: Option<Value>,
    error_message: Option<String>,
}

impl TaskExecutionWorkflow {
    fn build_engine(triggered_at: chrono::DateTime<chrono::Utc>) -> TemplateEngine {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(triggered_at));
        TemplateEngine::new(clock)
    }

    fn ctx_vars(&self) -> Value {
        ContextBuilder::new().build(&self.workflow_state)
    }

    /// The workflow's own view of task progress, exposed so a caller (the
    /// worker binary, or a test) can observe `Status::Paused`/`Running` and
    /// individual task outputs without waiting for workflow completion.
    pub fn workflow_state(&self) -> &WorkflowState {
        &self.workflow_state
    }

    fn component_of(cfg: &TaskConfig) -> Component {
        let base = cfg.base();
        if base.agent_id.is_some() {
            Component::Agent
        } else if base.tool_id.is_some() {
            Component::Tool
        } else {
            Component::Task
        }
    }

    fn activity_options(cfg: &TaskConfig) -> ActivityOptions {
        let base = cfg.base();
        let mut opts = ActivityOptions::default();
        if let Some(ms) = base.timeout_ms {
            opts.start_to_close_timeout = Duration::from_millis(ms);
        }
        if let Some(retry) = &base.retry {
            opts.retry_policy = compozy_durable::RetryPolicy {
                max_attempts: retry.max_attempts,
                initial_interval: Duration::from_millis(retry.initial_delay_ms),
                max_interval: Duration::from_millis(retry.max_delay_ms),
                backoff_coefficient: retry.backoff_factor,
                jitter: 0.1,
                non_retryable_errors: vec![],
            };
        }
        opts
    }

    /// Normalizes and schedules `cfg`. Recurses into `parallel`/`collection`/
    /// `composite` children; leaves get a `"dispatch_task"` activity.
    fn schedule_task(
        &mut self,
        cfg: TaskConfig,
        parent_state_id: Option<TaskExecId>,
    ) -> Result<Vec<WorkflowAction>, EngineError> {
        if self.paused {
            self.deferred.push(cfg);
            return Ok(vec![]);
        }

        let vars = self.ctx_vars();
        let ctx = NormalizationContext::new(vars.clone(), &self.engine, MAX_COLLECTION_ITEMS);
        let normalized = normalize_task(cfg, &ctx)?;

        match &normalized {
            TaskConfig::Wait(wait_cfg) | TaskConfig::Signal(wait_cfg) => {
                let task_exec_id = TaskExecId::new();
                let signal_name = wait_cfg.signal_name.clone();
                let timeout_ms = wait_cfg.timeout_ms;
                self.waiting.insert(
                    task_exec_id.clone(),
                    WaitEntry {
                        signal_name,
                        cfg: normalized,
                        parent_state_id,
                        attempt: 1,
                    },
                );
                Ok(vec![WorkflowAction::timer(
                    format!("{WAIT_TIMER_PREFIX}{task_exec_id}"),
                    Duration::from_millis(timeout_ms),
                )])
            }
            TaskConfig::Parallel(_) | TaskConfig::Collection(_) | TaskConfig::Composite(_) => {
                self.schedule_container(normalized, parent_state_id)
            }
            _ => self.schedule_leaf(normalized, parent_state_id, 1),
        }
    }

    fn schedule_leaf(
        &mut self,
        cfg: TaskConfig,
        parent_state_id: Option<TaskExecId>,
        attempt: u32,
    ) -> Result<Vec<WorkflowAction>, EngineError> {
        let task_exec_id = TaskExecId::new();
        let component = Self::component_of(&cfg);
        let vars = self.ctx_vars();
        let options = Self::activity_options(&cfg);
        let input = serde_json::json!({ "cfg": cfg, "vars": vars });
        self.pending.insert(
            task_exec_id.clone(),
            PendingActivity {
                cfg,
                parent_state_id,
                component,
                attempt,
            },
        );
        Ok(vec![WorkflowAction::ScheduleActivity {
            activity_id: task_exec_id.to_string(),
            activity_type: "dispatch_task".into(),
            input,
            options,
        }])
    }

    fn children_of(&self, cfg: &TaskConfig, vars: &Value) -> Result<Vec<TaskConfig>, EngineError> {
        match cfg {
            TaskConfig::Parallel(c) => Ok(c.tasks.clone()),
            TaskConfig::Composite(c) => Ok(c.tasks.clone()),
            TaskConfig::Collection(c) => {
                let ctx = NormalizationContext::new(vars.clone(), &self.engine, MAX_COLLECTION_ITEMS);
                let evaluation = evaluate_collection(c, &ctx)?;
                Ok(evaluation.materialized)
            }
            _ => Ok(vec![]),
        }
    }

    fn schedule_container(
        &mut self,
        cfg: TaskConfig,
        parent_state_id: Option<TaskExecId>,
    ) -> Result<Vec<WorkflowAction>, EngineError> {
        let vars = self.ctx_vars();
        let children = self.children_of(&cfg, &vars)?;
        let container_exec_id = TaskExecId::new();
        let total = children.len();

        if children.is_empty() {
            return self.resolve_tracker(
                container_exec_id,
                ChildTracker {
                    parent_cfg: cfg,
                    parent_state_id,
                    collected: vec![],
                    total,
                },
            );
        }

        self.composite_children.insert(
            container_exec_id.clone(),
            ChildTracker {
                parent_cfg: cfg,
                parent_state_id,
                collected: Vec::with_capacity(total),
                total,
            },
        );

        let mut actions = Vec::new();
        for child in children {
            actions.extend(self.schedule_task(child, Some(container_exec_id.clone()))?);
        }
        Ok(actions)
    }

    /// Evaluates a tracker's aggregate status given its currently collected
    /// children. On `PendingChildren` the tracker is put back into
    /// `composite_children` under `container_exec_id` to wait for the next
    /// arrival; on a terminal directive it resolves and bubbles up one level
    /// via `apply_outcome`.
    fn resolve_tracker(
        &mut self,
        container_exec_id: TaskExecId,
        tracker: ChildTracker,
    ) -> Result<Vec<WorkflowAction>, EngineError> {
        let vars = self.ctx_vars();
        let task_exec_id = TaskExecId::new();
        let input = ResponseInput {
            task_exec_id: task_exec_id.clone(),
            task_id: tracker.parent_cfg.id().clone(),
            workflow_exec_id: self.workflow_state.workflow_exec_id.clone(),
            parent_state_id: tracker.parent_state_id.clone(),
            component: Self::component_of(&tracker.parent_cfg),
            cfg: &tracker.parent_cfg,
            outcome: ActivityOutcome::Success(Value::Null),
            vars,
            attempt: 1,
            children: tracker.collected.clone(),
            children_total: tracker.total,
        };
        let outcome = handle_response(input, &self.engine)?;

        if matches!(outcome.next, NextDirective::PendingChildren) {
            self.composite_children.insert(container_exec_id, tracker);
            return Ok(vec![]);
        }

        self.apply_outcome(outcome.persisted_state, outcome.next, tracker.parent_state_id)
    }

    /// Records `state` as terminal, schedules its durable persist activity,
    /// and either bubbles it into a parent tracker or advances the top-level
    /// chain / finalizes the workflow.
    fn apply_outcome(
        &mut self,
        state: TaskState,
        next: NextDirective,
        parent_state_id: Option<TaskExecId>,
    ) -> Result<Vec<WorkflowAction>, EngineError> {
        let persist_action = WorkflowAction::ScheduleActivity {
            activity_id: format!("{PERSIST_PREFIX}{}", state.task_exec_id),
            activity_type: "persist_task_state".into(),
            input: serde_json::to_value(&state).unwrap_or(Value::Null),
            options: ActivityOptions::default(),
        };
        self.workflow_state.tasks.insert(state.task_id.clone(), state.clone());
        let mut actions = vec![persist_action];

        if let Some(parent_exec_id) = parent_state_id {
            if let Some(mut tracker) = self.composite_children.remove(&parent_exec_id) {
                tracker.collected.push(state);
                actions.extend(self.resolve_tracker(parent_exec_id, tracker)?);
            }
            return Ok(actions);
        }

        match next {
            NextDirective::Next(task_id) => {
                let cfg = self
                    .definition
                    .find_task(&task_id)
                    .cloned()
                    .ok_or_else(|| EngineError::TaskNotFound(task_id))?;
                actions.extend(self.schedule_task(cfg, None)?);
            }
            NextDirective::Complete => {
                self.completed = true;
                if state.status == Status::Success {
                    self.output = state.output.clone();
                } else {
                    self.error_message = state.error.as_ref().map(|e| e.message.clone());
                }
            }
            NextDirective::WaitForSignal { .. } | NextDirective::PendingChildren => {
                // handled before reaching here (wait tasks never call
                // apply_outcome with this directive; tracked children do).
            }
        }
        Ok(actions)
    }

    fn finalize_canceled(&mut self) {
        self.completed = true;
        self.canceled = true;
        self.pending.clear();
        self.composite_children.clear();
        self.waiting.clear();
    }
}

impl Workflow for TaskExecutionWorkflow {
    const TYPE: &'static str = "task_execution_workflow";
    type Input = WorkflowTrigger;
    type Output = Value;

    fn new(input: Self::Input) -> Self {
        let WorkflowTrigger {
            workflow_id,
            definition,
            input: trigger_input,
            correlation_id,
            triggered_at,
        } = input;

        let workflow_state = WorkflowState {
            workflow_exec_id: WorkflowExecId::new(),
            workflow_id,
            correlation_id,
            status: Status::Running,
            input: trigger_input,
            output: None,
            error: None,
            env: definition.env.clone(),
            usage: compozy_core::usage::Usage::new(),
            created_at: triggered_at,
            updated_at: triggered_at,
            tasks: HashMap::new(),
        };

        Self {
            definition,
            engine: Self::build_engine(triggered_at),
            workflow_state,
            pending: HashMap::new(),
            composite_children: HashMap::new(),
            waiting: HashMap::new(),
            paused: false,
            deferred: Vec::new(),
            canceling: false,
            completed: false,
            canceled: false,
            output: None,
            error_message: None,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        let Some(entry) = self.definition.entry_task().cloned() else {
            self.completed = true;
            self.output = Some(Value::Null);
            return vec![];
        };
        self.schedule_task(entry, None).unwrap_or_else(|err| {
            self.completed = true;
            self.error_message = Some(err.to_string());
            vec![]
        })
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        if self.completed {
            return vec![];
        }
        if let Some(task_exec_id) = activity_id.strip_prefix(PERSIST_PREFIX) {
            let _ = task_exec_id;
            return vec![];
        }

        let Ok(task_exec_id) = activity_id.parse::<TaskExecId>() else {
            return vec![];
        };
        let Some(pending) = self.pending.remove(&task_exec_id) else {
            return vec![];
        };

        let run = || -> Result<Vec<WorkflowAction>, EngineError> {
            let vars = self.ctx_vars();
            let input = ResponseInput {
                task_exec_id: task_exec_id.clone(),
                task_id: pending.cfg.id().clone(),
                workflow_exec_id: self.workflow_state.workflow_exec_id.clone(),
                parent_state_id: pending.parent_state_id.clone(),
                component: pending.component,
                cfg: &pending.cfg,
                outcome: ActivityOutcome::Success(result),
                vars,
                attempt: pending.attempt,
                children: vec![],
                children_total: 0,
            };
            let outcome = handle_response(input, &self.engine)?;
            self.apply_outcome(outcome.persisted_state, outcome.next, pending.parent_state_id.clone())
        };
        run().unwrap_or_else(|err| {
            self.completed = true;
            self.error_message = Some(err.to_string());
            vec![]
        })
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        if self.completed {
            return vec![];
        }
        if activity_id.starts_with(PERSIST_PREFIX) {
            return vec![];
        }
        let Ok(task_exec_id) = activity_id.parse::<TaskExecId>() else {
            return vec![];
        };
        let Some(pending) = self.pending.remove(&task_exec_id) else {
            return vec![];
        };

        // Retries up to `base.retry.max_attempts` already happened inside the
        // durable engine's own worker pool via `ActivityOptions.retry_policy`;
        // reaching here means they are exhausted.
        let mut run = || -> Result<Vec<WorkflowAction>, EngineError> {
            let vars = self.ctx_vars();
            let compozy_err = CompozyError::Activity(ErrorDetails {
                message: error.message.clone(),
                details: error.details.clone(),
            });
            let input = ResponseInput {
                task_exec_id: task_exec_id.clone(),
                task_id: pending.cfg.id().clone(),
                workflow_exec_id: self.workflow_state.workflow_exec_id.clone(),
                parent_state_id: pending.parent_state_id.clone(),
                component: pending.component,
                cfg: &pending.cfg,
                outcome: ActivityOutcome::Failed(compozy_err),
                vars,
                attempt: pending.attempt,
                children: vec![],
                children_total: 0,
            };
            let outcome = handle_response(input, &self.engine)?;
            self.apply_outcome(outcome.persisted_state, outcome.next, pending.parent_state_id.clone())
        };
        run().unwrap_or_else(|err| {
            self.completed = true;
            self.error_message = Some(err.to_string());
            vec![]
        })
    }

    fn on_timer_fired(&mut self, timer_id: &str) -> Vec<WorkflowAction> {
        if self.completed {
            return vec![];
        }
        if timer_id == CANCEL_TIMER {
            self.finalize_canceled();
            return vec![];
        }
        let Some(suffix) = timer_id.strip_prefix(WAIT_TIMER_PREFIX) else {
            return vec![];
        };
        let Ok(task_exec_id) = suffix.parse::<TaskExecId>() else {
            return vec![];
        };
        let Some(entry) = self.waiting.remove(&task_exec_id) else {
            return vec![];
        };

        let mut run = || -> Result<Vec<WorkflowAction>, EngineError> {
            let vars = self.ctx_vars();
            let input = ResponseInput {
                task_exec_id: task_exec_id.clone(),
                task_id: entry.cfg.id().clone(),
                workflow_exec_id: self.workflow_state.workflow_exec_id.clone(),
                parent_state_id: entry.parent_state_id.clone(),
                component: Self::component_of(&entry.cfg),
                cfg: &entry.cfg,
                outcome: ActivityOutcome::TimedOut,
                vars,
                attempt: entry.attempt,
                children: vec![],
                children_total: 0,
            };
            let outcome = handle_response(input, &self.engine)?;
            self.apply_outcome(outcome.persisted_state, outcome.next, entry.parent_state_id.clone())
        };
        run().unwrap_or_else(|err| {
            self.completed = true;
            self.error_message = Some(err.to_string());
            vec![]
        })
    }

    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction> {
        if self.completed {
            return vec![];
        }

        if signal.is_cancel() {
            self.canceling = true;
            let mut actions: Vec<WorkflowAction> = self
                .pending
                .keys()
                .map(|id| WorkflowAction::CancelActivity {
                    activity_id: id.to_string(),
                })
                .collect();

            let waiting: Vec<_> = self.waiting.drain().collect();
            for (task_exec_id, entry) in waiting {
                let vars = self.ctx_vars();
                let input = ResponseInput {
                    task_exec_id: task_exec_id.clone(),
                    task_id: entry.cfg.id().clone(),
                    workflow_exec_id: self.workflow_state.workflow_exec_id.clone(),
                    parent_state_id: entry.parent_state_id.clone(),
                    component: Self::component_of(&entry.cfg),
                    cfg: &entry.cfg,
                    outcome: ActivityOutcome::Canceled,
                    vars,
                    attempt: entry.attempt,
                    children: vec![],
                    children_total: 0,
                };
                if let Ok(outcome) = handle_response(input, &self.engine) {
                    if let Ok(more) = self.apply_outcome(outcome.persisted_state, outcome.next, entry.parent_state_id)
                    {
                        actions.extend(more);
                    }
                }
            }

            if self.pending.is_empty() {
                self.finalize_canceled();
            } else {
                actions.push(WorkflowAction::timer(CANCEL_TIMER, CANCEL_GRACE));
            }
            return actions;
        }

        if signal.signal_type == compozy_durable::workflow::signal_types::SHUTDOWN {
            self.paused = true;
            return vec![];
        }

        if signal.signal_type == "pause" {
            self.paused = true;
            self.workflow_state.status = Status::Paused;
            return vec![];
        }

        if signal.signal_type == "resume" {
            self.paused = false;
            self.workflow_state.status = Status::Running;
            let deferred = std::mem::take(&mut self.deferred);
            let mut actions = Vec::new();
            for cfg in deferred {
                actions.extend(self.schedule_task(cfg, None).unwrap_or_default());
            }
            return actions;
        }

        // User-defined signal: resolve the matching `wait`/`signal` task, if any.
        let Some((task_exec_id, _)) = self
            .waiting
            .iter()
            .find(|(_, entry)| entry.signal_name == signal.signal_type)
            .map(|(id, _)| (id.clone(), ()))
        else {
            return vec![];
        };
        let Some(entry) = self.waiting.remove(&task_exec_id) else {
            return vec![];
        };

        let mut run = || -> Result<Vec<WorkflowAction>, EngineError> {
            let vars = self.ctx_vars();
            let input = ResponseInput {
                task_exec_id: task_exec_id.clone(),
                task_id: entry.cfg.id().clone(),
                workflow_exec_id: self.workflow_state.workflow_exec_id.clone(),
                parent_state_id: entry.parent_state_id.clone(),
                component: Self::component_of(&entry.cfg),
                cfg: &entry.cfg,
                outcome: ActivityOutcome::Success(signal.payload.clone()),
                vars,
                attempt: entry.attempt,
                children: vec![],
                children_total: 0,
            };
            let outcome = handle_response(input, &self.engine)?;
            self.apply_outcome(outcome.persisted_state, outcome.next, entry.parent_state_id.clone())
        };
        run().unwrap_or_else(|err| {
            self.completed = true;
            self.error_message = Some(err.to_string());
            vec![]
        })
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn result(&self) -> Option<Self::Output> {
        if self.completed && self.error_message.is_none() && !self.canceled {
            Some(self.output.clone().unwrap_or(Value::Null))
        } else {
            None
        }
    }

    fn error(&self) -> Option<WorkflowError> {
        if self.canceled {
            Some(WorkflowError::new("workflow canceled").with_code("CANCELED"))
        } else {
            self.error_message.as_ref().map(WorkflowError::new)
        }
    }
}
