//! The static workflow shape a trigger carries into `TaskExecutionWorkflow`.

use chrono::{DateTime, Utc};
use compozy_core::ids::{CorrelationId, TaskId, WorkflowId};
use compozy_core::task_config::TaskConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A flat ordered list of top-level tasks. `OnSuccess`/`OnError` on each
/// `BaseConfig` carry the actual transition graph; this list only fixes the
/// entry point (its first element) and gives every task a home to be found
/// from by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: WorkflowId,
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl WorkflowDefinition {
    pub fn entry_task(&self) -> Option<&TaskConfig> {
        self.tasks.first()
    }

    /// Recursively looks up a task by id through `parallel`/`collection`/
    /// `composite` nesting. `collection`'s per-item materializations are not
    /// part of the static definition and are never found here.
    pub fn find_task(&self, id: &TaskId) -> Option<&TaskConfig> {
        self.tasks.iter().find_map(|t| find_in(t, id))
    }
}

fn find_in<'a>(cfg: &'a TaskConfig, id: &TaskId) -> Option<&'a TaskConfig> {
    if cfg.id() == id {
        return Some(cfg);
    }
    match cfg {
        TaskConfig::Parallel(c) => c.tasks.iter().find_map(|t| find_in(t, id)),
        TaskConfig::Composite(c) => c.tasks.iter().find_map(|t| find_in(t, id)),
        TaskConfig::Collection(c) => find_in(&c.task, id),
        _ => None,
    }
}

/// `Workflow::Input` for `TaskExecutionWorkflow`.
///
/// `triggered_at` is captured once by the caller at trigger time and carried
/// through every replay, since `Workflow::new` runs on both the original
/// start and every replay and must never read the wall clock itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub workflow_id: WorkflowId,
    pub definition: WorkflowDefinition,
    pub input: serde_json::Value,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    pub triggered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use compozy_core::task_config::{BaseConfig, BasicConfig, CompositeConfig, ParallelConfig, ParallelStrategy};

    fn basic(id: &str) -> TaskConfig {
        TaskConfig::Basic(BasicConfig {
            base: BaseConfig {
                id: TaskId::from(id),
                ..Default::default()
            },
            action: "noop".into(),
        })
    }

    #[test]
    fn find_task_descends_into_parallel_children() {
        let def = WorkflowDefinition {
            workflow_id: WorkflowId::from("wf"),
            tasks: vec![TaskConfig::Parallel(ParallelConfig {
                base: BaseConfig {
                    id: TaskId::from("fan-out"),
                    ..Default::default()
                },
                tasks: vec![basic("child-a"), basic("child-b")],
                strategy: ParallelStrategy::WaitAll,
                max_concurrency: None,
            })],
            env: HashMap::new(),
        };
        assert!(def.find_task(&TaskId::from("child-b")).is_some());
        assert!(def.find_task(&TaskId::from("missing")).is_none());
    }

    #[test]
    fn find_task_descends_into_composite_children() {
        let def = WorkflowDefinition {
            workflow_id: WorkflowId::from("wf"),
            tasks: vec![TaskConfig::Composite(CompositeConfig {
                base: BaseConfig {
                    id: TaskId::from("seq"),
                    ..Default::default()
                },
                tasks: vec![basic("step-1"), basic("step-2")],
            })],
            env: HashMap::new(),
        };
        assert_eq!(def.find_task(&TaskId::from("step-1")).unwrap().id().as_str(), "step-1");
    }

    #[test]
    fn entry_task_is_the_first_top_level_task() {
        let def = WorkflowDefinition {
            workflow_id: WorkflowId::from("wf"),
            tasks: vec![basic("first"), basic("second")],
            env: HashMap::new(),
        };
        assert_eq!(def.entry_task().unwrap().id().as_str(), "first");
    }
}
