//! The injectable seam between the workflow and its out-of-scope
//! collaborators (agent invocation, tool execution).

use async_trait::async_trait;
use compozy_core::task_config::TaskConfig;
use compozy_durable::ActivityError;
use serde_json::Value;

#[async_trait]
pub trait ActivityDispatcher: Send + Sync {
    /// Performs the side-effecting work for a single normalized task and
    /// returns its raw (pre-`Outputs`) result.
    async fn dispatch(&self, cfg: &TaskConfig, vars: &Value) -> Result<Value, ActivityError>;
}

/// Resolves the structural `ExecutionType`s in-process (no external call
/// needed: their "result" is just the fact that they ran) and delegates
/// `basic`/agent/tool dispatch to an injected collaborator.
pub struct StructuralActivityDispatcher {
    inner: std::sync::Arc<dyn ActivityDispatcher>,
}

impl StructuralActivityDispatcher {
    pub fn new(inner: std::sync::Arc<dyn ActivityDispatcher>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ActivityDispatcher for StructuralActivityDispatcher {
    async fn dispatch(&self, cfg: &TaskConfig, vars: &Value) -> Result<Value, ActivityError> {
        match cfg {
            TaskConfig::Router(_)
            | TaskConfig::Parallel(_)
            | TaskConfig::Collection(_)
            | TaskConfig::Composite(_)
            | TaskConfig::Aggregate(_)
            | TaskConfig::Wait(_)
            | TaskConfig::Signal(_) => Ok(Value::Null),
            TaskConfig::Basic(basic) if basic.action.is_empty() => {
                Err(ActivityError::non_retryable("basic task has no action to dispatch"))
            }
            TaskConfig::Basic(_) => self.inner.dispatch(cfg, vars).await,
        }
    }
}

/// Echoes its `vars.output` (or the task's rendered `with` block if absent)
/// back as the activity result. Scenario S1's "echo-tool" collaborator.
#[derive(Default)]
pub struct MockActivityDispatcher;

#[async_trait]
impl ActivityDispatcher for MockActivityDispatcher {
    async fn dispatch(&self, cfg: &TaskConfig, vars: &Value) -> Result<Value, ActivityError> {
        Ok(vars.get("output").cloned().unwrap_or_else(|| cfg.base().with.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compozy_core::ids::TaskId;
    use compozy_core::task_config::{BaseConfig, BasicConfig, RouterConfig};
    use serde_json::json;

    #[tokio::test]
    async fn structural_tasks_never_reach_the_inner_dispatcher() {
        let dispatcher = StructuralActivityDispatcher::new(std::sync::Arc::new(MockActivityDispatcher));
        let cfg = TaskConfig::Router(RouterConfig {
            base: BaseConfig {
                id: TaskId::from("route"),
                ..Default::default()
            },
            condition: "admin".into(),
            routes: Default::default(),
        });
        let result = dispatcher.dispatch(&cfg, &json!({})).await.unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn basic_task_with_empty_action_is_non_retryable() {
        let dispatcher = StructuralActivityDispatcher::new(std::sync::Arc::new(MockActivityDispatcher));
        let cfg = TaskConfig::Basic(BasicConfig {
            base: BaseConfig {
                id: TaskId::from("noop"),
                ..Default::default()
            },
            action: String::new(),
        });
        let err = dispatcher.dispatch(&cfg, &json!({})).await.unwrap_err();
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn mock_dispatcher_echoes_the_with_block() {
        let cfg = TaskConfig::Basic(BasicConfig {
            base: BaseConfig {
                id: TaskId::from("echo"),
                with: json!({"message": "hi"}),
                ..Default::default()
            },
            action: "echo".into(),
        });
        let result = MockActivityDispatcher.dispatch(&cfg, &json!({})).await.unwrap();
        assert_eq!(result, json!({"message": "hi"}));
    }
}
