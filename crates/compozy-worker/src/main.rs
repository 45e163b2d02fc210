//! Boots the durable store, the `TaskExecutionWorkflow` executor, and a
//! `WorkerPool` handling the `"dispatch_task"`/`"persist_task_state"`
//! activity types the engine schedules. No HTTP or CLI surface: workflows
//! are started by whatever embeds this process, and this binary only
//! drains the queue and waits on `ctrl_c`.

use std::sync::Arc;

use anyhow::Result;
use compozy_core::config::CompozyConfig;
#[cfg(feature = "postgres")]
use compozy_core::config::RuntimeMode;
use compozy_durable::persistence::TaskFailureOutcome;
use compozy_durable::{
    ActivityError, InMemoryWorkflowEventStore, WorkerPool, WorkerPoolConfig, WorkflowEventStore,
    WorkflowExecutor,
};
use compozy_engine::{ActivityDispatcher, MockActivityDispatcher, StructuralActivityDispatcher, TaskExecutionWorkflow};
use compozy_storage::{InMemoryStateStore, StateStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "postgres")]
use compozy_durable::PostgresWorkflowEventStore;
#[cfg(feature = "postgres")]
use compozy_storage::PostgresStateStore;

const DISPATCH_TASK: &str = "dispatch_task";
const PERSIST_TASK_STATE: &str = "persist_task_state";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "compozy_worker=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("compozy-worker starting...");

    let config = CompozyConfig::from_env();
    let dispatcher: Arc<dyn ActivityDispatcher> = Arc::new(MockActivityDispatcher);

    #[cfg(feature = "postgres")]
    if matches!(config.mode, RuntimeMode::Persistent | RuntimeMode::Distributed) {
        let pool = sqlx::PgPool::connect(&config.database.conn_string).await?;
        tracing::info!("Database connection established");
        let store = PostgresWorkflowEventStore::new(pool.clone());
        let state_store: Arc<dyn StateStore> = Arc::new(PostgresStateStore::new(pool));
        return run(config, store, state_store, dispatcher).await;
    }

    let store = InMemoryWorkflowEventStore::new();
    let state_store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    run(config, store, state_store, dispatcher).await
}

/// Wires one durable store (shared by the executor and the worker pool) to
/// a `WorkerPool` whose handlers bridge task-queue outcomes back into the
/// workflow's event log, then blocks until the process is asked to stop.
async fn run<S>(
    config: CompozyConfig,
    store: S,
    state_store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn ActivityDispatcher>,
) -> Result<()>
where
    S: WorkflowEventStore + Clone + 'static,
{
    let dispatcher = Arc::new(StructuralActivityDispatcher::new(dispatcher));

    let mut executor = WorkflowExecutor::new(store.clone());
    executor.register::<TaskExecutionWorkflow>();
    let executor = Arc::new(executor);
    tracing::info!(task_queue = %config.task_queue, "workflow executor initialized");

    let pool_config = WorkerPoolConfig::new(vec![DISPATCH_TASK.to_string(), PERSIST_TASK_STATE.to_string()])
        .with_worker_group(config.task_queue.clone());
    let pool = WorkerPool::new(Arc::new(store.clone()) as Arc<dyn WorkflowEventStore>, pool_config);

    {
        let executor = Arc::clone(&executor);
        let dispatcher = Arc::clone(&dispatcher);
        let store = store.clone();
        pool.register_handler(DISPATCH_TASK, move |task| {
            let executor = Arc::clone(&executor);
            let dispatcher = Arc::clone(&dispatcher);
            let store = store.clone();
            async move {
                let cfg = serde_json::from_value(task.input["cfg"].clone()).map_err(|e| e.to_string())?;
                let vars = task.input["vars"].clone();

                match dispatcher.dispatch(&cfg, &vars).await {
                    Ok(result) => {
                        executor
                            .on_activity_completed(task.workflow_id, &task.activity_id, result.clone())
                            .await
                            .map_err(|e| e.to_string())?;
                        Ok(result)
                    }
                    Err(err) => {
                        let outcome = store
                            .fail_task(task.id, &err.message)
                            .await
                            .map_err(|e| e.to_string())?;
                        let will_retry = matches!(outcome, TaskFailureOutcome::WillRetry { .. });
                        report_failure(&executor, task.workflow_id, &task.activity_id, &err, will_retry).await;
                        Err(err.message)
                    }
                }
            }
        });
    }

    {
        let executor = Arc::clone(&executor);
        pool.register_handler(PERSIST_TASK_STATE, move |task| {
            let executor = Arc::clone(&executor);
            let state_store = Arc::clone(&state_store);
            async move {
                let state = serde_json::from_value(task.input.clone()).map_err(|e| e.to_string())?;
                state_store.upsert_task_state(state).await.map_err(|e| e.to_string())?;
                executor
                    .on_activity_completed(task.workflow_id, &task.activity_id, serde_json::Value::Null)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(serde_json::Value::Null)
            }
        });
    }

    pool.start().await?;
    tracing::info!(worker_id = %pool.worker_id(), "worker pool ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    pool.shutdown().await?;

    Ok(())
}

async fn report_failure<S: WorkflowEventStore>(
    executor: &WorkflowExecutor<S>,
    workflow_id: uuid::Uuid,
    activity_id: &str,
    err: &ActivityError,
    will_retry: bool,
) {
    if let Err(e) = executor
        .on_activity_failed(workflow_id, activity_id, err.clone(), will_retry)
        .await
    {
        tracing::error!(%workflow_id, activity_id, error = %e, "failed to record activity failure");
    }
}
