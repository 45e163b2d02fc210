//! End-to-end scenarios driving `TaskExecutionWorkflow` through a real
//! `WorkflowExecutor<InMemoryWorkflowEventStore>`, exactly as
//! `compozy-durable`'s own `CounterWorkflow` tests drive a workflow: no
//! `Activity`/`WorkerPool` registration needed, just direct
//! `on_activity_completed`/`on_activity_failed`/`send_signal` calls.

use std::collections::HashMap;

use compozy_core::ids::{TaskId, WorkflowId};
use compozy_core::task_config::{
    BaseConfig, BasicConfig, CollectionConfig, CollectionMode, RouterConfig, TaskConfig,
};
use compozy_durable::{
    InMemoryWorkflowEventStore, WorkflowEvent, WorkflowEventStore, WorkflowExecutor, WorkflowSignal,
    WorkflowStatus,
};
use compozy_engine::{TaskExecutionWorkflow, WorkflowDefinition, WorkflowTrigger};
use serde_json::json;

fn trigger(tasks: Vec<TaskConfig>, input: serde_json::Value, env: HashMap<String, String>) -> WorkflowTrigger {
    WorkflowTrigger {
        workflow_id: WorkflowId::from("wf"),
        definition: WorkflowDefinition { workflow_id: WorkflowId::from("wf"), tasks, env },
        input,
        correlation_id: None,
        triggered_at: chrono::Utc::now(),
    }
}

fn basic(id: &str, with: serde_json::Value, action: &str) -> TaskConfig {
    TaskConfig::Basic(BasicConfig {
        base: BaseConfig { id: TaskId::from(id), with, ..Default::default() },
        action: action.into(),
    })
}

fn basic_chained(id: &str, on_success: Option<&str>) -> TaskConfig {
    TaskConfig::Basic(BasicConfig {
        base: BaseConfig {
            id: TaskId::from(id),
            on_success: on_success.map(TaskId::from),
            ..Default::default()
        },
        action: "noop".into(),
    })
}

/// `dispatch_task` activity ids that have been scheduled but not yet
/// completed/failed, in scheduling order.
async fn pending_dispatch_ids(executor: &WorkflowExecutor<InMemoryWorkflowEventStore>, workflow_id: uuid::Uuid) -> Vec<String> {
    let events = executor.store().load_events(workflow_id).await.expect("load events");
    let mut scheduled = Vec::new();
    let mut resolved = std::collections::HashSet::new();
    for (_, event) in &events {
        match event {
            WorkflowEvent::ActivityScheduled { activity_id, activity_type, .. } if activity_type == "dispatch_task" => {
                scheduled.push(activity_id.clone());
            }
            WorkflowEvent::ActivityCompleted { activity_id, .. } | WorkflowEvent::ActivityFailed { activity_id, .. } => {
                resolved.insert(activity_id.clone());
            }
            _ => {}
        }
    }
    scheduled.into_iter().filter(|id| !resolved.contains(id)).collect()
}

/// S1 — Basic input templating: a single basic task whose `With` pulls from
/// workflow input, completed with a raw activity result that is carried
/// straight through to the workflow's output since no `Outputs` mapping is
/// configured.
#[tokio::test]
async fn s1_basic_input_templating() {
    let store = InMemoryWorkflowEventStore::new();
    let mut executor = WorkflowExecutor::new(store);
    executor.register::<TaskExecutionWorkflow>();

    let task = basic("echo-step", json!({"echo": "{{ workflow.input.message }}"}), "echo-tool");
    let workflow_id = executor
        .start_workflow::<TaskExecutionWorkflow>(trigger(vec![task], json!({"message": "Hello"}), HashMap::new()), None)
        .await
        .expect("should start workflow");

    let events = executor.store().load_events(workflow_id).await.unwrap();
    let scheduled_input = events.iter().find_map(|(_, e)| match e {
        WorkflowEvent::ActivityScheduled { input, .. } => Some(input.clone()),
        _ => None,
    }).expect("dispatch_task scheduled");
    assert_eq!(scheduled_input["cfg"]["with"], json!({"echo": "Hello"}));

    let activity_id = pending_dispatch_ids(&executor, workflow_id).await.pop().unwrap();
    let result = executor
        .on_activity_completed(
            workflow_id,
            &activity_id,
            json!({"echo": {"message": "Hello"}, "tool_name": "echo-tool", "type": "object"}),
        )
        .await
        .expect("should complete activity");

    assert!(result.completed);
    let info = executor.store().get_workflow_info(workflow_id).await.unwrap();
    assert_eq!(info.status, WorkflowStatus::Completed);
    assert_eq!(
        info.result.unwrap(),
        json!({"echo": {"message": "Hello"}, "tool_name": "echo-tool", "type": "object"})
    );
}

fn router_workflow(user_type: &str) -> WorkflowTrigger {
    let router = TaskConfig::Router(RouterConfig {
        base: BaseConfig {
            id: TaskId::from("route"),
            ..Default::default()
        },
        condition: "{{ env.user_type }}".into(),
        routes: HashMap::from([
            ("admin".to_string(), TaskId::from("admin-task")),
            ("user".to_string(), TaskId::from("user-task")),
        ]),
    });
    let admin_task = basic("admin-task", json!({}), "noop");
    let user_task = basic("user-task", json!({}), "noop");
    trigger(
        vec![router, admin_task, user_task],
        json!({}),
        HashMap::from([("user_type".to_string(), user_type.to_string())]),
    )
}

/// S2 — Router to admin: the `admin` route is taken and `user-task` is
/// never scheduled.
#[tokio::test]
async fn s2_router_to_admin() {
    let store = InMemoryWorkflowEventStore::new();
    let mut executor = WorkflowExecutor::new(store);
    executor.register::<TaskExecutionWorkflow>();

    let workflow_id = executor
        .start_workflow::<TaskExecutionWorkflow>(router_workflow("admin"), None)
        .await
        .expect("should start workflow");

    // The router resolves in-process (no activity to complete); the entry
    // task's `on_start` already scheduled the `admin-task` dispatch.
    let activity_id = pending_dispatch_ids(&executor, workflow_id).await.pop().unwrap();
    let result = executor
        .on_activity_completed(workflow_id, &activity_id, json!({"ok": true}))
        .await
        .expect("should complete admin-task");
    assert!(result.completed);

    let info = executor.store().get_workflow_info(workflow_id).await.unwrap();
    assert_eq!(info.status, WorkflowStatus::Completed);

    let events = executor.store().load_events(workflow_id).await.unwrap();
    let scheduled_types: Vec<_> = events
        .iter()
        .filter_map(|(_, e)| match e {
            WorkflowEvent::ActivityScheduled { input, .. } => Some(input["cfg"]["id"].clone()),
            _ => None,
        })
        .collect();
    assert!(scheduled_types.iter().all(|id| id != "user-task"));
}

/// S3 — Router missing route: the condition resolves to a value with no
/// matching route, so the router task (and the workflow) fails immediately.
#[tokio::test]
async fn s3_router_missing_route_fails_the_workflow() {
    let store = InMemoryWorkflowEventStore::new();
    let mut executor = WorkflowExecutor::new(store);
    executor.register::<TaskExecutionWorkflow>();

    let workflow_id = executor
        .start_workflow::<TaskExecutionWorkflow>(router_workflow("super_admin"), None)
        .await
        .expect("should start workflow");

    let info = executor.store().get_workflow_info(workflow_id).await.unwrap();
    assert_eq!(info.status, WorkflowStatus::Failed);
}

/// S4 — Collection with filter: four users, two of which survive the
/// filter, each dispatched as its own `dispatch_task` activity; the
/// workflow's final output preserves input order.
#[tokio::test]
async fn s4_collection_with_filter() {
    let store = InMemoryWorkflowEventStore::new();
    let mut executor = WorkflowExecutor::new(store);
    executor.register::<TaskExecutionWorkflow>();

    let item_task = basic("notify-user", json!({"name": "{{ item.name }}"}), "notify");
    let collection = TaskConfig::Collection(CollectionConfig {
        base: BaseConfig { id: TaskId::from("notify-all"), ..Default::default() },
        items: "{{ workflow.input.users }}".into(),
        filter: Some("{{ item.active and not item.notified }}".into()),
        item_var: "item".into(),
        index_var: "index".into(),
        mode: CollectionMode::Parallel,
        batch: None,
        task: Box::new(item_task),
    });

    let users = json!([
        {"name": "alice", "active": true, "notified": false},
        {"name": "bob", "active": false, "notified": false},
        {"name": "carol", "active": true, "notified": true},
        {"name": "dave", "active": true, "notified": false},
    ]);

    let workflow_id = executor
        .start_workflow::<TaskExecutionWorkflow>(trigger(vec![collection], json!({"users": users}), HashMap::new()), None)
        .await
        .expect("should start workflow");

    let mut pending = pending_dispatch_ids(&executor, workflow_id).await;
    assert_eq!(pending.len(), 2, "alice and dave survive the filter");

    for activity_id in pending.drain(..) {
        executor
            .on_activity_completed(workflow_id, &activity_id, json!({"sent": true}))
            .await
            .expect("should complete notify activity");
    }

    let info = executor.store().get_workflow_info(workflow_id).await.unwrap();
    assert_eq!(info.status, WorkflowStatus::Completed);
    assert_eq!(info.result.unwrap(), json!([{"sent": true}, {"sent": true}]));
}

/// S5 — Pause/resume: a three-step chain (`step-1 -> step-2 -> step-3` via
/// `OnSuccess`) is paused while step 1 is in flight, so completing step 1
/// defers step 2's dispatch instead of scheduling it; step 2 is only
/// actually dispatched once a `resume` signal arrives.
#[tokio::test]
async fn s5_pause_resume() {
    let store = InMemoryWorkflowEventStore::new();
    let mut executor = WorkflowExecutor::new(store);
    executor.register::<TaskExecutionWorkflow>();

    let tasks = vec![
        basic_chained("step-1", Some("step-2")),
        basic_chained("step-2", Some("step-3")),
        basic_chained("step-3", None),
    ];

    let workflow_id = executor
        .start_workflow::<TaskExecutionWorkflow>(trigger(tasks, json!({}), HashMap::new()), None)
        .await
        .expect("should start workflow");

    let step1_id = pending_dispatch_ids(&executor, workflow_id).await.pop().unwrap();

    executor
        .send_signal(workflow_id, WorkflowSignal::new("pause", json!({})))
        .await
        .expect("should send pause");
    executor.process_workflow(workflow_id).await.expect("should process pause");

    executor
        .on_activity_completed(workflow_id, &step1_id, json!({"step": 1}))
        .await
        .expect("step 1 completes while paused");

    // step-2 was deferred by the pause, not dispatched.
    let info = executor.store().get_workflow_info(workflow_id).await.unwrap();
    assert_eq!(info.status, WorkflowStatus::Running);
    assert!(pending_dispatch_ids(&executor, workflow_id).await.is_empty());

    executor
        .send_signal(workflow_id, WorkflowSignal::new("resume", json!({})))
        .await
        .expect("should send resume");
    executor.process_workflow(workflow_id).await.expect("should process resume");

    let step2_id = pending_dispatch_ids(&executor, workflow_id).await.pop().expect("step-2 dispatched after resume");
    executor
        .on_activity_completed(workflow_id, &step2_id, json!({"step": 2}))
        .await
        .expect("step 2 completes");

    let step3_id = pending_dispatch_ids(&executor, workflow_id).await.pop().expect("step-3 dispatched");
    executor
        .on_activity_completed(workflow_id, &step3_id, json!({"step": 3}))
        .await
        .expect("step 3 completes");

    let info = executor.store().get_workflow_info(workflow_id).await.unwrap();
    assert_eq!(info.status, WorkflowStatus::Completed);
}
