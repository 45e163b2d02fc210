//! Core data model shared by every Compozy crate: opaque execution IDs,
//! the workflow/task status machine, the task-config tagged union, resource
//! keys, usage aggregation, and the error taxonomy.

pub mod config;
pub mod error;
pub mod ids;
pub mod resource;
pub mod state;
pub mod status;
pub mod task_config;
pub mod usage;

pub use config::CompozyConfig;
pub use error::{CompozyError, ErrorDetails};
pub use ids::{AgentExecId, CorrelationId, TaskExecId, TaskId, ToolExecId, WorkflowExecId, WorkflowId};
pub use resource::{ETag, ResourceKey, ResourceType};
pub use state::{StateError, TaskState, WorkflowState};
pub use status::{allowed_transition, Status};
pub use task_config::{
    AggregateConfig, BaseConfig, BasicConfig, CollectionConfig, CollectionMode, Component,
    CompositeConfig, ExecutionType, ParallelConfig, ParallelStrategy, RetryConfig, RouterConfig,
    TaskConfig, WaitSignalConfig,
};
pub use usage::{Usage, UsageEntry};
