//! Persistence layer for durable execution
//!
//! This module provides:
//! - [`WorkflowEventStore`] trait for workflow and event persistence
//! - [`InMemoryWorkflowEventStore`] for testing and the default runtime
//! - [`PostgresWorkflowEventStore`] for production, behind the `postgres` feature

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod store;

pub use memory::InMemoryWorkflowEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresWorkflowEventStore;
pub use store::{
    ClaimedTask, DlqEntry, DlqFilter, HeartbeatResponse, Pagination, StoreError, TaskDefinition,
    TaskFailureOutcome, TaskStatus, TraceContext, WorkerFilter, WorkerInfo, WorkflowEventStore,
    WorkflowInfo, WorkflowStatus,
};
