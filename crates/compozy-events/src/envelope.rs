//! Event envelope published on every state change.

use chrono::{DateTime, Utc};
use compozy_core::{CorrelationId, WorkflowExecId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::Subject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata envelope carried by every message, per the external interfaces
/// contract: `{correlation_id, workflow_exec_id, source_component, version, time}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub subject: String,
    pub correlation_id: Option<CorrelationId>,
    pub workflow_exec_id: WorkflowExecId,
    pub source_component: String,
    pub version: String,
    pub time: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(
        subject: &Subject,
        workflow_exec_id: WorkflowExecId,
        correlation_id: Option<CorrelationId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            subject: subject.to_string(),
            correlation_id,
            workflow_exec_id,
            source_component: subject.component.as_str().to_string(),
            version: subject.version.clone().unwrap_or_else(|| "v1".to_string()),
            time: Utc::now(),
            payload,
        }
    }
}
