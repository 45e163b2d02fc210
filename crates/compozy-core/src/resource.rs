//! Resource Store keys.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Workflow,
    Agent,
    Tool,
    Model,
    Schema,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub project: String,
    pub resource_type: ResourceType,
    pub id: String,
}

impl ResourceKey {
    pub fn new(project: impl Into<String>, resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            resource_type,
            id: id.into(),
        }
    }
}

/// Opaque version identifier for a Resource Store value, used for CAS writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    pub fn from_revision(revision: u64) -> Self {
        Self(format!("{revision:020x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
