//! Task definitions as a tagged-union sum type.
//!
//! The source model relies on embedded structs plus a `Type` discriminant;
//! Rust has no struct inheritance, so each `ExecutionType` becomes its own
//! variant holding a shared [`BaseConfig`] by composition. Dispatch over
//! `TaskConfig` (in the normalizer and response-handler crates) is then an
//! exhaustive match instead of a runtime type switch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Task,
    Agent,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Basic,
    Router,
    Parallel,
    Collection,
    Composite,
    Aggregate,
    Wait,
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStrategy {
    WaitAll,
    WaitAny,
    Race,
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

/// Fields shared by every `ExecutionType`. Held by value (never by reference
/// or inheritance) inside each [`TaskConfig`] variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseConfig {
    pub id: TaskId,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub with: serde_json::Value,
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub on_success: Option<TaskId>,
    #[serde(default)]
    pub on_error: Option<TaskId>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub tool_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub condition: String,
    pub routes: HashMap<String, TaskId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub tasks: Vec<TaskConfig>,
    pub strategy: ParallelStrategy,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub items: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_item_var")]
    pub item_var: String,
    #[serde(default = "default_index_var")]
    pub index_var: String,
    pub mode: CollectionMode,
    #[serde(default)]
    pub batch: Option<u32>,
    pub task: Box<TaskConfig>,
}

fn default_item_var() -> String {
    "item".to_string()
}

fn default_index_var() -> String {
    "index".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub outputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSignalConfig {
    #[serde(flatten)]
    pub base: BaseConfig,
    pub signal_name: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskConfig {
    Basic(BasicConfig),
    Router(RouterConfig),
    Parallel(ParallelConfig),
    Collection(CollectionConfig),
    Composite(CompositeConfig),
    Aggregate(AggregateConfig),
    Wait(WaitSignalConfig),
    Signal(WaitSignalConfig),
}

impl TaskConfig {
    pub fn execution_type(&self) -> ExecutionType {
        match self {
            TaskConfig::Basic(_) => ExecutionType::Basic,
            TaskConfig::Router(_) => ExecutionType::Router,
            TaskConfig::Parallel(_) => ExecutionType::Parallel,
            TaskConfig::Collection(_) => ExecutionType::Collection,
            TaskConfig::Composite(_) => ExecutionType::Composite,
            TaskConfig::Aggregate(_) => ExecutionType::Aggregate,
            TaskConfig::Wait(_) => ExecutionType::Wait,
            TaskConfig::Signal(_) => ExecutionType::Signal,
        }
    }

    pub fn base(&self) -> &BaseConfig {
        match self {
            TaskConfig::Basic(c) => &c.base,
            TaskConfig::Router(c) => &c.base,
            TaskConfig::Parallel(c) => &c.base,
            TaskConfig::Collection(c) => &c.base,
            TaskConfig::Composite(c) => &c.base,
            TaskConfig::Aggregate(c) => &c.base,
            TaskConfig::Wait(c) => &c.base,
            TaskConfig::Signal(c) => &c.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseConfig {
        match self {
            TaskConfig::Basic(c) => &mut c.base,
            TaskConfig::Router(c) => &mut c.base,
            TaskConfig::Parallel(c) => &mut c.base,
            TaskConfig::Collection(c) => &mut c.base,
            TaskConfig::Composite(c) => &mut c.base,
            TaskConfig::Aggregate(c) => &mut c.base,
            TaskConfig::Wait(c) => &mut c.base,
            TaskConfig::Signal(c) => &mut c.base,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.base().id
    }
}
