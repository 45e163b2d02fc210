//! Opaque, URL-safe identifier newtypes.
//!
//! Every distinct ID space in the data model (workflow definitions vs.
//! executions, task definitions vs. executions, agent/tool executions,
//! user-supplied correlation keys) gets its own type so the compiler catches
//! an `WorkflowExecId` passed where a `TaskExecId` was expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a new, time-ordered id (UUIDv7 under the hood).
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(WorkflowId);
opaque_id!(WorkflowExecId);
opaque_id!(TaskId);
opaque_id!(TaskExecId);
opaque_id!(AgentExecId);
opaque_id!(ToolExecId);
opaque_id!(CorrelationId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_display_and_parse() {
        let id = TaskExecId::new();
        let parsed: TaskExecId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_id_types_do_not_compare_equal_by_accident() {
        // compile-time guarantee really, this just documents intent
        let wf = WorkflowExecId::new();
        let task = TaskExecId::from(wf.as_str());
        assert_eq!(wf.as_str(), task.as_str());
    }
}
