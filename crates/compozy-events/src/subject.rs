//! Event subject grammar.
//!
//! Two coexisting grammars were found in the source material for commands
//! and events: a versioned one and an unversioned one. The versioned form
//! is normative here because it is the only one given a complete grammar;
//! logs keep the unversioned form the source spec gives them explicitly.
//!
//! ```text
//! Command : <version>.compozy.<workflow_exec_id>.<component>.cmd.<component_exec_id>.<verb>
//! Event   : <version>.compozy.<workflow_exec_id>.<component>.evt.<component_exec_id>.<past-tense>
//! Log     : compozy.<workflow_exec_id>.<component>.logs.<component_exec_id>.<level>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectComponent {
    Workflow,
    Task,
    Agent,
    Tool,
}

impl SubjectComponent {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubjectComponent::Workflow => "workflow",
            SubjectComponent::Task => "task",
            SubjectComponent::Agent => "agent",
            SubjectComponent::Tool => "tool",
        }
    }

    fn command_verbs(self) -> &'static [&'static str] {
        match self {
            SubjectComponent::Workflow => &["trigger", "execute", "pause", "resume", "cancel"],
            SubjectComponent::Task => &["dispatch", "execute", "resume"],
            SubjectComponent::Agent => &["execute"],
            SubjectComponent::Tool => &["execute"],
        }
    }

    fn event_verbs(self) -> &'static [&'static str] {
        match self {
            SubjectComponent::Workflow => {
                &["started", "paused", "resumed", "success", "failed", "canceled", "timed_out"]
            }
            SubjectComponent::Task => &[
                "dispatched",
                "started",
                "waiting_started",
                "waiting_ended",
                "waiting_timed_out",
                "success",
                "failed",
                "retry_scheduled",
            ],
            SubjectComponent::Agent => &["started", "success", "failed"],
            SubjectComponent::Tool => &["started", "success", "failed"],
        }
    }
}

impl FromStr for SubjectComponent {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow" => Ok(SubjectComponent::Workflow),
            "task" => Ok(SubjectComponent::Task),
            "agent" => Ok(SubjectComponent::Agent),
            "tool" => Ok(SubjectComponent::Tool),
            other => Err(SubjectError::UnknownComponent(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Cmd,
    Evt,
    Logs,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubjectError {
    #[error("subject has the wrong number of segments: {0}")]
    Malformed(String),
    #[error("unknown component: {0}")]
    UnknownComponent(String),
    #[error("unknown subject kind segment: {0}")]
    UnknownKind(String),
    #[error("verb {verb:?} is not valid for component {component:?} kind {kind:?}")]
    UnknownVerb {
        component: SubjectComponent,
        kind: SubjectKind,
        verb: String,
    },
}

/// A parsed, validated event subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub version: Option<String>,
    pub workflow_exec_id: String,
    pub component: SubjectComponent,
    pub kind: SubjectKind,
    pub component_exec_id: String,
    pub verb: String,
}

impl Subject {
    pub fn command(
        version: impl Into<String>,
        workflow_exec_id: impl Into<String>,
        component: SubjectComponent,
        component_exec_id: impl Into<String>,
        verb: impl Into<String>,
    ) -> Result<Self, SubjectError> {
        let verb = verb.into();
        if !component.command_verbs().contains(&verb.as_str()) {
            return Err(SubjectError::UnknownVerb {
                component,
                kind: SubjectKind::Cmd,
                verb,
            });
        }
        Ok(Self {
            version: Some(version.into()),
            workflow_exec_id: workflow_exec_id.into(),
            component,
            kind: SubjectKind::Cmd,
            component_exec_id: component_exec_id.into(),
            verb,
        })
    }

    pub fn event(
        version: impl Into<String>,
        workflow_exec_id: impl Into<String>,
        component: SubjectComponent,
        component_exec_id: impl Into<String>,
        verb: impl Into<String>,
    ) -> Result<Self, SubjectError> {
        let verb = verb.into();
        if !component.event_verbs().contains(&verb.as_str()) {
            return Err(SubjectError::UnknownVerb {
                component,
                kind: SubjectKind::Evt,
                verb,
            });
        }
        Ok(Self {
            version: Some(version.into()),
            workflow_exec_id: workflow_exec_id.into(),
            component,
            kind: SubjectKind::Evt,
            component_exec_id: component_exec_id.into(),
            verb,
        })
    }

    pub fn log(
        workflow_exec_id: impl Into<String>,
        component: SubjectComponent,
        component_exec_id: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        Self {
            version: None,
            workflow_exec_id: workflow_exec_id.into(),
            component,
            kind: SubjectKind::Logs,
            component_exec_id: component_exec_id.into(),
            verb: level.into(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SubjectKind::Logs => write!(
                f,
                "compozy.{}.{}.logs.{}.{}",
                self.workflow_exec_id,
                self.component.as_str(),
                self.component_exec_id,
                self.verb
            ),
            SubjectKind::Cmd | SubjectKind::Evt => {
                let kind_segment = if self.kind == SubjectKind::Cmd { "cmd" } else { "evt" };
                write!(
                    f,
                    "{}.compozy.{}.{}.{}.{}.{}",
                    self.version.as_deref().unwrap_or("v1"),
                    self.workflow_exec_id,
                    self.component.as_str(),
                    kind_segment,
                    self.component_exec_id,
                    self.verb
                )
            }
        }
    }
}

impl FromStr for Subject {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('.').collect();
        match segments.as_slice() {
            // unversioned log: compozy.<weid>.<component>.logs.<ceid>.<level>
            [root, weid, component, "logs", ceid, level] if *root == "compozy" => {
                let component: SubjectComponent = component.parse()?;
                Ok(Subject::log(*weid, component, *ceid, *level))
            }
            // versioned cmd/evt: <version>.compozy.<weid>.<component>.{cmd,evt}.<ceid>.<verb>
            [version, root, weid, component, kind_seg, ceid, verb] if *root == "compozy" => {
                let component: SubjectComponent = component.parse()?;
                match *kind_seg {
                    "cmd" => Subject::command(*version, *weid, component, *ceid, *verb),
                    "evt" => Subject::event(*version, *weid, component, *ceid, *verb),
                    other => Err(SubjectError::UnknownKind(other.to_string())),
                }
            }
            _ => Err(SubjectError::Malformed(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_display_and_parse() {
        let subject = Subject::command("v1", "wf-exec-1", SubjectComponent::Workflow, "wf-exec-1", "trigger").unwrap();
        let rendered = subject.to_string();
        assert_eq!(rendered, "v1.compozy.wf-exec-1.workflow.cmd.wf-exec-1.trigger");
        let parsed: Subject = rendered.parse().unwrap();
        assert_eq!(parsed, subject);
    }

    #[test]
    fn event_round_trips() {
        let subject = Subject::event("v1", "wf-1", SubjectComponent::Task, "task-1", "success").unwrap();
        let rendered = subject.to_string();
        let parsed: Subject = rendered.parse().unwrap();
        assert_eq!(parsed, subject);
    }

    #[test]
    fn log_subject_has_no_version_segment() {
        let subject = Subject::log("wf-1", SubjectComponent::Tool, "tool-1", "info");
        assert_eq!(subject.to_string(), "compozy.wf-1.tool.logs.tool-1.info");
    }

    #[test]
    fn rejects_verb_not_in_the_closed_set() {
        let err = Subject::event("v1", "wf-1", SubjectComponent::Workflow, "wf-1", "exploded").unwrap_err();
        assert!(matches!(err, SubjectError::UnknownVerb { .. }));
    }

    #[test]
    fn subject_contains_workflow_and_component_exec_ids() {
        let subject = Subject::event("v1", "wf-77", SubjectComponent::Agent, "agent-9", "success").unwrap();
        let rendered = subject.to_string();
        assert!(rendered.contains("wf-77"));
        assert!(rendered.contains("agent-9"));
    }
}
