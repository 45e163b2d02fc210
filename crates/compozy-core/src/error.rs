//! Error taxonomy shared across the engine (spec §7).
//!
//! Each variant carries a human-readable message plus optional structured
//! `details` (task id, attempt, underlying provider code) — never a stack
//! trace. `retryable()` tells the Execution Driver whether the task-policy
//! retry loop should fire once the durable runtime's own activity retries
//! are exhausted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "error")]
pub enum CompozyError {
    #[error("validation error: {0}")]
    Validation(ErrorDetails),

    #[error("template error: {0}")]
    Template(ErrorDetails),

    #[error("template security error: {0}")]
    TemplateSecurity(ErrorDetails),

    #[error("router no match: {0}")]
    RouterNoMatch(ErrorDetails),

    #[error("collection too large: {0}")]
    CollectionTooLarge(ErrorDetails),

    #[error("activity error: {0}")]
    Activity(ErrorDetails),

    #[error("timeout: {0}")]
    Timeout(ErrorDetails),

    #[error("cancellation: {0}")]
    Cancellation(ErrorDetails),

    #[error("conflict: {0}")]
    Conflict(ErrorDetails),

    #[error("etag mismatch: {0}")]
    EtagMismatch(ErrorDetails),

    #[error("invalid transition: {0}")]
    InvalidTransition(ErrorDetails),

    #[error("not found: {0}")]
    NotFound(ErrorDetails),
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl CompozyError {
    /// Whether the task-policy retry loop should re-attempt this task after
    /// the durable runtime's own activity retries are exhausted.
    pub fn retryable(&self) -> bool {
        matches!(self, CompozyError::Activity(_) | CompozyError::Timeout(_) | CompozyError::Conflict(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CompozyError::Validation(_) => "ValidationError",
            CompozyError::Template(_) => "TemplateError",
            CompozyError::TemplateSecurity(_) => "TemplateSecurityError",
            CompozyError::RouterNoMatch(_) => "RouterNoMatchError",
            CompozyError::CollectionTooLarge(_) => "CollectionTooLargeError",
            CompozyError::Activity(_) => "ActivityError",
            CompozyError::Timeout(_) => "TimeoutError",
            CompozyError::Cancellation(_) => "CancellationError",
            CompozyError::Conflict(_) => "ConflictError",
            CompozyError::EtagMismatch(_) => "ETagMismatchError",
            CompozyError::InvalidTransition(_) => "InvalidTransitionError",
            CompozyError::NotFound(_) => "NotFoundError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_activity_timeout_and_conflict_are_retryable() {
        assert!(CompozyError::Activity(ErrorDetails::new("x")).retryable());
        assert!(CompozyError::Timeout(ErrorDetails::new("x")).retryable());
        assert!(CompozyError::Conflict(ErrorDetails::new("x")).retryable());
        assert!(!CompozyError::Validation(ErrorDetails::new("x")).retryable());
        assert!(!CompozyError::NotFound(ErrorDetails::new("x")).retryable());
        assert!(!CompozyError::Cancellation(ErrorDetails::new("x")).retryable());
    }
}
