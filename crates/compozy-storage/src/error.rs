use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: expected revision {expected}, got {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("illegal status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("etag mismatch for {key}: expected {expected}, got {actual}")]
    EtagMismatch { key: String, expected: String, actual: String },

    #[error("database error: {0}")]
    Database(String),
}

impl From<&StoreError> for compozy_core::error::CompozyError {
    fn from(err: &StoreError) -> Self {
        use compozy_core::error::ErrorDetails;
        let details = ErrorDetails {
            message: err.to_string(),
            details: None,
        };
        match err {
            StoreError::NotFound(_) => compozy_core::error::CompozyError::NotFound(details),
            StoreError::Conflict { .. } => compozy_core::error::CompozyError::Conflict(details),
            StoreError::InvalidTransition { .. } => compozy_core::error::CompozyError::InvalidTransition(details),
            StoreError::EtagMismatch { .. } => compozy_core::error::CompozyError::EtagMismatch(details),
            StoreError::Database(_) => compozy_core::error::CompozyError::Activity(details),
        }
    }
}
