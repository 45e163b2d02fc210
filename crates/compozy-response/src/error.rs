use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ResponseError {
    #[error(transparent)]
    Template(#[from] compozy_template::TemplateError),

    #[error("router condition {condition:?} did not match any configured route")]
    RouterNoMatch { condition: String },

    #[error("collection response requires {expected} child results, got {actual}")]
    ChildCountMismatch { expected: usize, actual: usize },
}
