use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Normalize(#[from] compozy_normalizer::NormalizeError),

    #[error(transparent)]
    Response(#[from] compozy_response::ResponseError),

    #[error(transparent)]
    Template(#[from] compozy_template::TemplateError),

    #[error("task {0:?} not found in workflow definition")]
    TaskNotFound(compozy_core::ids::TaskId),

    #[error("activity dispatch failed: {0}")]
    Dispatch(String),
}
