use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum NormalizeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Template(#[from] compozy_template::TemplateError),

    #[error("collection has {actual} items, exceeding the configured limit of {limit}")]
    CollectionTooLarge { actual: usize, limit: usize },
}
