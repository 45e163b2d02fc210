use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TemplateError {
    #[error("blocklisted identifier in expression: {0}")]
    Security(String),

    #[error("template could not be rendered: {0}")]
    Render(String),

    #[error("expression tree exceeded max depth {0}")]
    MaxDepthExceeded(usize),

    #[error("rendered output exceeded max length {0}")]
    MaxOutputExceeded(usize),
}
