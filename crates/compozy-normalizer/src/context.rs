use compozy_core::task_config::BaseConfig;
use compozy_template::TemplateEngine;
use serde_json::Value;

/// Everything a `Normalizer` needs besides the `TaskConfig` itself: the
/// rendered variable namespace from the Context Builder, the template
/// engine, and the limits pulled from `CompozyConfig`.
pub struct NormalizationContext<'a> {
    pub vars: Value,
    pub engine: &'a TemplateEngine,
    pub max_collection_items: usize,
    pub parent_base: Option<&'a BaseConfig>,
}

impl<'a> NormalizationContext<'a> {
    pub fn new(vars: Value, engine: &'a TemplateEngine, max_collection_items: usize) -> Self {
        Self {
            vars,
            engine,
            max_collection_items,
            parent_base: None,
        }
    }

    pub fn with_parent(mut self, parent_base: &'a BaseConfig) -> Self {
        self.parent_base = Some(parent_base);
        self
    }

    pub fn with_vars(mut self, vars: Value) -> Self {
        self.vars = vars;
        self
    }
}
