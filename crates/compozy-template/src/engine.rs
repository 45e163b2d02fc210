//! The Template Engine: a pure `render(tree, vars)` function over `minijinja`.

use std::sync::Arc;

use minijinja::Environment;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::error::TemplateError;
use crate::security::check_security;

const DEFAULT_MAX_DEPTH: usize = 64;
const DEFAULT_MAX_OUTPUT_LEN: usize = 1 << 20;

#[derive(Clone)]
pub struct TemplateEngine {
    clock: Arc<dyn Clock>,
    max_depth: usize,
    max_output_len: usize,
}

impl TemplateEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            max_depth: DEFAULT_MAX_DEPTH,
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
        }
    }

    pub fn with_limits(mut self, max_depth: usize, max_output_len: usize) -> Self {
        self.max_depth = max_depth;
        self.max_output_len = max_output_len;
        self
    }

    /// Walks `tree`, rendering any string leaf containing `{{`/`{%` against
    /// `vars`. Non-string leaves pass through unchanged.
    pub fn render(&self, tree: &Value, vars: &Value) -> Result<Value, TemplateError> {
        self.render_at_depth(tree, vars, 0)
    }

    fn render_at_depth(&self, tree: &Value, vars: &Value, depth: usize) -> Result<Value, TemplateError> {
        if depth > self.max_depth {
            return Err(TemplateError::MaxDepthExceeded(self.max_depth));
        }
        match tree {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.render_at_depth(v, vars, depth + 1)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.render_at_depth(item, vars, depth + 1)?);
                }
                Ok(Value::Array(out))
            }
            Value::String(s) => self.render_string(s, vars),
            other => Ok(other.clone()),
        }
    }

    fn render_string(&self, s: &str, vars: &Value) -> Result<Value, TemplateError> {
        if !s.contains("{{") && !s.contains("{%") {
            return Ok(Value::String(s.to_string()));
        }
        check_security(s)?;

        let env = self.build_environment();

        if let Some(expr_src) = standalone_expression(s) {
            let expr = env
                .compile_expression(expr_src)
                .map_err(|e| TemplateError::Render(e.to_string()))?;
            let result = expr
                .eval(minijinja::Value::from_serialize(vars))
                .map_err(|e| TemplateError::Render(e.to_string()))?;
            return serde_json::to_value(result).map_err(|e| TemplateError::Render(e.to_string()));
        }

        let rendered = env
            .render_str(s, vars)
            .map_err(|e| TemplateError::Render(e.to_string()))?;
        if rendered.len() > self.max_output_len {
            return Err(TemplateError::MaxOutputExceeded(self.max_output_len));
        }
        Ok(Value::String(rendered))
    }

    fn build_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.add_filter("len", |v: minijinja::Value| -> u64 { v.len().unwrap_or(0) as u64 });
        env.add_filter("empty", |v: minijinja::Value| -> bool {
            v.is_undefined() || v.is_none() || v.len().map(|l| l == 0).unwrap_or(false)
        });
        env.add_filter("toJson", |v: minijinja::Value| -> String {
            serde_json::to_value(v).map(|j| j.to_string()).unwrap_or_default()
        });
        env.add_filter("toString", |v: minijinja::Value| -> String { v.to_string() });

        let clock = self.clock.clone();
        env.add_filter("now", move |_v: minijinja::Value| -> String { clock.now().to_rfc3339() });
        env
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// Returns the inner expression source if `s` is *exactly* one `{{ .. }}`
/// expression (no surrounding text, no nested braces, no `{%` blocks) — the
/// case where the original JSON type must be preserved rather than
/// stringified.
fn standalone_expression(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.contains("{%") {
        return None;
    }
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> TemplateEngine {
        TemplateEngine::default()
    }

    #[test]
    fn non_template_strings_pass_through_unchanged() {
        let out = engine().render(&json!("plain text"), &json!({})).unwrap();
        assert_eq!(out, json!("plain text"));
    }

    #[test]
    fn standalone_expression_preserves_type() {
        let vars = json!({"workflow": {"input": {"count": 3}}});
        let out = engine()
            .render(&json!("{{ workflow.input.count }}"), &vars)
            .unwrap();
        assert_eq!(out, json!(3));
    }

    #[test]
    fn embedded_expression_is_stringified() {
        let vars = json!({"workflow": {"input": {"message": "Hello"}}});
        let out = engine()
            .render(&json!("say: {{ workflow.input.message }}"), &vars)
            .unwrap();
        assert_eq!(out, json!("say: Hello"));
    }

    #[test]
    fn renders_nested_object_and_array_trees() {
        let vars = json!({"workflow": {"input": {"message": "Hi"}}});
        let tree = json!({
            "a": "{{ workflow.input.message }}",
            "b": ["static", "{{ workflow.input.message }}"],
        });
        let out = engine().render(&tree, &vars).unwrap();
        assert_eq!(out["a"], json!("Hi"));
        assert_eq!(out["b"][1], json!("Hi"));
    }

    #[test]
    fn security_filter_rejects_blocklisted_identifiers() {
        let err = engine().render(&json!("{{ exec(cmd) }}"), &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Security(_)));
    }

    #[test]
    fn len_and_empty_filters_work_on_collections() {
        let vars = json!({"items": [1, 2, 3]});
        let out = engine().render(&json!("{{ items | len }}"), &vars).unwrap();
        assert_eq!(out, json!(3));

        let out = engine().render(&json!("{{ items | empty }}"), &vars).unwrap();
        assert_eq!(out, json!(false));
    }

    #[test]
    fn now_filter_reads_from_injected_clock_not_wall_clock() {
        use crate::clock::FixedClock;
        use chrono::{TimeZone, Utc};

        let fixed = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let engine = TemplateEngine::new(Arc::new(FixedClock(fixed)));
        let out = engine.render(&json!("{{ \"\" | now }}"), &json!({})).unwrap();
        assert_eq!(out, json!(fixed.to_rfc3339()));
    }
}
