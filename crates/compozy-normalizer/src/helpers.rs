//! Inheritance and template-resolution steps shared by every task type,
//! mirroring the "apply a shared composition step over every variant" shape
//! of `everruns-core`'s capability-application pipeline.

use compozy_core::task_config::BaseConfig;
use compozy_template::TemplateEngine;
use serde_json::Value;

use crate::error::NormalizeError;

/// Rule 1: if `cwd`/`file_path` is empty on the child, copy it from the
/// parent config. Explicit values are never overwritten. Applies top-down,
/// so it composes across arbitrary nesting depth as long as every level
/// calls this before normalizing its own children.
pub fn inherit_cwd_and_file_path(base: &mut BaseConfig, parent: Option<&BaseConfig>) {
    let Some(parent) = parent else { return };
    if base.cwd.is_none() {
        base.cwd = parent.cwd.clone();
    }
    if base.file_path.is_none() {
        base.file_path = parent.file_path.clone();
    }
}

/// Rule 2 (the `With` portion): renders `base.with` against `vars`. Output
/// transformations are rendered later by the Response Handler, once the raw
/// activity output is available to bind as `output` in the context.
pub fn render_base_fields(
    base: &mut BaseConfig,
    engine: &TemplateEngine,
    vars: &Value,
) -> Result<(), NormalizeError> {
    base.with = engine.render(&base.with, vars)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cwd_is_never_overwritten() {
        let parent = BaseConfig {
            cwd: Some("/parent".into()),
            ..Default::default()
        };
        let mut child = BaseConfig {
            cwd: Some("/child".into()),
            ..Default::default()
        };
        inherit_cwd_and_file_path(&mut child, Some(&parent));
        assert_eq!(child.cwd.as_deref(), Some("/child"));
    }

    #[test]
    fn empty_cwd_inherits_from_parent() {
        let parent = BaseConfig {
            cwd: Some("/parent".into()),
            file_path: Some("parent.yaml".into()),
            ..Default::default()
        };
        let mut child = BaseConfig::default();
        inherit_cwd_and_file_path(&mut child, Some(&parent));
        assert_eq!(child.cwd.as_deref(), Some("/parent"));
        assert_eq!(child.file_path.as_deref(), Some("parent.yaml"));
    }

    #[test]
    fn no_parent_leaves_config_untouched() {
        let mut child = BaseConfig::default();
        inherit_cwd_and_file_path(&mut child, None);
        assert!(child.cwd.is_none());
    }
}
