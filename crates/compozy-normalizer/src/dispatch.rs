//! One `Normalizer` per `ExecutionType`, dispatched by exhaustive match.

use compozy_context::{ContextBuilder, ItemBinding};
use compozy_core::task_config::{
    AggregateConfig, BasicConfig, CollectionConfig, CompositeConfig, ParallelConfig, RouterConfig, TaskConfig,
    WaitSignalConfig,
};
use tracing::instrument;

use crate::context::NormalizationContext;
use crate::error::NormalizeError;
use crate::helpers::{inherit_cwd_and_file_path, render_base_fields};

pub trait Normalizer {
    fn normalize(&self, cfg: TaskConfig, ctx: &NormalizationContext) -> Result<TaskConfig, NormalizeError>;
}

/// Entry point: dispatches on the `TaskConfig` variant. The match is
/// exhaustive, so adding a new `ExecutionType` without a normalizer fails
/// to compile rather than silently falling through.
#[instrument(skip_all, fields(task_id = %cfg.id()))]
pub fn normalize_task(cfg: TaskConfig, ctx: &NormalizationContext) -> Result<TaskConfig, NormalizeError> {
    match cfg {
        TaskConfig::Basic(c) => normalize_basic(c, ctx).map(TaskConfig::Basic),
        TaskConfig::Router(c) => normalize_router(c, ctx).map(TaskConfig::Router),
        TaskConfig::Parallel(c) => normalize_parallel(c, ctx).map(TaskConfig::Parallel),
        TaskConfig::Collection(c) => normalize_collection(c, ctx).map(TaskConfig::Collection),
        TaskConfig::Composite(c) => normalize_composite(c, ctx).map(TaskConfig::Composite),
        TaskConfig::Aggregate(c) => normalize_aggregate(c, ctx).map(TaskConfig::Aggregate),
        TaskConfig::Wait(c) => normalize_wait_signal(c, ctx).map(TaskConfig::Wait),
        TaskConfig::Signal(c) => normalize_wait_signal(c, ctx).map(TaskConfig::Signal),
    }
}

fn normalize_basic(mut cfg: BasicConfig, ctx: &NormalizationContext) -> Result<BasicConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;
    if !cfg.action.is_empty() {
        if let serde_json::Value::String(rendered) = ctx.engine.render(&serde_json::Value::String(cfg.action.clone()), &ctx.vars)? {
            cfg.action = rendered;
        }
    }
    if cfg.action.is_empty() {
        return Err(NormalizeError::Validation("basic task requires a non-empty action".into()));
    }
    Ok(cfg)
}

fn normalize_router(mut cfg: RouterConfig, ctx: &NormalizationContext) -> Result<RouterConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;

    if cfg.routes.is_empty() {
        return Err(NormalizeError::Validation("router task requires at least one route".into()));
    }

    // Evaluate Condition to a scalar; an unresolved/missing route is not a
    // normalizer error (§4.5: "absence is an error surfaced by the Response
    // Handler, not here") — we only resolve the value here.
    let rendered = ctx
        .engine
        .render(&serde_json::Value::String(cfg.condition.clone()), &ctx.vars)?;
    cfg.condition = scalar_to_route_key(&rendered);
    Ok(cfg)
}

fn scalar_to_route_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize_parallel(mut cfg: ParallelConfig, ctx: &NormalizationContext) -> Result<ParallelConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;

    let parent_base = cfg.base.clone();
    let child_ctx = NormalizationContext {
        vars: ctx.vars.clone(),
        engine: ctx.engine,
        max_collection_items: ctx.max_collection_items,
        parent_base: Some(&parent_base),
    };
    let mut children = Vec::with_capacity(cfg.tasks.len());
    for child in cfg.tasks {
        children.push(normalize_task(child, &child_ctx)?);
    }
    cfg.tasks = children;
    Ok(cfg)
}

fn normalize_composite(mut cfg: CompositeConfig, ctx: &NormalizationContext) -> Result<CompositeConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;

    let parent_base = cfg.base.clone();
    let child_ctx = NormalizationContext {
        vars: ctx.vars.clone(),
        engine: ctx.engine,
        max_collection_items: ctx.max_collection_items,
        parent_base: Some(&parent_base),
    };
    let mut children = Vec::with_capacity(cfg.tasks.len());
    for child in cfg.tasks {
        children.push(normalize_task(child, &child_ctx)?);
    }
    cfg.tasks = children;
    Ok(cfg)
}

fn normalize_aggregate(mut cfg: AggregateConfig, ctx: &NormalizationContext) -> Result<AggregateConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;
    // `cfg.outputs` references `.tasks.<id>.output` of children that have
    // not completed yet at normalization time — left untouched here and
    // rendered by the Response Handler once every child is terminal.
    Ok(cfg)
}

fn normalize_wait_signal(mut cfg: WaitSignalConfig, ctx: &NormalizationContext) -> Result<WaitSignalConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;
    if cfg.signal_name.is_empty() {
        return Err(NormalizeError::Validation("wait/signal task requires a signal_name".into()));
    }
    Ok(cfg)
}

/// Result of evaluating a `collection` task's `Items`/`Filter` fields.
pub struct CollectionEvaluation {
    pub total_count: usize,
    pub filtered_count: usize,
    pub materialized: Vec<TaskConfig>,
}

fn normalize_collection(mut cfg: CollectionConfig, ctx: &NormalizationContext) -> Result<CollectionConfig, NormalizeError> {
    inherit_cwd_and_file_path(&mut cfg.base, ctx.parent_base);
    render_base_fields(&mut cfg.base, ctx.engine, &ctx.vars)?;

    let evaluation = evaluate_collection(&cfg, ctx)?;
    if evaluation.total_count > ctx.max_collection_items {
        return Err(NormalizeError::CollectionTooLarge {
            actual: evaluation.total_count,
            limit: ctx.max_collection_items,
        });
    }

    // The per-item materialized tasks are exposed to callers (the engine)
    // through `evaluate_collection`; the `task` template field itself stays
    // as the un-materialized prototype so `normalize_collection` remains
    // idempotent under replay.
    let _ = evaluation;
    Ok(cfg)
}

/// Evaluates `Items` to an array, applies `Filter` per element with
/// `item`/`index` bound, and re-normalizes the `Task` template once per
/// surviving element so nested templates resolve with the correct `item`.
pub fn evaluate_collection(
    cfg: &CollectionConfig,
    ctx: &NormalizationContext,
) -> Result<CollectionEvaluation, NormalizeError> {
    let items_value = ctx
        .engine
        .render(&serde_json::Value::String(cfg.items.clone()), &ctx.vars)?;
    let items = items_value
        .as_array()
        .cloned()
        .ok_or_else(|| NormalizeError::Validation("collection Items must evaluate to an array".into()))?;
    let total_count = items.len();

    let mut materialized = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let item_vars = ContextBuilder::new()
            .with_item(ItemBinding {
                item_var: &cfg.item_var,
                index_var: &cfg.index_var,
                item: item.clone(),
                index,
            })
            .build(&empty_workflow_state_placeholder(&ctx.vars));

        let merged_vars = merge_vars(&ctx.vars, &item_vars);

        let keep = match &cfg.filter {
            Some(filter_expr) => {
                let rendered = ctx
                    .engine
                    .render(&serde_json::Value::String(filter_expr.clone()), &merged_vars)?;
                is_truthy(&rendered)
            }
            None => true,
        };
        if !keep {
            continue;
        }

        let item_ctx = NormalizationContext {
            vars: merged_vars,
            engine: ctx.engine,
            max_collection_items: ctx.max_collection_items,
            parent_base: Some(&cfg.base),
        };
        materialized.push(normalize_task((*cfg.task).clone(), &item_ctx)?);
    }

    Ok(CollectionEvaluation {
        total_count,
        filtered_count: materialized.len(),
        materialized,
    })
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Null => false,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

fn merge_vars(base: &serde_json::Value, overlay: &serde_json::Value) -> serde_json::Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(overlay_obj) = overlay.as_object() {
        for (k, v) in overlay_obj {
            merged.insert(k.clone(), v.clone());
        }
    }
    serde_json::Value::Object(merged)
}

// `ContextBuilder::build` takes a `WorkflowState` purely to source
// `{workflow, tasks, env}`; item/index evaluation here only needs the
// `{item, index}` slice of its output, so we build against an empty
// placeholder state and merge just those two keys in.
fn empty_workflow_state_placeholder(_vars: &serde_json::Value) -> compozy_core::state::WorkflowState {
    compozy_core::state::WorkflowState::new(
        compozy_core::ids::WorkflowId::from(""),
        serde_json::Value::Null,
        None,
    )
}
