//! Per-`ExecutionType` task normalization: inheritance, template resolution,
//! and validation.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod helpers;

pub use context::NormalizationContext;
pub use dispatch::{evaluate_collection, normalize_task, CollectionEvaluation, Normalizer};
pub use error::NormalizeError;
