//! The evaluation engine: parameter batches in, observation tables out.
//!
//! # Algorithm
//!
//! For each row of the parameter matrix, in order:
//!
//! 1. Every ensemble member `0..ensemble_size` is resolved through the cache.
//! 2. Completed members contribute their observations, reindexed to the
//!    configured order, and are appended to the audit log as raw values.
//!    Anything else contributes an all-NaN vector; a miss also registers the
//!    member as new work.
//! 3. Members are averaged per observation. A NaN in any member makes that
//!    observation NaN for the whole row: every member must succeed.
//! 4. The [`Pipeline`] is applied in fixed order: scale, residual,
//!    transform, sum of squares.
//!
//! With [`OnMissing::Pending`], any NaN left after processing turns the whole
//! result into [`Outcome::Pending`](simfit_core::Outcome::Pending).

mod engine;
mod error;
mod pipeline;
mod transform;

pub use engine::{AuditEntry, Engine, Evaluation, OnMissing};
pub use error::EvalError;
pub use pipeline::Pipeline;
pub use transform::{Transform, TransformError};
