//! Evaluation engine and optimization drivers for cached simulations.
//!
//! The [`Engine`](evaluate::Engine) turns a batch of parameter vectors into a
//! table of (processed) observations by resolving every ensemble member
//! through a [`ModelCache`]. When a required simulation is missing, the cache
//! registers it and the engine reports [`Outcome::Pending`] instead of a
//! silently partial result.
//!
//! Drivers consume the engine as their objective function:
//!
//! - [`jacobian`]: one-sided finite-difference Jacobian in a single batch
//! - [`least_squares`]: bound-constrained, derivative-free least squares
//!   through a pluggable solver
//! - [`gauss_newton`]: Gauss-Newton with a batched line search in a
//!   whitened observation space
//! - [`optimized`]: evaluates the best known parameters
//!
//! No driver waits for simulations. Each returns either a finished solution
//! or [`Outcome::Pending`], after which the caller runs the pending
//! simulations and calls the driver again from the start. Because resolved
//! points are cached, repeated calls replay completed work for free.
//!
//! [`ModelCache`]: simfit_core::ModelCache
//! [`Outcome::Pending`]: simfit_core::Outcome::Pending

pub mod evaluate;
pub mod gauss_newton;
pub mod jacobian;
pub mod least_squares;
pub mod optimized;

pub use evaluate::{
    AuditEntry, Engine, EvalError, Evaluation, OnMissing, Pipeline, Transform, TransformError,
};
