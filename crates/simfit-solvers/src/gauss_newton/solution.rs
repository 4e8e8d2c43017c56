use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use simfit_core::ParameterVector;

/// Indicates why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    /// The last iteration improved the cost by less than the threshold.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The record of one Gauss-Newton iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Iteration {
    /// One-based iteration number.
    pub iteration: usize,

    /// Parameters the iteration started from.
    pub params: Vec<f64>,

    /// Cost at `params`.
    pub cost: f64,

    /// The full Gauss-Newton step.
    pub step: DVector<f64>,

    /// Step lengths tried in the line search.
    pub alphas: Vec<f64>,

    /// Cost at each line-search point, in `alphas` order.
    pub line_costs: Vec<f64>,

    /// The step length taken, or `None` if no trial improved on `cost`.
    pub accepted_alpha: Option<f64>,

    /// `JᵀJ` at `params`.
    pub hessian: DMatrix<f64>,
}

/// The result of a Gauss-Newton solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub status: Status,

    /// Best parameters found.
    pub optimum: ParameterVector,

    /// Cost at the optimum.
    pub cost: f64,

    /// Transformed observations × parameters, from the last iteration.
    pub jacobian: DMatrix<f64>,

    /// `JᵀJ` from the last iteration.
    pub hessian: DMatrix<f64>,

    /// Internal-variability covariance in the transformed basis.
    pub internal_covariance: DMatrix<f64>,

    /// Per-iteration history.
    pub iterations: Vec<Iteration>,

    /// Iteration count when the solver finished.
    pub iters: usize,
}
