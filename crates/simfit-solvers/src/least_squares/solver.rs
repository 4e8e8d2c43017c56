use nalgebra::DVector;

use super::{Bounds, ObjectiveError, Report, Settings, SolverError};

/// A bound-constrained, derivative-free least-squares solver.
///
/// Implementations minimize `‖residuals(x)‖²` for `x` inside `bounds`,
/// starting from `start`. Residuals may contain NaN. A solver that cannot
/// proceed because of them should return [`SolverError::LinearAlgebra`]
/// rather than a failed [`Report`], and must propagate residual errors as
/// [`SolverError::Objective`].
pub trait LeastSquaresSolver {
    /// Runs the solver to completion.
    ///
    /// # Errors
    ///
    /// See the trait documentation.
    fn solve<F>(
        &mut self,
        residuals: F,
        start: &[f64],
        bounds: &Bounds,
        settings: &Settings,
    ) -> Result<Report, SolverError>
    where
        F: FnMut(&[f64]) -> Result<DVector<f64>, ObjectiveError>;
}
