use simfit_core::ConfigError;
use thiserror::Error;

use crate::EvalError;

use super::ExitStatus;

/// A fatal error raised by the residual function.
///
/// Solvers must pass it through unchanged as [`SolverError::Objective`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ObjectiveError(#[from] pub EvalError);

/// Errors a [`LeastSquaresSolver`](super::LeastSquaresSolver) may return.
#[derive(Debug, Error)]
pub enum SolverError {
    /// A numerical failure, typically caused by non-finite residuals.
    #[error("linear algebra failure: {0}")]
    LinearAlgebra(String),

    #[error(transparent)]
    Objective(#[from] ObjectiveError),
}

/// Errors that can occur when running the least-squares driver.
#[derive(Debug, Error)]
pub enum Error {
    #[error("solver exited with {status:?}: {message}")]
    SolverFailed { status: ExitStatus, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Objective(#[from] ObjectiveError),
}
