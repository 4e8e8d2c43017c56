use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// How a solver finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitStatus {
    /// Converged: the trust radius reached `rho_end`.
    Success,

    /// The evaluation budget ran out first.
    MaxFunWarning,

    /// Any other exit, with the solver's own code.
    Failed { code: i32 },
}

impl ExitStatus {
    /// Whether the driver accepts a result with this status.
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Success | Self::MaxFunWarning)
    }
}

/// One row of a solver's progress trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Residual evaluations so far.
    pub evaluations: usize,

    /// Sum of squared residuals at the current iterate.
    pub cost: f64,

    /// Trust-region radius.
    pub radius: f64,

    /// Actual over predicted reduction for the last step.
    pub ratio: f64,
}

/// What a solver returns when it finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub status: ExitStatus,
    pub message: String,

    /// Best point found.
    pub x: DVector<f64>,

    /// Residuals at `x`.
    pub residuals: DVector<f64>,

    /// Jacobian estimate at `x`, residuals × parameters, if the solver has one.
    pub jacobian: Option<DMatrix<f64>>,

    pub evaluations: usize,
    pub diagnostics: Vec<Diagnostic>,
}
