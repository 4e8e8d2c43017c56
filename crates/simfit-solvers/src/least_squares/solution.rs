use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use simfit_core::ParameterVector;

use super::{Diagnostic, ExitStatus};

/// The result of a least-squares solve on complete data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub status: ExitStatus,
    pub message: String,

    /// Best parameters found.
    pub optimum: ParameterVector,

    /// Processed residuals at the optimum.
    pub residuals: DVector<f64>,

    /// Sum of squared residuals at the optimum.
    pub cost: f64,

    /// Residuals × parameters, when the solver reports one.
    pub jacobian: Option<DMatrix<f64>>,

    /// `JᵀJ`, parameters × parameters.
    pub hessian: Option<DMatrix<f64>>,

    pub evaluations: usize,
    pub diagnostics: Vec<Diagnostic>,
}
