//! Bound-constrained, derivative-free least squares over the engine.
//!
//! # Algorithm
//!
//! The engine is wrapped as a residual function: scale (optional), subtract
//! targets, project through the transform (optional). Residuals use
//! [`OnMissing::Nan`](crate::OnMissing::Nan), so a missing simulation shows
//! up to the solver as NaN while the cache quietly registers it.
//!
//! A [`LeastSquaresSolver`] then drives the residual function inside the
//! parameter bounds. Any solver can be plugged in; [`TrustRegion`] is the
//! built-in one.
//!
//! # Retry semantics
//!
//! NaN residuals eventually break the solver's linear algebra. That failure,
//! [`SolverError::LinearAlgebra`], is not fatal: the driver returns
//! [`Outcome::Pending`] with every run the solver touched but could not
//! read, and the caller restarts the whole solve once those runs complete.
//! With a fixed seed the solver replays its earlier path from the cache and
//! gets further each time.
//!
//! An accepted exit ([`ExitStatus::Success`] or
//! [`ExitStatus::MaxFunWarning`]) that still relied on missing data is
//! treated the same way. Any other exit is fatal.

mod bounds;
mod error;
mod report;
mod settings;
mod solution;
mod solver;
mod trust_region;


pub use bounds::{Bounds, BoundsError};
pub use error::{Error, ObjectiveError, SolverError};
pub use report::{Diagnostic, ExitStatus, Report};
pub use settings::{Settings, SettingsError};
pub use solution::Solution;
pub use solver::LeastSquaresSolver;
pub use trust_region::TrustRegion;

use nalgebra::{DMatrix, DVector};
use simfit_core::{ConfigError, ModelCache, Outcome, PendingRuns};
use tracing::{info, instrument, warn};

use crate::{Engine, Pipeline, Transform};

/// Minimizes the sum of squared residuals starting from `start`.
///
/// # Errors
///
/// Returns an error if `start` has the wrong length, if evaluation fails
/// fatally, or if the solver exits with a status other than success or
/// the evaluation-budget warning.
#[instrument(skip_all, fields(params = start.len()))]
pub fn solve<C, S>(
    engine: &mut Engine<'_, C>,
    solver: &mut S,
    start: &[f64],
    transform: Option<&Transform>,
    scale: bool,
    settings: &Settings,
) -> Result<Outcome<Solution>, Error>
where
    C: ModelCache,
    S: LeastSquaresSolver,
{
    let config = engine.config();
    if start.len() != config.n_params() {
        return Err(ConfigError::Shape {
            expected: config.n_params(),
            received: start.len(),
        }
        .into());
    }
    let bounds = Bounds::from_config(config);

    let mut pipeline = Pipeline::new().scaled_if(scale).residual();
    if let Some(transform) = transform {
        pipeline = pipeline.transformed(transform.clone());
    }

    let mut unresolved = PendingRuns::new();
    let result = {
        let unresolved = &mut unresolved;
        let pipeline = &pipeline;
        let residuals = |x: &[f64]| -> Result<DVector<f64>, ObjectiveError> {
            let params = DMatrix::from_row_slice(1, x.len(), x);
            let evaluation = engine.assemble(&params, pipeline)?;
            unresolved.extend(evaluation.unresolved().clone());
            Ok(evaluation.row(0))
        };
        solver.solve(residuals, start, &bounds, settings)
    };

    let report = match result {
        Ok(report) => report,
        Err(SolverError::LinearAlgebra(message)) => {
            warn!(%message, pending = unresolved.len(), "solver failed on missing data");
            return Ok(Outcome::Pending(unresolved));
        }
        Err(SolverError::Objective(error)) => return Err(error.into()),
    };

    if !report.status.is_accepted() {
        return Err(Error::SolverFailed {
            status: report.status,
            message: report.message,
        });
    }
    if !unresolved.is_empty() || report.residuals.iter().any(|r| r.is_nan()) {
        warn!(
            pending = unresolved.len(),
            "solver finished on incomplete data"
        );
        return Ok(Outcome::Pending(unresolved));
    }

    let hessian = report.jacobian.as_ref().map(|j| j.transpose() * j);
    let cost = report.residuals.norm_squared();
    info!(
        status = ?report.status,
        evaluations = report.evaluations,
        cost,
        "least squares finished"
    );

    Ok(Outcome::Ready(Solution {
        status: report.status,
        message: report.message,
        optimum: config.parameter_vector(report.x.as_slice())?,
        residuals: report.residuals,
        cost,
        jacobian: report.jacobian,
        hessian,
        evaluations: report.evaluations,
        diagnostics: report.diagnostics,
    }))
}
