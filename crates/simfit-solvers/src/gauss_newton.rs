//! Gauss-Newton with a batched line search.
//!
//! # Algorithm
//!
//! The solver works on transformed, optionally scaled residuals. The
//! transform is expected to whiten the observation error covariance, so the
//! error covariance in the transformed basis is the identity and the cost of
//! a point is `‖r‖² / N` for `N` transformed observations.
//!
//! Each iteration:
//!
//! 1. Computes a finite-difference [`jacobian`](crate::jacobian) at the
//!    current point in one batch of `n + 1` runs.
//! 2. Solves `JᵀJ · s = −Jᵀr` for the Gauss-Newton step `s`.
//! 3. Evaluates `x + α·s` for every configured `α` in a second batch,
//!    clamping each trial to the parameter ranges, and moves to the best
//!    trial if it improves on the current cost.
//!
//! The internal-variability covariance `C_iv` is projected into the
//! transformed basis as `T · C_iv · Tᵀ`. The solver converges once an
//! iteration improves the cost by less than
//! `tolerance × tr(T · C_iv · Tᵀ) / N`, the cost expected from internal
//! variability alone.
//!
//! # Retry semantics
//!
//! Whenever a batch is incomplete the solver returns
//! [`Outcome::Pending`] and keeps nothing from the iteration in progress.
//! Calling it again with the same arguments replays the completed
//! iterations from the cache and resumes where it stopped.
//!
//! # Observer Events
//!
//! The solver emits one [`Event`] per completed iteration. Observers can
//! return [`Action::StopEarly`] to halt after that iteration.

mod action;
mod config;
mod error;
mod event;
mod solution;

#[cfg(test)]
mod tests;

pub use action::Action;
pub use config::{Config, ConfigError};
pub use error::Error;
pub use event::Event;
pub use solution::{Iteration, Solution, Status};

use nalgebra::{DMatrix, DVector};
use simfit_core::{ModelCache, Observer, Outcome, StudyConfig, ready};
use tracing::{info, instrument};

use crate::{Engine, EvalError, OnMissing, Pipeline, Transform, jacobian};

/// Minimizes the transformed residual cost starting from `start`.
///
/// `internal_covariance` is the internal-variability covariance of the
/// observations, in configured observation order and in the same units the
/// pipeline produces (scaled when `scale` is set).
///
/// # Errors
///
/// Returns an error if the covariance or transform do not match the
/// observations, if `start` is invalid or a Jacobian probe leaves the
/// parameter ranges, if the Hessian is singular, or if evaluation fails.
#[instrument(skip_all, fields(params = start.len()))]
pub fn solve<C, Obs>(
    engine: &mut Engine<'_, C>,
    start: &[f64],
    transform: &Transform,
    internal_covariance: &DMatrix<f64>,
    scale: bool,
    config: &Config,
    mut observer: Obs,
) -> Result<Outcome<Solution>, Error>
where
    C: ModelCache,
    Obs: for<'a> Observer<Event<'a>, Action>,
{
    let study = engine.config();
    study.parameter_vector(start)?;
    check_shapes(study, transform, internal_covariance)?;
    let internal_covariance = transform.project_covariance(internal_covariance);
    let n_obs = transform.n_rows() as f64;
    let threshold = config.tolerance() * internal_covariance.trace() / n_obs;

    let pipeline = Pipeline::new()
        .scaled_if(scale)
        .residual()
        .transformed(transform.clone());
    let cost_of = |r: &DVector<f64>| r.norm_squared() / n_obs;

    let mut x = start.to_vec();
    let mut iterations = Vec::new();

    let (status, jacobian, hessian, cost) = loop {
        let iteration = iterations.len() + 1;

        let jac = ready!(jacobian::run(engine, &x, &pipeline)?);
        let cost = cost_of(&jac.base_values);

        let gradient = jac.jacobian.transpose() * &jac.base_values;
        let step = jac
            .hessian
            .clone()
            .lu()
            .solve(&(-gradient))
            .ok_or(Error::SingularHessian { iteration })?;

        let trials = line_search_batch(study, &x, &step, config.alphas());
        let evaluation = ready!(engine.evaluate(&trials, &pipeline, OnMissing::Pending)?);
        let line_costs: Vec<f64> = (0..trials.nrows())
            .map(|i| cost_of(&evaluation.row(i)))
            .collect();

        let best = line_costs
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .filter(|&(_, c)| c < cost);

        let record = Iteration {
            iteration,
            params: x.clone(),
            cost,
            step,
            alphas: config.alphas().to_vec(),
            line_costs,
            accepted_alpha: best.map(|(i, _)| config.alphas()[i]),
            hessian: jac.hessian.clone(),
        };
        let best_cost = match best {
            Some((i, c)) => {
                x = trials.row(i).iter().copied().collect();
                c
            }
            None => cost,
        };
        let improvement = cost - best_cost;
        info!(
            iteration,
            cost = best_cost,
            improvement,
            alpha = ?record.accepted_alpha,
            "iteration complete"
        );

        let event = Event {
            iteration: &record,
            best: &x,
            best_cost,
            threshold,
        };
        let action = observer.observe(&event);
        iterations.push(record);

        let status = if action == Some(Action::StopEarly) {
            Some(Status::StoppedByObserver)
        } else if improvement < threshold {
            Some(Status::Converged)
        } else if iteration >= config.max_iters() {
            Some(Status::MaxIters)
        } else {
            None
        };
        if let Some(status) = status {
            break (status, jac.jacobian, jac.hessian, best_cost);
        }
    };

    info!(?status, iters = iterations.len(), cost, "gauss-newton finished");

    Ok(Outcome::Ready(Solution {
        status,
        optimum: study.parameter_vector(&x)?,
        cost,
        jacobian,
        hessian,
        internal_covariance,
        iters: iterations.len(),
        iterations,
    }))
}

/// Minimizes the transformed residual cost without observer support.
///
/// This is a convenience wrapper around [`solve`] that uses a no-op observer.
///
/// # Errors
///
/// See [`solve`].
pub fn solve_unobserved<C: ModelCache>(
    engine: &mut Engine<'_, C>,
    start: &[f64],
    transform: &Transform,
    internal_covariance: &DMatrix<f64>,
    scale: bool,
    config: &Config,
) -> Result<Outcome<Solution>, Error> {
    solve(
        engine,
        start,
        transform,
        internal_covariance,
        scale,
        config,
        (),
    )
}

/// Checks the transform and covariance against the configured observations.
fn check_shapes(
    study: &StudyConfig,
    transform: &Transform,
    internal_covariance: &DMatrix<f64>,
) -> Result<(), Error> {
    let n_obs = study.n_obs();
    if internal_covariance.shape() != (n_obs, n_obs) {
        return Err(Error::Covariance {
            expected: n_obs,
            received: internal_covariance.shape(),
        });
    }
    if transform.n_rows() == 0 {
        return Err(EvalError::EmptyTransform.into());
    }
    if transform.n_cols() != n_obs {
        return Err(EvalError::TransformShape {
            expected: n_obs,
            received: transform.n_cols(),
        }
        .into());
    }
    Ok(())
}

/// One row per step length: `x + α·step`, clamped to the parameter ranges.
fn line_search_batch(
    study: &StudyConfig,
    x: &[f64],
    step: &DVector<f64>,
    alphas: &[f64],
) -> DMatrix<f64> {
    let specs = study.parameters();
    DMatrix::from_fn(alphas.len(), x.len(), |row, col| {
        (x[col] + alphas[row] * step[col]).clamp(specs[col].min, specs[col].max)
    })
}
