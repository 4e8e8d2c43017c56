use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::{
    Bounds, Diagnostic, ExitStatus, LeastSquaresSolver, ObjectiveError, Report, Settings,
    SolverError,
};

const SHRINK_BELOW: f64 = 0.25;
const GROW_ABOVE: f64 = 0.75;

/// Forward-difference probes are this fraction of the trust radius.
const PROBE_FRACTION: f64 = 0.1;

const SVD_EPS: f64 = 1e-12;
const INPUT_ERROR: i32 = -1;

/// A derivative-free trust-region solver.
///
/// Each iteration builds a linear model of the residuals from one forward
/// difference per parameter, takes the least-squares step of that model
/// (holding parameters that are pushing against a bound), truncates it to
/// the trust radius and projects it onto the bounds, then grows
/// or shrinks the radius by how well the model predicted the actual
/// reduction. The solver converges once the radius drops below
/// [`Settings::rho_end`].
///
/// It is deterministic, so [`Settings::seed`] is unused. Non-finite
/// residuals stop it with [`SolverError::LinearAlgebra`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustRegion;

impl LeastSquaresSolver for TrustRegion {
    fn solve<F>(
        &mut self,
        residuals: F,
        start: &[f64],
        bounds: &Bounds,
        settings: &Settings,
    ) -> Result<Report, SolverError>
    where
        F: FnMut(&[f64]) -> Result<DVector<f64>, ObjectiveError>,
    {
        let n = bounds.len();
        if start.len() != n {
            return Ok(Report {
                status: ExitStatus::Failed { code: INPUT_ERROR },
                message: format!("start has {} values for {n} bounds", start.len()),
                x: DVector::from_column_slice(start),
                residuals: DVector::zeros(0),
                jacobian: None,
                evaluations: 0,
                diagnostics: Vec::new(),
            });
        }

        let mut f = Counted {
            residuals,
            count: 0,
        };
        let mut x = bounds.clamp(&DVector::from_column_slice(start));
        let mut r = f.call(&x)?;
        let mut radius = settings.rho_begin();
        let max_radius = (bounds.upper() - bounds.lower())
            .norm()
            .max(settings.rho_begin());
        let mut jacobian = None;
        let mut diagnostics = Vec::new();

        let (status, message) = loop {
            if radius < settings.rho_end() {
                break (ExitStatus::Success, "trust radius reached rho_end");
            }
            if f.count + n + 1 > settings.max_evaluations() {
                break (ExitStatus::MaxFunWarning, "evaluation budget exhausted");
            }

            let j = forward_jacobian(&mut f, &x, &r, bounds, PROBE_FRACTION * radius)?;
            let step = model_step(&j, &r, &x, bounds)?;
            let norm = step.norm();
            let step = if norm > radius {
                step * (radius / norm)
            } else {
                step
            };

            let trial = bounds.clamp(&(&x + step));
            let step = &trial - &x;
            let cost = r.norm_squared();
            let predicted = cost - (&r + &j * &step).norm_squared();
            jacobian = Some(j);

            let ratio = if step.norm() > 0.0 && predicted > 0.0 {
                let trial_residuals = f.call(&trial)?;
                let ratio = (cost - trial_residuals.norm_squared()) / predicted;
                if ratio > 0.0 {
                    x = trial;
                    r = trial_residuals;
                }
                ratio
            } else {
                0.0
            };

            if ratio < SHRINK_BELOW {
                radius *= 0.5;
            } else if ratio > GROW_ABOVE && step.norm() >= 0.99 * radius {
                radius = (2.0 * radius).min(max_radius);
            }

            debug!(
                evaluations = f.count,
                cost = r.norm_squared(),
                radius,
                ratio,
                "trust region step"
            );
            diagnostics.push(Diagnostic {
                evaluations: f.count,
                cost: r.norm_squared(),
                radius,
                ratio,
            });
        };

        Ok(Report {
            status,
            message: message.to_owned(),
            x,
            residuals: r,
            jacobian,
            evaluations: f.count,
            diagnostics,
        })
    }
}

/// A residual function that counts calls and rejects non-finite output.
struct Counted<F> {
    residuals: F,
    count: usize,
}

impl<F> Counted<F>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, ObjectiveError>,
{
    fn call(&mut self, x: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        self.count += 1;
        let r = (self.residuals)(x.as_slice())?;
        if r.iter().all(|v| v.is_finite()) {
            Ok(r)
        } else {
            Err(SolverError::LinearAlgebra(format!(
                "non-finite residuals at evaluation {}",
                self.count
            )))
        }
    }
}

/// The least-squares step of the linear model `r + J·s`.
///
/// Parameters sitting on a bound that the step would push through are
/// frozen and the model is re-solved for the rest.
fn model_step(
    j: &DMatrix<f64>,
    r: &DVector<f64>,
    x: &DVector<f64>,
    bounds: &Bounds,
) -> Result<DVector<f64>, SolverError> {
    let mut frozen = vec![false; x.len()];
    loop {
        let mut model = j.clone();
        for i in (0..x.len()).filter(|&i| frozen[i]) {
            model.column_mut(i).fill(0.0);
        }
        let step = model
            .svd(true, true)
            .solve(&(-r), SVD_EPS)
            .map_err(|e| SolverError::LinearAlgebra(e.to_owned()))?;

        let blocked: Vec<usize> = (0..x.len())
            .filter(|&i| {
                !frozen[i]
                    && ((step[i] > 0.0 && x[i] >= bounds.upper()[i])
                        || (step[i] < 0.0 && x[i] <= bounds.lower()[i]))
            })
            .collect();
        if blocked.is_empty() {
            return Ok(step);
        }
        for i in blocked {
            frozen[i] = true;
        }
    }
}

/// Forward differences of `r` at `x`, stepping inwards at upper bounds.
fn forward_jacobian<F>(
    f: &mut Counted<F>,
    x: &DVector<f64>,
    r: &DVector<f64>,
    bounds: &Bounds,
    h: f64,
) -> Result<DMatrix<f64>, SolverError>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, ObjectiveError>,
{
    let mut j = DMatrix::zeros(r.len(), x.len());
    for i in 0..x.len() {
        let mut probe = x.clone();
        probe[i] += if x[i] + h <= bounds.upper()[i] { h } else { -h };
        let probe = bounds.clamp(&probe);
        let delta = probe[i] - x[i];
        if delta == 0.0 {
            // Fixed parameter: no information.
            continue;
        }

        let rp = f.call(&probe)?;
        if rp.len() != r.len() {
            return Err(SolverError::LinearAlgebra(format!(
                "residual length changed from {} to {}",
                r.len(),
                rp.len()
            )));
        }
        j.set_column(i, &((rp - r) / delta));
    }
    Ok(j)
}
