//! One-sided finite-difference Jacobian in a single batch.
//!
//! Each parameter is perturbed by its configured step, towards the middle of
//! its valid range so probe points stay in the domain. The base point and
//! all perturbed points are evaluated in one engine call, so every
//! simulation the Jacobian needs is registered at once.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use simfit_core::{ConfigError, ModelCache, Outcome, ParamSpec, StudyConfig, ready};
use thiserror::Error;
use tracing::{info, instrument};

use crate::{Engine, EvalError, OnMissing, Pipeline};

/// Errors that can occur when computing a Jacobian.
#[derive(Debug, Error)]
pub enum Error {
    #[error("perturbed parameter {name} = {value} lies outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// A finite-difference Jacobian and the data it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Jacobian {
    /// Parameter names, one per Jacobian column.
    pub params: Vec<String>,

    /// Processed observation names, one per Jacobian row.
    pub observations: Vec<String>,

    /// The point the Jacobian was computed at.
    pub base: Vec<f64>,

    /// Signed perturbation applied to each parameter.
    pub deltas: Vec<f64>,

    /// Processed observations at the base point.
    pub base_values: DVector<f64>,

    /// `∂obs/∂param`, observations × parameters.
    pub jacobian: DMatrix<f64>,

    /// `JᵀJ`, parameters × parameters.
    pub hessian: DMatrix<f64>,
}

/// Computes one signed perturbation per parameter.
///
/// The step magnitude is `|step|`. It is negative when the base value is at
/// or above the midpoint of the parameter's range and positive otherwise.
/// No range check is made here.
#[must_use]
pub fn perturbations(base: &[f64], specs: &[ParamSpec]) -> Vec<f64> {
    base.iter()
        .zip(specs)
        .map(|(&value, spec)| {
            let step = spec.step.abs();
            if value >= spec.midpoint() { -step } else { step }
        })
        .collect()
}

/// Builds the `N+1` row batch: the base point, then one row per perturbed
/// parameter. Returns the batch and the perturbations.
pub(crate) fn batch(config: &StudyConfig, base: &[f64]) -> Result<(DMatrix<f64>, Vec<f64>), Error> {
    let specs = config.parameters();
    if base.len() != specs.len() {
        return Err(ConfigError::Shape {
            expected: specs.len(),
            received: base.len(),
        }
        .into());
    }

    let deltas = perturbations(base, specs);
    let n = specs.len();
    let params = DMatrix::from_fn(n + 1, n, |row, col| {
        if row == col + 1 {
            base[col] + deltas[col]
        } else {
            base[col]
        }
    });

    for row in params.row_iter() {
        for (spec, &value) in specs.iter().zip(row.iter()) {
            if !spec.contains(value) {
                return Err(Error::OutOfRange {
                    name: spec.name.clone(),
                    value,
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
    }

    Ok((params, deltas))
}

/// Forms `J[:, i] = (row_{i+1} − row_0) / δ_i` from an `N+1` row result.
pub(crate) fn finite_difference(values: &DMatrix<f64>, deltas: &[f64]) -> DMatrix<f64> {
    let base = values.row(0);
    DMatrix::from_fn(values.ncols(), deltas.len(), |obs, param| {
        (values[(param + 1, obs)] - base[obs]) / deltas[param]
    })
}

/// Computes the Jacobian of the processed observations at `base`.
///
/// Missing simulations yield [`Outcome::Pending`]; after they complete, call
/// again with the same arguments.
///
/// # Errors
///
/// Returns [`Error::OutOfRange`] before evaluating anything if a perturbed
/// point leaves its parameter range, or an evaluation error.
#[instrument(skip_all, fields(params = base.len()))]
pub fn run<C: ModelCache>(
    engine: &mut Engine<'_, C>,
    base: &[f64],
    pipeline: &Pipeline,
) -> Result<Outcome<Jacobian>, Error> {
    let config = engine.config();
    let (params, deltas) = batch(config, base)?;

    let evaluation = ready!(engine.evaluate(&params, pipeline, OnMissing::Pending)?);

    let jacobian = finite_difference(evaluation.values(), &deltas);
    let hessian = jacobian.transpose() * &jacobian;
    info!(
        rows = jacobian.nrows(),
        cols = jacobian.ncols(),
        "jacobian computed"
    );

    Ok(Outcome::Ready(Jacobian {
        params: config.param_names().into_iter().map(str::to_owned).collect(),
        observations: evaluation.columns().to_vec(),
        base: base.to_vec(),
        deltas,
        base_values: evaluation.row(0),
        jacobian,
        hessian,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use simfit_core::{ObsSpec, ObservationVector, RunState};
    use simfit_store::MemoryStore;

    fn spec(name: &str, step: f64) -> ParamSpec {
        ParamSpec {
            name: name.into(),
            min: 0.0,
            max: 10.0,
            step,
            begin: None,
            optimum: None,
        }
    }

    fn study() -> StudyConfig {
        let obs = |name: &str| ObsSpec {
            name: name.into(),
            scale: 1.0,
            target: 0.0,
        };
        StudyConfig::new(
            "jacobian",
            vec![spec("a", 0.5), spec("b", 0.25)],
            vec![obs("x"), obs("y"), obs("z")],
            1,
        )
        .unwrap()
    }

    /// x = 2a + b, y = a - 3b, z = a * b
    fn model(p: &[f64]) -> ObservationVector {
        [("x", 2.0 * p[0] + p[1]), ("y", p[0] - 3.0 * p[1]), ("z", p[0] * p[1])]
            .into_iter()
            .collect()
    }

    fn run_pending(store: &MemoryStore) {
        for fingerprint in store.cases_in_state(RunState::New) {
            let record = store.get(&fingerprint).unwrap();
            let values = record.member.params.values();
            store.complete(&fingerprint, model(&values)).unwrap();
        }
    }

    #[test]
    fn perturbs_towards_the_midpoint() {
        let specs = [spec("a", 0.1), spec("b", 0.1), spec("c", -0.2)];

        let deltas = perturbations(&[5.0, 8.0, 1.0], &specs);

        // At the midpoint the step goes down.
        assert_relative_eq!(deltas[0], -0.1);
        assert_relative_eq!(deltas[1], -0.1);
        assert_relative_eq!(deltas[2], 0.2);
    }

    #[test]
    fn batch_has_base_then_one_row_per_parameter() {
        let config = study();

        let (params, deltas) = batch(&config, &[2.0, 7.0]).unwrap();

        assert_eq!(params.shape(), (3, 2));
        assert_eq!(deltas, [0.5, -0.25]);
        assert_relative_eq!(params, DMatrix::from_row_slice(3, 2, &[2.0, 7.0, 2.5, 7.0, 2.0, 6.75]));
    }

    #[test]
    fn out_of_range_is_fatal_and_registers_nothing() {
        let config = StudyConfig::new(
            "tight",
            vec![ParamSpec {
                max: 0.3,
                ..spec("a", 0.5)
            }],
            vec![ObsSpec {
                name: "x".into(),
                scale: 1.0,
                target: 0.0,
            }],
            1,
        )
        .unwrap();
        let store = MemoryStore::for_study(&config);
        let mut engine = Engine::new(&config, &store);

        let result = run(&mut engine, &[0.1], &Pipeline::new());

        assert!(matches!(result, Err(Error::OutOfRange { ref name, .. }) if name == "a"));
        assert!(store.is_empty());
    }

    #[test]
    fn first_call_registers_the_whole_batch() {
        let config = study();
        let store = MemoryStore::for_study(&config);
        let mut engine = Engine::new(&config, &store);

        let outcome = run(&mut engine, &[2.0, 7.0], &Pipeline::new()).unwrap();

        assert_eq!(outcome.pending().map(simfit_core::PendingRuns::len), Some(3));
        assert_eq!(store.cases_in_state(RunState::New).len(), 3);
    }

    #[test]
    fn recovers_linear_derivatives() {
        let config = study();
        let store = MemoryStore::for_study(&config);
        let mut engine = Engine::new(&config, &store);
        let base = [2.0, 7.0];

        assert!(run(&mut engine, &base, &Pipeline::new()).unwrap().is_pending());
        run_pending(&store);
        let jac = run(&mut engine, &base, &Pipeline::new())
            .unwrap()
            .ready()
            .expect("cache is complete");

        assert_eq!(jac.jacobian.shape(), (3, 2));
        assert_eq!(jac.hessian.shape(), (2, 2));
        assert_relative_eq!(jac.jacobian[(0, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(jac.jacobian[(0, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(jac.jacobian[(1, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(jac.jacobian[(1, 1)], -3.0, epsilon = 1e-12);
        // z = ab: forward difference in a is exact (b), in b too (a).
        assert_relative_eq!(jac.jacobian[(2, 0)], 7.0, epsilon = 1e-12);
        assert_relative_eq!(jac.jacobian[(2, 1)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(jac.hessian, jac.jacobian.transpose() * &jac.jacobian);
        assert_eq!(jac.params, ["a", "b"]);
        assert_eq!(jac.observations, ["x", "y", "z"]);
    }
}
