//! Evaluates the best known parameters.
//!
//! Used after an optimization to run, or read back, the full ensemble at the
//! optimum and report its raw observations.

use nalgebra::DMatrix;
use serde::Serialize;
use simfit_core::{ModelCache, ObservationVector, Outcome, ParameterVector, ready};
use tracing::{info, instrument};

use crate::{Engine, EvalError, OnMissing, Pipeline};

/// Raw ensemble-mean observations at a parameter point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedRun {
    pub params: ParameterVector,
    pub observations: ObservationVector,
}

/// Evaluates `params`, or the configured optimum when `None`.
///
/// # Errors
///
/// Returns an error if `params` has the wrong length or evaluation fails.
#[instrument(skip_all)]
pub fn run<C: ModelCache>(
    engine: &mut Engine<'_, C>,
    params: Option<&[f64]>,
) -> Result<Outcome<OptimizedRun>, EvalError> {
    let config = engine.config();
    let values = params.map_or_else(|| config.optimum(), <[f64]>::to_vec);
    let params = config.parameter_vector(&values)?;

    let batch = DMatrix::from_row_slice(1, values.len(), &values);
    let evaluation = ready!(engine.evaluate(&batch, &Pipeline::new(), OnMissing::Pending)?);

    let observations = evaluation
        .columns()
        .iter()
        .zip(evaluation.row(0).iter())
        .map(|(name, &value)| (name.as_str(), value))
        .collect();
    info!(params = params.len(), "optimized run complete");

    Ok(Outcome::Ready(OptimizedRun {
        params,
        observations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use simfit_core::{ObsSpec, ParamSpec, RunState, StudyConfig};
    use simfit_store::MemoryStore;

    fn study() -> StudyConfig {
        StudyConfig::new(
            "optimized",
            vec![ParamSpec {
                name: "a".into(),
                min: 0.0,
                max: 10.0,
                step: 0.1,
                begin: Some(2.0),
                optimum: Some(7.0),
            }],
            vec![ObsSpec {
                name: "x".into(),
                scale: 3.0,
                target: 1.0,
            }],
            2,
        )
        .unwrap()
    }

    #[test]
    fn defaults_to_the_configured_optimum() {
        let config = study();
        let store = MemoryStore::for_study(&config);
        let mut engine = Engine::new(&config, &store);

        let outcome = run(&mut engine, None).unwrap();

        assert_eq!(outcome.pending().map(simfit_core::PendingRuns::len), Some(2));
        for fingerprint in store.cases_in_state(RunState::New) {
            let record = store.get(&fingerprint).unwrap();
            assert_eq!(record.member.params.get("a"), Some(7.0));
        }
    }

    #[test]
    fn reports_raw_ensemble_means() {
        let config = study();
        let store = MemoryStore::for_study(&config);
        for (index, value) in [(0, 1.0), (1, 2.0)] {
            let member = config.member(&[4.0], index).unwrap();
            store
                .insert_completed(member, [("x", value)].into_iter().collect())
                .unwrap();
        }
        let mut engine = Engine::new(&config, &store);

        let result = run(&mut engine, Some([4.0].as_slice())).unwrap().ready().unwrap();

        // Unscaled, no residual.
        assert_eq!(result.observations.get("x"), Some(1.5));
        assert_eq!(result.params.get("a"), Some(4.0));
    }

    #[test]
    fn rejects_wrong_length() {
        let config = study();
        let store = MemoryStore::for_study(&config);
        let mut engine = Engine::new(&config, &store);

        assert!(matches!(
            run(&mut engine, Some([1.0, 2.0].as_slice())),
            Err(EvalError::Member(_))
        ));
    }
}
