use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use simfit_core::{
    EnsembleMember, ModelCache, ObservationVector, Outcome, PendingRuns, SimulationRecord,
    StudyConfig,
};
use tracing::{debug, instrument, warn};

use super::{EvalError, Pipeline};

/// What [`Engine::evaluate`] does when processed results contain NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnMissing {
    /// Return [`Outcome::Pending`] instead of a partial result.
    #[default]
    Pending,

    /// Return the result with NaN cells, for callers that treat NaN as noise.
    Nan,
}

/// A raw observation read during evaluation, before any processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub member: EnsembleMember,
    pub observations: ObservationVector,
}

/// The processed result of evaluating a parameter batch.
///
/// One row per parameter set, in request order. Columns are the configured
/// observation names, the transform's row labels when a transform was
/// applied, or a single `cost` column for a sum-of-squares pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    columns: Vec<String>,
    values: DMatrix<f64>,
    unresolved: PendingRuns,
    sum_square: bool,
}

impl Evaluation {
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Processed values, `n_rows × n_columns`.
    #[must_use]
    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Returns one row as a column vector.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn row(&self, index: usize) -> DVector<f64> {
        self.values.row(index).transpose()
    }

    /// Returns the per-row costs of a sum-of-squares evaluation.
    #[must_use]
    pub fn costs(&self) -> Option<DVector<f64>> {
        self.sum_square.then(|| self.values.column(0).into_owned())
    }

    /// Members that were missing or incomplete and so contributed NaN.
    #[must_use]
    pub fn unresolved(&self) -> &PendingRuns {
        &self.unresolved
    }

    #[must_use]
    pub fn has_nan(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }
}

const COST_COLUMN: &str = "cost";

/// Evaluates parameter batches against a [`ModelCache`].
///
/// The engine reads records and never changes them; the only side effect of
/// an evaluation is that the cache registers members it has not seen, plus
/// the append-only [audit log](Self::audit_log) of raw observations.
#[derive(Debug)]
pub struct Engine<'a, C> {
    config: &'a StudyConfig,
    cache: C,
    audit: Vec<AuditEntry>,
}

impl<'a, C: ModelCache> Engine<'a, C> {
    /// Creates an engine for `config` backed by `cache`.
    ///
    /// Pass `&store` to keep using the store elsewhere.
    pub fn new(config: &'a StudyConfig, cache: C) -> Self {
        Self {
            config,
            cache,
            audit: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &'a StudyConfig {
        self.config
    }

    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Raw observations read so far, in the order they were read.
    ///
    /// Every evaluation appends, including replays of points already read,
    /// so a driver restarted after `Pending` logs its earlier points again.
    /// Drain with [`take_audit_log`](Self::take_audit_log) between restarts
    /// to keep one pass per log.
    #[must_use]
    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Drains the audit log.
    pub fn take_audit_log(&mut self) -> Vec<AuditEntry> {
        std::mem::take(&mut self.audit)
    }

    /// Evaluates every row of `params` and applies `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix does not have one column per active
    /// parameter, if it is empty, if the transform is empty or misaligned,
    /// or if the cache fails.
    pub fn evaluate(
        &mut self,
        params: &DMatrix<f64>,
        pipeline: &Pipeline,
        on_missing: OnMissing,
    ) -> Result<Outcome<Evaluation>, EvalError> {
        let evaluation = self.assemble(params, pipeline)?;

        if on_missing == OnMissing::Pending && evaluation.has_nan() {
            warn!(
                rows = evaluation.n_rows(),
                pending = evaluation.unresolved.len(),
                "batch incomplete"
            );
            return Ok(Outcome::Pending(evaluation.unresolved));
        }
        Ok(Outcome::Ready(evaluation))
    }

    /// Evaluates every row of `params`, returning NaN where data is missing.
    ///
    /// This is [`evaluate`](Self::evaluate) with [`OnMissing::Nan`], without
    /// the `Outcome` wrapper.
    ///
    /// # Errors
    ///
    /// See [`evaluate`](Self::evaluate).
    #[instrument(skip_all, fields(rows = params.nrows()))]
    pub fn assemble(&mut self, params: &DMatrix<f64>, pipeline: &Pipeline) -> Result<Evaluation, EvalError> {
        let config = self.config;
        let n_params = config.n_params();
        if params.ncols() != n_params {
            return Err(EvalError::Shape {
                expected: (params.nrows(), n_params),
                received: params.shape(),
            });
        }
        if params.nrows() == 0 {
            return Err(EvalError::EmptyBatch);
        }

        let obs_names = config.obs_names();
        let n_obs = obs_names.len();
        if n_obs == 0 {
            return Err(EvalError::NoObservations);
        }

        let mut columns: Vec<String> = match pipeline.transform() {
            Some(t) if t.n_rows() == 0 => return Err(EvalError::EmptyTransform),
            Some(t) if t.n_cols() != n_obs => {
                return Err(EvalError::TransformShape {
                    expected: n_obs,
                    received: t.n_cols(),
                });
            }
            Some(t) => t.labels().to_vec(),
            None => obs_names.iter().map(|&n| n.to_owned()).collect(),
        };
        if pipeline.is_sum_square() {
            columns = vec![COST_COLUMN.to_owned()];
        }

        let scales = DVector::from_vec(config.scales());
        let targets = DVector::from_vec(config.targets(pipeline.is_scaled()));

        // Reject bad rows before any member reaches the cache.
        let points: Vec<Vec<f64>> = params
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        for values in &points {
            config.parameter_vector(values)?;
        }

        let mut unresolved = PendingRuns::new();
        let mut rows = Vec::with_capacity(points.len());

        for values in &points {
            let mut members = Vec::with_capacity(config.ensemble_size());
            for index in 0..config.ensemble_size() {
                let member = config.member(values, index)?;
                let record = self
                    .cache
                    .resolve(&member)
                    .map_err(|e| EvalError::Cache(Box::new(e)))?;

                match record.as_ref().and_then(SimulationRecord::completed_observations) {
                    Some(obs) => {
                        let reindexed = obs.reindex(&obs_names);
                        self.audit.push(AuditEntry {
                            observations: obs_names
                                .iter()
                                .copied()
                                .zip(reindexed.iter().copied())
                                .collect(),
                            member,
                        });
                        members.push(DVector::from_vec(reindexed));
                    }
                    None => {
                        debug!(
                            fingerprint = %member.fingerprint(),
                            registered = record.is_none(),
                            "member unavailable"
                        );
                        unresolved.push(member.fingerprint());
                        members.push(DVector::from_element(n_obs, f64::NAN));
                    }
                }
            }

            let mean = ensemble_mean(&members, n_obs);
            rows.push(pipeline.apply(mean, &scales, &targets));
        }

        let values = DMatrix::from_fn(rows.len(), columns.len(), |i, j| rows[i][j]);
        debug!(
            rows = values.nrows(),
            columns = values.ncols(),
            unresolved = unresolved.len(),
            "batch assembled"
        );

        Ok(Evaluation {
            columns,
            values,
            unresolved,
            sum_square: pipeline.is_sum_square(),
        })
    }

    /// Adapts the engine into a single-point objective function.
    ///
    /// The returned closure evaluates one parameter vector and yields its
    /// processed row, so the engine can be handed to any optimizer that
    /// expects `f(x) -> residuals`.
    pub fn objective<'p>(
        &'p mut self,
        pipeline: &'p Pipeline,
        on_missing: OnMissing,
    ) -> impl FnMut(&[f64]) -> Result<Outcome<DVector<f64>>, EvalError> + 'p {
        move |x| {
            let params = DMatrix::from_row_slice(1, x.len(), x);
            Ok(self
                .evaluate(&params, pipeline, on_missing)?
                .map(|evaluation| evaluation.row(0)))
        }
    }
}

/// Averages ensemble members per observation.
///
/// A NaN in any member makes that observation NaN: a partial ensemble is
/// never averaged.
fn ensemble_mean(members: &[DVector<f64>], n_obs: usize) -> DVector<f64> {
    let count = members.len() as f64;
    DVector::from_fn(n_obs, |j, _| {
        if members.iter().any(|m| m[j].is_nan()) {
            f64::NAN
        } else {
            members.iter().map(|m| m[j]).sum::<f64>() / count
        }
    })
}
