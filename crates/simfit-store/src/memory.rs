use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use simfit_core::{
    EnsembleMember, Fingerprint, ModelCache, ObservationVector, RunState, SimulationRecord,
    StudyConfig,
};
use tracing::debug;

use crate::{StoreError, check_names, check_transition};

/// An in-memory record store.
#[derive(Debug)]
pub struct MemoryStore {
    names: Vec<String>,
    records: Mutex<BTreeMap<Fingerprint, SimulationRecord>>,
}

impl MemoryStore {
    /// Creates an empty store accepting members with exactly these parameter
    /// names, in this order.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates an empty store for the study's active parameters.
    #[must_use]
    pub fn for_study(config: &StudyConfig) -> Self {
        Self::new(config.param_names())
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<Fingerprint, SimulationRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<SimulationRecord> {
        self.records().get(fingerprint).cloned()
    }

    /// Lists the fingerprints of records currently in `state`.
    #[must_use]
    pub fn cases_in_state(&self, state: RunState) -> Vec<Fingerprint> {
        self.records()
            .values()
            .filter(|r| r.state == state)
            .map(|r| r.fingerprint.clone())
            .collect()
    }

    /// Moves a record to `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or `state` precedes its
    /// current state.
    pub fn set_state(&self, fingerprint: &Fingerprint, state: RunState) -> Result<(), StoreError> {
        let mut records = self.records();
        let record = records
            .get_mut(fingerprint)
            .ok_or_else(|| StoreError::NotFound(fingerprint.clone()))?;
        check_transition(fingerprint, record.state, state)?;
        record.state = state;
        Ok(())
    }

    /// Stores observations for a record and marks it completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist.
    pub fn complete(
        &self,
        fingerprint: &Fingerprint,
        observations: ObservationVector,
    ) -> Result<(), StoreError> {
        let mut records = self.records();
        let record = records
            .get_mut(fingerprint)
            .ok_or_else(|| StoreError::NotFound(fingerprint.clone()))?;
        record.observations = Some(observations);
        record.state = RunState::Completed;
        Ok(())
    }

    /// Inserts an already completed record, replacing nothing.
    ///
    /// Useful for seeding a store from an earlier study. Returns the
    /// fingerprint of the (possibly pre-existing) record.
    ///
    /// # Errors
    ///
    /// Returns an error if the member's parameter names are wrong.
    pub fn insert_completed(
        &self,
        member: EnsembleMember,
        observations: ObservationVector,
    ) -> Result<Fingerprint, StoreError> {
        check_names(&self.names, &member)?;
        let mut record = SimulationRecord::new(member);
        record.state = RunState::Completed;
        record.observations = Some(observations);

        let fingerprint = record.fingerprint.clone();
        self.records().entry(fingerprint.clone()).or_insert(record);
        Ok(fingerprint)
    }
}

impl ModelCache for MemoryStore {
    type Error = StoreError;

    fn resolve(&self, member: &EnsembleMember) -> Result<Option<SimulationRecord>, Self::Error> {
        check_names(&self.names, member)?;
        let fingerprint = member.fingerprint();

        let mut records = self.records();
        if let Some(record) = records.get(&fingerprint) {
            debug!(%fingerprint, state = %record.state, "cache hit");
            return Ok(Some(record.clone()));
        }

        debug!(%fingerprint, "registering new case");
        records.insert(fingerprint, SimulationRecord::new(member.clone()));
        Ok(None)
    }
}
