//! Fingerprint-keyed stores of simulation records.
//!
//! Both stores implement [`ModelCache`]: resolving a member returns its record
//! if one exists, and otherwise creates a record in state `NEW` and returns
//! `None`. Creation is idempotent, so there is never more than one record per
//! fingerprint.
//!
//! - [`MemoryStore`] keeps records in memory behind a mutex.
//! - [`DirStore`] keeps one case directory per record, with a `state` marker
//!   file that the external scheduler advances and an `observations.json`
//!   artifact written by post-processing.
//!
//! Both also expose the operations the scheduler side uses: listing cases by
//! state, advancing state (never backwards), and completing a case with its
//! observations.
//!
//! [`ModelCache`]: simfit_core::ModelCache

mod dir;
mod error;
mod memory;

pub use dir::DirStore;
pub use error::StoreError;
pub use memory::MemoryStore;

use simfit_core::{EnsembleMember, Fingerprint, RunState};

/// Rejects members whose parameter names differ from the configured ones.
fn check_names(expected: &[String], member: &EnsembleMember) -> Result<(), StoreError> {
    if member.params.has_names(expected) {
        Ok(())
    } else {
        Err(StoreError::ParameterMismatch {
            expected: expected.to_vec(),
            received: member.params.names().map(str::to_owned).collect(),
        })
    }
}

/// Rejects state changes that would move a record backwards.
fn check_transition(fingerprint: &Fingerprint, from: RunState, to: RunState) -> Result<(), StoreError> {
    if to < from {
        Err(StoreError::StateRegression {
            fingerprint: fingerprint.clone(),
            from,
            to,
        })
    } else {
        Ok(())
    }
}
