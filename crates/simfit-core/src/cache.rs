use crate::{EnsembleMember, SimulationRecord};

/// Resolves ensemble members to persisted simulation records.
///
/// This is the only way new simulation work enters the system. An
/// implementation must guarantee at most one record per fingerprint:
///
/// - If a record with the member's fingerprint exists, return it in whatever
///   state it is in.
/// - Otherwise, atomically create one in [`RunState::New`], persisting the
///   member so the external scheduler can act on it, and return `Ok(None)`.
///
/// `Ok(None)` therefore means "did not exist until now", which is distinct
/// from `Ok(Some(record))` with an incomplete state.
///
/// [`RunState::New`]: crate::RunState::New
pub trait ModelCache {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolves `member`, creating a new record if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the member's parameter names do not match the
    /// configured active parameters, or if the backing store fails.
    fn resolve(&self, member: &EnsembleMember) -> Result<Option<SimulationRecord>, Self::Error>;
}

impl<C: ModelCache + ?Sized> ModelCache for &C {
    type Error = C::Error;

    fn resolve(&self, member: &EnsembleMember) -> Result<Option<SimulationRecord>, Self::Error> {
        (**self).resolve(member)
    }
}
