use serde::Serialize;

use crate::Fingerprint;

/// Simulations that must complete before an evaluation can be retried.
///
/// The list may be empty when every record existed and was completed but
/// still produced non-finite values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingRuns {
    fingerprints: Vec<Fingerprint>,
}

impl PendingRuns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fingerprint, ignoring duplicates.
    pub fn push(&mut self, fingerprint: Fingerprint) {
        if !self.fingerprints.contains(&fingerprint) {
            self.fingerprints.push(fingerprint);
        }
    }

    /// Merges another set into this one, ignoring duplicates.
    pub fn extend(&mut self, other: PendingRuns) {
        for fp in other.fingerprints {
            self.push(fp);
        }
    }

    #[must_use]
    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl FromIterator<Fingerprint> for PendingRuns {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        let mut pending = Self::new();
        for fp in iter {
            pending.push(fp);
        }
        pending
    }
}

/// The result of a request that may depend on simulations not yet complete.
///
/// `Pending` is not a failure: new work has been registered, nothing partial
/// was kept, and the caller should run the pending simulations and then
/// repeat the whole request from the start.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Every required simulation was available.
    Ready(T),

    /// At least one required simulation is missing or incomplete.
    Pending(PendingRuns),
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns the ready value, discarding any pending runs.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    /// Returns the pending runs, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingRuns> {
        match self {
            Self::Ready(_) => None,
            Self::Pending(pending) => Some(pending),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ready(value) => Outcome::Ready(f(value)),
            Self::Pending(pending) => Outcome::Pending(pending),
        }
    }

    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ready(value) => f(value),
            Self::Pending(pending) => Outcome::Pending(pending),
        }
    }
}

/// Unwraps a ready [`Outcome`] or returns `Ok(Outcome::Pending(..))` early.
///
/// Intended for functions returning `Result<Outcome<T>, E>`:
///
/// ```
/// use simfit_core::{Outcome, PendingRuns, ready};
///
/// fn doubled(input: Outcome<f64>) -> Result<Outcome<f64>, std::convert::Infallible> {
///     let value = ready!(input);
///     Ok(Outcome::Ready(value * 2.0))
/// }
///
/// assert_eq!(doubled(Outcome::Ready(2.0)).unwrap(), Outcome::Ready(4.0));
/// assert!(doubled(Outcome::Pending(PendingRuns::new())).unwrap().is_pending());
/// ```
#[macro_export]
macro_rules! ready {
    ($outcome:expr) => {
        match $outcome {
            $crate::Outcome::Ready(value) => value,
            $crate::Outcome::Pending(pending) => {
                return Ok($crate::Outcome::Pending(pending));
            }
        }
    };
}
