use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EnsembleMember, Fingerprint};

/// Lifecycle state of a simulation case.
///
/// States only ever advance, in declaration order. The core creates records
/// in [`RunState::New`]; everything after that is driven by the external
/// scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    New,
    Queued,
    Running,
    Completed,
}

impl RunState {
    /// All states in lifecycle order.
    pub const ALL: [RunState; 4] = [Self::New, Self::Queued, Self::Running, Self::Completed];

    /// Returns the marker text for this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
        }
    }

    /// Returns the state that follows this one, or `None` once completed.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::New => Some(Self::Queued),
            Self::Queued => Some(Self::Running),
            Self::Running => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    #[must_use]
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a state marker cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown run state {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for RunState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == trimmed)
            .ok_or_else(|| ParseStateError(trimmed.to_owned()))
    }
}

/// Named observation values produced by a completed simulation.
///
/// Non-finite values round-trip through JSON as `null`, which reads back as
/// NaN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Option<f64>>",
    into = "BTreeMap<String, Option<f64>>"
)]
pub struct ObservationVector(BTreeMap<String, f64>);

impl ObservationVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Returns the values in the order given by `names`.
    ///
    /// Names without a value come back as NaN; values not named are dropped.
    pub fn reindex<S: AsRef<str>>(&self, names: &[S]) -> Vec<f64> {
        names
            .iter()
            .map(|name| self.get(name.as_ref()).unwrap_or(f64::NAN))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ObservationVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<BTreeMap<String, Option<f64>>> for ObservationVector {
    fn from(map: BTreeMap<String, Option<f64>>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, v.unwrap_or(f64::NAN)))
                .collect(),
        )
    }
}

impl From<ObservationVector> for BTreeMap<String, Option<f64>> {
    fn from(obs: ObservationVector) -> Self {
        obs.0
            .into_iter()
            .map(|(k, v)| (k, v.is_finite().then_some(v)))
            .collect()
    }
}

/// One simulation case, identified by the fingerprint of its member.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRecord {
    pub fingerprint: Fingerprint,
    pub state: RunState,
    pub member: EnsembleMember,
    /// Present only once the simulation has completed.
    pub observations: Option<ObservationVector>,
}

impl SimulationRecord {
    /// Creates a record in [`RunState::New`] for `member`.
    #[must_use]
    pub fn new(member: EnsembleMember) -> Self {
        Self {
            fingerprint: member.fingerprint(),
            state: RunState::New,
            member,
            observations: None,
        }
    }

    /// Returns the observations if, and only if, the record has completed.
    #[must_use]
    pub fn completed_observations(&self) -> Option<&ObservationVector> {
        if self.state.is_completed() {
            self.observations.as_ref()
        } else {
            None
        }
    }
}
