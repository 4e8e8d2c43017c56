use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// A single named parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
}

/// An ordered mapping from parameter name to value.
///
/// The order is significant: it is the canonical order used for
/// fingerprinting and for every parameter array. Vectors are normally built
/// through [`StudyConfig::parameter_vector`], which guarantees the key set
/// matches the configured active parameters.
///
/// [`StudyConfig::parameter_vector`]: crate::StudyConfig::parameter_vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector(Vec<Parameter>);

impl ParameterVector {
    /// Creates a vector from `(name, value)` pairs, keeping their order.
    pub fn new<S, I>(entries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, f64)>,
    {
        Self(
            entries
                .into_iter()
                .map(|(name, value)| Parameter {
                    name: name.into(),
                    value,
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|p| p.name.as_str())
    }

    /// Returns the values in canonical order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|p| p.value).collect()
    }

    /// Returns the value of the named parameter, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|p| p.name == name).map(|p| p.value)
    }

    /// Returns `true` if the names match `expected` exactly, in order.
    #[must_use]
    pub fn has_names<S: AsRef<str>>(&self, expected: &[S]) -> bool {
        self.len() == expected.len()
            && self
                .names()
                .zip(expected)
                .all(|(name, want)| name == want.as_ref())
    }
}

/// One ensemble member: a parameter vector plus its ensemble index.
///
/// Members sharing a parameter vector differ only in `index`, which selects
/// the stochastic seed of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub params: ParameterVector,
    pub index: usize,
}

impl EnsembleMember {
    #[must_use]
    pub fn new(params: ParameterVector, index: usize) -> Self {
        Self { params, index }
    }

    /// Computes the canonical fingerprint of this member.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}
