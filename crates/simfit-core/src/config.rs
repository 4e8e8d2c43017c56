use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EnsembleMember, ParameterVector};

/// An active parameter: its valid range and finite-difference step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,

    /// Starting value for optimization. Defaults to the range midpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<f64>,

    /// Best known value. Defaults to `begin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimum: Option<f64>,
}

impl ParamSpec {
    /// Returns the midpoint of `[min, max]`.
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min + self.max)
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A simulated observation with its scale factor and target value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsSpec {
    pub name: String,

    #[serde(default = "unit_scale")]
    pub scale: f64,

    pub target: f64,
}

fn unit_scale() -> f64 {
    1.0
}

fn single_member() -> usize {
    1
}

/// Errors that can occur when loading or validating a study configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format for {path}, expected .toml or .json")]
    UnsupportedFormat { path: String },

    #[error("no active parameters configured")]
    NoParameters,

    #[error("no observations configured")]
    NoObservations,

    #[error("duplicate {kind} name {name:?}")]
    Duplicate { kind: &'static str, name: String },

    #[error("{name}: value must be finite")]
    NonFinite { name: String },

    #[error("{name}: min {min} exceeds max {max}")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("{name}: step must be non-zero")]
    ZeroStep { name: String },

    #[error("{name}: {value} lies outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("ensemble size must be at least 1")]
    EnsembleSize,

    #[error("expected {expected} parameter values, received {received}")]
    Shape { expected: usize, received: usize },

    #[error("ensemble index {index} outside ensemble of size {size}")]
    EnsembleIndex { index: usize, size: usize },
}

#[derive(Deserialize)]
struct RawStudyConfig {
    name: String,
    parameters: Vec<ParamSpec>,
    observations: Vec<ObsSpec>,
    #[serde(default = "single_member")]
    ensemble_size: usize,
}

impl TryFrom<RawStudyConfig> for StudyConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStudyConfig) -> Result<Self, Self::Error> {
        Self::new(raw.name, raw.parameters, raw.observations, raw.ensemble_size)
    }
}

/// The immutable description of a study.
///
/// Holds the active parameters (in canonical order), the observations with
/// their scales and targets, and the ensemble size. It is validated once on
/// construction and then passed by reference to stores, the engine and the
/// drivers.
///
/// # Example
///
/// ```
/// use simfit_core::StudyConfig;
///
/// let config = StudyConfig::from_toml_str(r#"
///     name = "demo"
///     ensemble_size = 2
///
///     [[parameters]]
///     name = "entcoef"
///     min = 0.6
///     max = 9.0
///     step = 0.5
///
///     [[observations]]
///     name = "olr"
///     scale = 1.0
///     target = 240.0
/// "#).unwrap();
///
/// assert_eq!(config.n_params(), 1);
/// assert_eq!(config.ensemble_size(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStudyConfig")]
pub struct StudyConfig {
    name: String,
    parameters: Vec<ParamSpec>,
    observations: Vec<ObsSpec>,
    ensemble_size: usize,
}

impl StudyConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no parameters or observations, if any
    /// name is duplicated, if any number is non-finite, if a range is
    /// inverted, a step is zero, a begin/optimum value lies outside its range,
    /// or the ensemble size is zero.
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<ParamSpec>,
        observations: Vec<ObsSpec>,
        ensemble_size: usize,
    ) -> Result<Self, ConfigError> {
        if parameters.is_empty() {
            return Err(ConfigError::NoParameters);
        }
        if observations.is_empty() {
            return Err(ConfigError::NoObservations);
        }
        if ensemble_size == 0 {
            return Err(ConfigError::EnsembleSize);
        }

        check_unique("parameter", parameters.iter().map(|p| p.name.as_str()))?;
        check_unique("observation", observations.iter().map(|o| o.name.as_str()))?;

        for p in &parameters {
            let values = [Some(p.min), Some(p.max), Some(p.step), p.begin, p.optimum];
            if values.into_iter().flatten().any(|v| !v.is_finite()) {
                return Err(ConfigError::NonFinite {
                    name: p.name.clone(),
                });
            }
            if p.min > p.max {
                return Err(ConfigError::InvalidRange {
                    name: p.name.clone(),
                    min: p.min,
                    max: p.max,
                });
            }
            if p.step == 0.0 {
                return Err(ConfigError::ZeroStep {
                    name: p.name.clone(),
                });
            }
            for value in [p.begin, p.optimum].into_iter().flatten() {
                if !p.contains(value) {
                    return Err(ConfigError::OutOfRange {
                        name: p.name.clone(),
                        value,
                        min: p.min,
                        max: p.max,
                    });
                }
            }
        }

        for o in &observations {
            if !o.scale.is_finite() || !o.target.is_finite() {
                return Err(ConfigError::NonFinite {
                    name: o.name.clone(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            parameters,
            observations,
            ensemble_size,
        })
    }

    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON or fails validation.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a configuration file, choosing the format by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unknown extension,
    /// or fails to parse or validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let read = || {
            fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
        };

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&read()?),
            Some("json") => Self::from_json_str(&read()?),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active parameters in canonical order.
    #[must_use]
    pub fn parameters(&self) -> &[ParamSpec] {
        &self.parameters
    }

    #[must_use]
    pub fn observations(&self) -> &[ObsSpec] {
        &self.observations
    }

    #[must_use]
    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn n_obs(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn ensemble_size(&self) -> usize {
        self.ensemble_size
    }

    #[must_use]
    pub fn param_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    #[must_use]
    pub fn obs_names(&self) -> Vec<&str> {
        self.observations.iter().map(|o| o.name.as_str()).collect()
    }

    /// Per-observation scale factors.
    #[must_use]
    pub fn scales(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.scale).collect()
    }

    /// Target values, multiplied by the scale factors when `scale` is set.
    #[must_use]
    pub fn targets(&self, scale: bool) -> Vec<f64> {
        self.observations
            .iter()
            .map(|o| if scale { o.target * o.scale } else { o.target })
            .collect()
    }

    /// Per-parameter finite-difference steps.
    #[must_use]
    pub fn steps(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.step).collect()
    }

    /// Starting point: each parameter's `begin`, or its range midpoint.
    #[must_use]
    pub fn begin(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| p.begin.unwrap_or_else(|| p.midpoint()))
            .collect()
    }

    /// Best known point: each parameter's `optimum`, falling back to
    /// [`begin`](Self::begin).
    #[must_use]
    pub fn optimum(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| p.optimum.or(p.begin).unwrap_or_else(|| p.midpoint()))
            .collect()
    }

    /// Builds a parameter vector in canonical order from raw values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Shape`] if the number of values does not match
    /// the number of active parameters, or [`ConfigError::NonFinite`] if any
    /// value is NaN or infinite.
    pub fn parameter_vector(&self, values: &[f64]) -> Result<ParameterVector, ConfigError> {
        if values.len() != self.n_params() {
            return Err(ConfigError::Shape {
                expected: self.n_params(),
                received: values.len(),
            });
        }
        if let Some((p, _)) = self.parameters.iter().zip(values).find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::NonFinite { name: p.name.clone() });
        }
        Ok(ParameterVector::new(
            self.parameters
                .iter()
                .zip(values)
                .map(|(p, &v)| (p.name.as_str(), v)),
        ))
    }

    /// Builds an ensemble member from raw values and an ensemble index.
    ///
    /// # Errors
    ///
    /// Returns an error if the value count is wrong or the index lies outside
    /// the configured ensemble.
    pub fn member(&self, values: &[f64], index: usize) -> Result<EnsembleMember, ConfigError> {
        if index >= self.ensemble_size {
            return Err(ConfigError::EnsembleIndex {
                index,
                size: self.ensemble_size,
            });
        }
        Ok(EnsembleMember::new(self.parameter_vector(values)?, index))
    }
}

fn check_unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::Duplicate {
                kind,
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}
