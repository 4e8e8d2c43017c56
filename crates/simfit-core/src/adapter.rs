use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ParameterVector;

/// A single edit a model collaborator must make to a case's input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Input file, relative to the case directory.
    pub file: PathBuf,

    /// Group or section within the file (a namelist name, for example).
    pub section: String,

    pub key: String,
    pub value: f64,
}

/// Translates parameters into model-specific file edits.
///
/// Each model family implements this once. The core never applies the edits;
/// it only defines the seam so collaborators can be swapped.
pub trait ParameterAdapter {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the edits needed to configure a case with `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter has no known translation.
    fn apply(&self, params: &ParameterVector) -> Result<Vec<FileEdit>, Self::Error>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("no file mapping for parameter {0:?}")]
    Unmapped(String),
}

#[derive(Debug, Clone)]
struct Mapping {
    param: String,
    file: PathBuf,
    section: String,
    key: String,
}

/// A table-driven adapter mapping each parameter to one namelist variable.
///
/// Covers the common case where a parameter is written unchanged to a single
/// variable. Models needing derived values implement [`ParameterAdapter`]
/// directly.
#[derive(Debug, Clone, Default)]
pub struct NamelistAdapter {
    mappings: Vec<Mapping>,
}

impl NamelistAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `param` to the upper-cased variable of the same name.
    #[must_use]
    pub fn simple(self, param: &str, section: &str, file: impl Into<PathBuf>) -> Self {
        let key = param.to_uppercase();
        self.map(param, file, section, key)
    }

    /// Maps `param` to `key` in `section` of `file`.
    #[must_use]
    pub fn map(
        mut self,
        param: impl Into<String>,
        file: impl Into<PathBuf>,
        section: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.mappings.push(Mapping {
            param: param.into(),
            file: file.into(),
            section: section.into(),
            key: key.into(),
        });
        self
    }
}

impl ParameterAdapter for NamelistAdapter {
    type Error = AdapterError;

    fn apply(&self, params: &ParameterVector) -> Result<Vec<FileEdit>, Self::Error> {
        params
            .iter()
            .map(|p| {
                let mapping = self
                    .mappings
                    .iter()
                    .find(|m| m.param == p.name)
                    .ok_or_else(|| AdapterError::Unmapped(p.name.clone()))?;
                Ok(FileEdit {
                    file: mapping.file.clone(),
                    section: mapping.section.clone(),
                    key: mapping.key.clone(),
                    value: p.value,
                })
            })
            .collect()
    }
}
