use std::path::PathBuf;

use simfit_core::{Fingerprint, ParseStateError, RunState};
use thiserror::Error;

/// Errors that can occur when reading or writing simulation records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The member's parameter names differ from the configured active set.
    #[error("expected parameters {expected:?}, received {received:?}")]
    ParameterMismatch {
        expected: Vec<String>,
        received: Vec<String>,
    },

    #[error("no record with fingerprint {0}")]
    NotFound(Fingerprint),

    #[error("record {fingerprint} cannot move from {from} back to {to}")]
    StateRegression {
        fingerprint: Fingerprint,
        from: RunState,
        to: RunState,
    },

    #[error("record {0} is completed but has no observations")]
    MissingArtifact(Fingerprint),

    #[error("record {fingerprint} has an invalid state marker")]
    StateMarker {
        fingerprint: Fingerprint,
        #[source]
        source: ParseStateError,
    },

    #[error("case at {path} belongs to fingerprint {found}")]
    FingerprintMismatch { path: PathBuf, found: Fingerprint },

    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| Self::Json { path, source }
    }
}
