use simfit_core::ConfigError;
use thiserror::Error;

/// Errors that can occur when evaluating a parameter batch.
///
/// All of these are fatal: they signal a configuration or caller bug and are
/// never resolved by running more simulations.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("parameter matrix is {}x{}, expected {}x{}", received.0, received.1, expected.0, expected.1)]
    Shape {
        expected: (usize, usize),
        received: (usize, usize),
    },

    #[error("no parameter sets to evaluate")]
    EmptyBatch,

    #[error("no observations configured")]
    NoObservations,

    #[error("transform has no rows")]
    EmptyTransform,

    #[error("transform has {received} columns, expected one per observation ({expected})")]
    TransformShape { expected: usize, received: usize },

    #[error("invalid ensemble member")]
    Member(#[from] ConfigError),

    #[error("cache lookup failed")]
    Cache(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error as _;

    #[test]
    fn cache_error_is_reported_once_in_the_chain() {
        let inner = std::io::Error::other("disk full");
        let error = EvalError::Cache(Box::new(inner));

        assert_eq!(error.to_string(), "cache lookup failed");
        assert_eq!(error.source().map(ToString::to_string).as_deref(), Some("disk full"));
    }
}
