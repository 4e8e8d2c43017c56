use simfit_core::ConfigError;

use crate::{EvalError, jacobian};

/// Errors that can occur during a Gauss-Newton solve.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("internal covariance is {}x{}, expected {expected}x{expected}", received.0, received.1)]
    Covariance {
        expected: usize,
        received: (usize, usize),
    },

    #[error("singular Hessian at iteration {iteration}")]
    SingularHessian { iteration: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Jacobian(#[from] jacobian::Error),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
