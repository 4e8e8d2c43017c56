use thiserror::Error;

/// Configuration for the Gauss-Newton solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    max_iters: usize,
    alphas: Vec<f64>,
    tolerance: f64,
}

/// Errors that can occur when validating a Gauss-Newton config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iters must be at least 1")]
    MaxIters,

    #[error("alphas must be non-empty, finite and positive")]
    Alphas,

    #[error("tolerance must be finite and non-negative")]
    Tolerance,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(10, vec![0.3, 0.7, 1.0], 1.0).unwrap()
    }
}

impl Config {
    /// Creates a new config.
    ///
    /// `alphas` are the step lengths tried in each line search, as fractions
    /// of the full Gauss-Newton step. `tolerance` scales the convergence
    /// threshold, which is the cost expected from internal variability
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero, `alphas` is empty or holds a
    /// non-finite or non-positive value, or `tolerance` is negative or
    /// non-finite.
    pub fn new(max_iters: usize, alphas: Vec<f64>, tolerance: f64) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        if alphas.is_empty() || alphas.iter().any(|a| !a.is_finite() || *a <= 0.0) {
            return Err(ConfigError::Alphas);
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Tolerance);
        }

        Ok(Self {
            max_iters,
            alphas,
            tolerance,
        })
    }

    /// Returns the maximum number of iterations.
    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// Returns the line-search step lengths.
    #[must_use]
    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Returns the convergence tolerance.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}
