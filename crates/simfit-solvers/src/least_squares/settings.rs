use thiserror::Error;

/// Settings passed to a least-squares solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    max_evaluations: usize,
    rho_begin: f64,
    rho_end: f64,
    seed: u64,
}

/// Errors that can occur when validating least-squares settings.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    #[error("max_evaluations must be positive")]
    MaxEvaluations,

    #[error("rho_begin must be finite and positive")]
    RhoBegin,

    #[error("rho_end must be finite, positive and no larger than rho_begin")]
    RhoEnd,
}

impl Default for Settings {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(100, 0.1, 1e-3, 123_456).unwrap()
    }
}

impl Settings {
    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the evaluation budget is zero or the trust radii
    /// are not `0 < rho_end <= rho_begin`.
    pub fn new(
        max_evaluations: usize,
        rho_begin: f64,
        rho_end: f64,
        seed: u64,
    ) -> Result<Self, SettingsError> {
        if max_evaluations == 0 {
            return Err(SettingsError::MaxEvaluations);
        }
        if !rho_begin.is_finite() || rho_begin <= 0.0 {
            return Err(SettingsError::RhoBegin);
        }
        if !rho_end.is_finite() || rho_end <= 0.0 || rho_end > rho_begin {
            return Err(SettingsError::RhoEnd);
        }

        Ok(Self {
            max_evaluations,
            rho_begin,
            rho_end,
            seed,
        })
    }

    /// Returns the residual evaluation budget.
    #[must_use]
    pub fn max_evaluations(&self) -> usize {
        self.max_evaluations
    }

    /// Returns the initial trust-region radius.
    #[must_use]
    pub fn rho_begin(&self) -> f64 {
        self.rho_begin
    }

    /// Returns the final trust-region radius.
    #[must_use]
    pub fn rho_end(&self) -> f64 {
        self.rho_end
    }

    /// Returns the seed for solvers with random components.
    ///
    /// Restarts must reuse the same seed so replayed points hit the cache.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
