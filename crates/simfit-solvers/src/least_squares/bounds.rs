use nalgebra::DVector;
use simfit_core::StudyConfig;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BoundsError {
    #[error("{lower} lower bounds but {upper} upper bounds")]
    Length { lower: usize, upper: usize },

    #[error("bound {index} is inverted or non-finite: [{lower}, {upper}]")]
    Invalid { index: usize, lower: f64, upper: f64 },
}

/// Box constraints on the parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    /// Creates validated bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ or any pair is inverted or
    /// non-finite.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, BoundsError> {
        if lower.len() != upper.len() {
            return Err(BoundsError::Length {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        for (index, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(BoundsError::Invalid {
                    index,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self {
            lower: DVector::from_vec(lower),
            upper: DVector::from_vec(upper),
        })
    }

    /// The configured parameter ranges.
    #[must_use]
    pub fn from_config(config: &StudyConfig) -> Self {
        let specs = config.parameters();
        Self {
            lower: DVector::from_iterator(specs.len(), specs.iter().map(|p| p.min)),
            upper: DVector::from_iterator(specs.len(), specs.iter().map(|p| p.max)),
        }
    }

    #[must_use]
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    #[must_use]
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Projects `x` onto the box.
    #[must_use]
    pub fn clamp(&self, x: &DVector<f64>) -> DVector<f64> {
        x.zip_zip_map(&self.lower, &self.upper, |v, lo, hi| v.clamp(lo, hi))
    }

    #[must_use]
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(v, (lo, hi))| (lo..=hi).contains(&v))
    }
}
