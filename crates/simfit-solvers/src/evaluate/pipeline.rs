use nalgebra::DVector;

use super::Transform;

/// Post-processing applied to each ensemble-mean row.
///
/// Steps run in a fixed order regardless of how the pipeline was built:
/// scale, then residual, then transform, then sum of squares. The residual
/// target is scaled whenever `scale` is on, so both sides of the subtraction
/// share units.
///
/// ```
/// use simfit_solvers::Pipeline;
///
/// let raw = Pipeline::new();
/// let cost = Pipeline::new().scaled().residual().sum_square();
/// assert!(!raw.is_sum_square());
/// assert!(cost.is_scaled() && cost.is_residual() && cost.is_sum_square());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    scale: bool,
    residual: bool,
    transform: Option<Transform>,
    sum_square: bool,
}

impl Pipeline {
    /// Creates a pipeline that returns raw ensemble means.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplies observations by the configured scale factors.
    #[must_use]
    pub fn scaled(self) -> Self {
        self.scaled_if(true)
    }

    #[must_use]
    pub fn scaled_if(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Subtracts the configured targets.
    #[must_use]
    pub fn residual(mut self) -> Self {
        self.residual = true;
        self
    }

    /// Projects observations through `transform`.
    #[must_use]
    pub fn transformed(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Collapses each row to the sum of its squared elements.
    #[must_use]
    pub fn sum_square(mut self) -> Self {
        self.sum_square = true;
        self
    }

    #[must_use]
    pub fn is_scaled(&self) -> bool {
        self.scale
    }

    #[must_use]
    pub fn is_residual(&self) -> bool {
        self.residual
    }

    #[must_use]
    pub fn is_sum_square(&self) -> bool {
        self.sum_square
    }

    #[must_use]
    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Applies the pipeline to one row.
    ///
    /// `scales` and `targets` are in configured observation order; `targets`
    /// must already be scaled when the pipeline scales.
    pub(crate) fn apply(&self, mut row: DVector<f64>, scales: &DVector<f64>, targets: &DVector<f64>) -> DVector<f64> {
        if self.scale {
            row.component_mul_assign(scales);
        }
        if self.residual {
            row -= targets;
        }
        if let Some(transform) = &self.transform {
            // Row vector times Tᵀ, written as T times the column vector.
            row = transform.matrix() * row;
        }
        if self.sum_square {
            row = DVector::from_element(1, row.norm_squared());
        }
        row
    }
}
