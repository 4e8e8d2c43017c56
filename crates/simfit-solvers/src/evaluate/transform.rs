use nalgebra::{DMatrix, SymmetricEigen};
use serde::Serialize;
use thiserror::Error;

/// Eigenvalues below this fraction of the largest are dropped when building
/// a whitening transform.
const EIGEN_CUTOFF: f64 = 1e-6;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("{labels} row labels for a transform with {rows} rows")]
    Labels { labels: usize, rows: usize },

    #[error("transform has {rows} rows but only {cols} columns")]
    TooManyRows { rows: usize, cols: usize },

    #[error("covariance must be square with one row per observation, got {rows}x{cols} for {names} names")]
    Covariance {
        rows: usize,
        cols: usize,
        names: usize,
    },

    #[error("covariance has no positive eigenvalues")]
    Degenerate,
}

/// A linear projection of observations into a derived basis.
///
/// The matrix is `N × n_obs` with `N ≤ n_obs`: columns follow the configured
/// observation order and each row is labelled with the name of a derived
/// observation. A transform with zero rows can be constructed but is rejected
/// at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transform {
    labels: Vec<String>,
    matrix: DMatrix<f64>,
}

impl Transform {
    /// Creates a transform from row labels and a matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the label count differs from the row count or the
    /// matrix has more rows than columns.
    pub fn new(labels: Vec<String>, matrix: DMatrix<f64>) -> Result<Self, TransformError> {
        if labels.len() != matrix.nrows() {
            return Err(TransformError::Labels {
                labels: labels.len(),
                rows: matrix.nrows(),
            });
        }
        if matrix.nrows() > matrix.ncols() {
            return Err(TransformError::TooManyRows {
                rows: matrix.nrows(),
                cols: matrix.ncols(),
            });
        }
        Ok(Self { labels, matrix })
    }

    /// The identity transform, keeping the observation names.
    pub fn identity<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            labels: names.iter().map(|n| n.as_ref().to_owned()).collect(),
            matrix: DMatrix::identity(names.len(), names.len()),
        }
    }

    /// Builds a whitening transform from an observation error covariance.
    ///
    /// Rows are the covariance eigenvectors divided by the square root of
    /// their eigenvalues, largest eigenvalue first, so the covariance
    /// projected through the transform is the identity. Eigenvalues below
    /// `1e-6` of the largest are dropped, which is why the result may have
    /// fewer rows than observations. Rows are labelled `ev0`, `ev1`, ...
    ///
    /// # Errors
    ///
    /// Returns an error if the covariance is not square with one row per
    /// name, or has no positive eigenvalues.
    pub fn whitening<S: AsRef<str>>(covariance: &DMatrix<f64>, names: &[S]) -> Result<Self, TransformError> {
        let n = names.len();
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(TransformError::Covariance {
                rows: covariance.nrows(),
                cols: covariance.ncols(),
                names: n,
            });
        }

        let eigen = SymmetricEigen::new(covariance.clone());
        let max = eigen.eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max.is_nan() || max <= 0.0 {
            return Err(TransformError::Degenerate);
        }

        let mut kept: Vec<usize> = (0..n)
            .filter(|&i| eigen.eigenvalues[i] > EIGEN_CUTOFF * max)
            .collect();
        kept.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let matrix = DMatrix::from_fn(kept.len(), n, |row, col| {
            let i = kept[row];
            eigen.eigenvectors[(col, i)] / eigen.eigenvalues[i].sqrt()
        });
        let labels = (0..kept.len()).map(|i| format!("ev{i}")).collect();

        Ok(Self { labels, matrix })
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Number of derived observations.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of source observations.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.matrix.ncols()
    }

    /// Projects a covariance into the derived basis: `T · C · Tᵀ`.
    #[must_use]
    pub fn project_covariance(&self, covariance: &DMatrix<f64>) -> DMatrix<f64> {
        &self.matrix * covariance * self.matrix.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn validates_labels_and_shape() {
        assert!(matches!(
            Transform::new(vec!["a".into()], DMatrix::zeros(2, 3)),
            Err(TransformError::Labels { labels: 1, rows: 2 })
        ));
        assert!(matches!(
            Transform::new(vec!["a".into(), "b".into()], DMatrix::zeros(2, 1)),
            Err(TransformError::TooManyRows { .. })
        ));
        assert!(Transform::new(vec![], DMatrix::zeros(0, 3)).is_ok());
    }

    #[test]
    fn whitening_maps_covariance_to_identity() {
        let cov = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]);

        let t = Transform::whitening(&cov, &["a", "b", "c"]).unwrap();
        let projected = t.project_covariance(&cov);

        assert_eq!(t.labels(), ["ev0", "ev1", "ev2"]);
        assert_relative_eq!(projected, DMatrix::identity(3, 3), epsilon = 1e-10);
    }

    #[test]
    fn whitening_drops_null_directions() {
        // Rank one: only the [1, 1] direction has variance.
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);

        let t = Transform::whitening(&cov, &["a", "b"]).unwrap();

        assert_eq!(t.n_rows(), 1);
        assert_eq!(t.n_cols(), 2);
        assert_relative_eq!(t.project_covariance(&cov)[(0, 0)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn whitening_rejects_mismatched_covariance() {
        let cov = DMatrix::identity(2, 2);
        assert!(matches!(
            Transform::whitening(&cov, &["a", "b", "c"]),
            Err(TransformError::Covariance { .. })
        ));
        assert!(matches!(
            Transform::whitening(&DMatrix::zeros(2, 2), &["a", "b"]),
            Err(TransformError::Degenerate)
        ));
    }
}
