//! Orthogonal Procrustes projection built on the SVD engine.
//!
//! `procrustes_orthogonalize(W) = U·Vᵗ` is the orthogonal (semi-orthogonal when
//! `W` is rectangular) matrix closest to `W` in Frobenius norm.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::linear_algebra::gram;
use crate::core::titan::matrix::Matrix;
use crate::core::titan::svd::{compute_svd_with, SvdConfig};

pub const DEFAULT_ORTHOGONALITY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcrustesConfig {
    pub svd: SvdConfig,
    /// Post-projection scores above the structural floor by more than this are logged.
    pub warn_tolerance: f64,
}

impl Default for ProcrustesConfig {
    fn default() -> Self {
        Self { svd: SvdConfig::default(), warn_tolerance: DEFAULT_ORTHOGONALITY_TOLERANCE }
    }
}

pub fn procrustes_orthogonalize(w: &Matrix) -> AlignResult<Matrix> {
    procrustes_orthogonalize_with(w, &ProcrustesConfig::default())
}

pub fn procrustes_orthogonalize_with(w: &Matrix, config: &ProcrustesConfig) -> AlignResult<Matrix> {
    let svd = compute_svd_with(w, &config.svd)?;
    let q = svd.u.matmul(&svd.v.transpose())?;

    // A wide matrix cannot have orthonormal columns: QᵗQ has rank `rows`, so
    // ‖QᵗQ − I‖_F is at least sqrt(cols − rows).
    let floor = (w.cols().saturating_sub(w.rows()) as f64).sqrt();
    let score = compute_orthogonality_score(&q);
    if score - floor > config.warn_tolerance {
        warn!(
            score,
            floor,
            converged = svd.converged,
            "orthogonality after Procrustes projection is unexpectedly poor"
        );
    }
    Ok(q)
}

/// `(1 − alpha)·W + alpha·Q` with `Q` the Procrustes projection of `W`.
pub fn apply_soft_procrustes_constraint(w: &Matrix, alpha: f64) -> AlignResult<Matrix> {
    apply_soft_procrustes_constraint_with(w, alpha, &ProcrustesConfig::default())
}

pub fn apply_soft_procrustes_constraint_with(
    w: &Matrix,
    alpha: f64,
    config: &ProcrustesConfig,
) -> AlignResult<Matrix> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(AlignError::invalid(format!("alpha must lie in [0, 1], got {alpha}")));
    }
    if alpha == 0.0 {
        return Ok(w.clone());
    }
    let q = procrustes_orthogonalize_with(w, config)?;
    if alpha == 1.0 {
        return Ok(q);
    }
    let mut blended = w.scale(1.0 - alpha);
    blended.axpy(alpha, &q)?;
    Ok(blended)
}

/// `‖WᵗW − I‖_F`; zero exactly when the columns are orthonormal.
pub fn compute_orthogonality_score(w: &Matrix) -> f64 {
    let g = gram(w);
    let n = g.rows();
    let mut acc = 0.0;
    for i in 0..n {
        for j in 0..n {
            let target = if i == j { 1.0 } else { 0.0 };
            let d = g[(i, j)] - target;
            acc += d * d;
        }
    }
    acc.sqrt()
}

pub fn is_orthogonal(w: &Matrix, tolerance: f64) -> bool {
    compute_orthogonality_score(w) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_of_symmetric_matrix() {
        let w = Matrix::from_rows(vec![vec![3.0, 1.0], vec![1.0, 3.0]]).unwrap();
        let q = procrustes_orthogonalize(&w).unwrap();
        assert!(compute_orthogonality_score(&q) < 1e-9);
        // Positive definite input projects to the identity.
        assert!(q.sub(&Matrix::identity(2)).unwrap().frobenius_norm() < 1e-9);
    }

    #[test]
    fn alpha_endpoints() {
        let w = Matrix::from_rows(vec![vec![2.0, 0.5], vec![-0.3, 1.5]]).unwrap();
        assert_eq!(apply_soft_procrustes_constraint(&w, 0.0).unwrap(), w);
        let full = apply_soft_procrustes_constraint(&w, 1.0).unwrap();
        assert!(is_orthogonal(&full, 1e-9));
        assert!(apply_soft_procrustes_constraint(&w, 1.5).is_err());
        assert!(apply_soft_procrustes_constraint(&w, f64::NAN).is_err());
    }

    #[test]
    fn tall_matrix_projects_to_orthonormal_columns() {
        let w = Matrix::from_rows(vec![vec![1.0, 2.0], vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let q = procrustes_orthogonalize(&w).unwrap();
        assert_eq!(q.shape(), (3, 2));
        assert!(compute_orthogonality_score(&q) < 1e-9);
    }
}
