//! Closed-form ridge learner.
//!
//! Derives the alignment directly from two weight matrices: the producing model's
//! output head `W_out` (`source_dim × vocab`) and the receiving model's input
//! embeddings `W_in` (`vocab × target_dim`):
//!
//! ```text
//! Wa = (W_out·W_outᵗ + λI)⁻¹ · W_out · W_in        (source_dim × target_dim)
//! ```
//!
//! `Wa` is the row-vector operator (`e = h·Wa`); the returned [`AlignmentMatrix`]
//! stores its transpose. A singular system is retried once with `λ × retry_factor`.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ridge_solve, rms_rows, AlignmentMatrix, AlignmentMethod};
use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::matrix::Matrix;
use crate::core::titan::svd::{compute_svd, condition_from_values, DEFAULT_SINGULAR_TOLERANCE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionEstimate {
    /// max/min absolute row sum of the regularized system; cheap.
    RowSumRatio,
    /// max/min singular value of the regularized system; exact but costs an SVD.
    Svd,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeConfig {
    pub lambda: f64,
    pub retry_factor: f64,
    pub pivot_tolerance: f64,
    pub condition_estimate: ConditionEstimate,
    /// Rows of `Wa` with every entry at or below this count as zero for the rank estimate.
    pub rank_tolerance: f64,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            lambda: 1e-4,
            retry_factor: 10.0,
            pivot_tolerance: 1e-12,
            condition_estimate: ConditionEstimate::RowSumRatio,
            rank_tolerance: 1e-10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RidgeAlignment {
    pub alignment: AlignmentMatrix,
    pub lambda_used: f64,
    pub retried: bool,
    pub condition_number: f64,
    pub condition_estimate: ConditionEstimate,
    pub rank_estimate: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RidgeAligner {
    config: RidgeConfig,
}

impl RidgeAligner {
    pub fn new(config: RidgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RidgeConfig {
        &self.config
    }

    pub fn derive(&self, w_in: &Matrix, w_out: &Matrix) -> AlignResult<RidgeAlignment> {
        let started = Instant::now();
        let cfg = &self.config;
        if w_in.is_empty() || w_out.is_empty() {
            return Err(AlignError::dimension("weight matrices must be non-empty"));
        }
        if w_in.rows() != w_out.cols() {
            return Err(AlignError::dimension(format!(
                "vocabulary mismatch: W_in has {} rows, W_out has {} columns",
                w_in.rows(),
                w_out.cols()
            )));
        }
        if !cfg.lambda.is_finite() || cfg.lambda < 0.0 {
            return Err(AlignError::invalid(format!("lambda must be finite and >= 0, got {}", cfg.lambda)));
        }

        // Vocab-major view of the output head.
        let a = w_out.transpose();
        let (wa, system, lambda_used, retried) = match ridge_solve(&a, w_in, cfg.lambda, cfg.pivot_tolerance) {
            Ok((wa, system)) => (wa, system, cfg.lambda, false),
            Err(AlignError::SingularMatrix(reason)) => {
                let bumped = cfg.lambda * cfg.retry_factor;
                warn!(lambda = cfg.lambda, bumped, %reason, "ridge system singular; retrying with larger lambda");
                match ridge_solve(&a, w_in, bumped, cfg.pivot_tolerance) {
                    Ok((wa, system)) => (wa, system, bumped, true),
                    Err(AlignError::SingularMatrix(reason)) => {
                        return Err(AlignError::singular(format!(
                            "ridge inversion failed with lambda={} and lambda={bumped}: {reason}",
                            cfg.lambda
                        )));
                    }
                    Err(other) => return Err(other),
                }
            }
            Err(other) => return Err(other),
        };

        let residual = a.matmul(&wa)?.sub(w_in)?;
        let epsilon = rms_rows(&residual);
        let condition_number = match cfg.condition_estimate {
            ConditionEstimate::RowSumRatio => row_sum_ratio(&system),
            ConditionEstimate::Svd => {
                condition_from_values(&compute_svd(&system)?.s, DEFAULT_SINGULAR_TOLERANCE)
            }
        };
        let rank_estimate = nonzero_rows(&wa, cfg.rank_tolerance);
        debug!(lambda_used, retried, condition_number, rank_estimate, epsilon, "ridge alignment derived");

        let alignment = AlignmentMatrix::new(wa.transpose(), None, AlignmentMethod::Ridge)?
            .with_epsilon(epsilon)
            .with_elapsed(started.elapsed());
        Ok(RidgeAlignment {
            alignment,
            lambda_used,
            retried,
            condition_number,
            condition_estimate: cfg.condition_estimate,
            rank_estimate,
        })
    }
}

/// Convenience wrapper with default settings and the given `lambda`.
pub fn compute_ridge_alignment(w_in: &Matrix, w_out: &Matrix, lambda: f64) -> AlignResult<RidgeAlignment> {
    RidgeAligner::new(RidgeConfig { lambda, ..RidgeConfig::default() }).derive(w_in, w_out)
}

/// Ratio of the largest to the smallest absolute row sum; infinite for a zero row.
pub fn row_sum_ratio(m: &Matrix) -> f64 {
    let sums: Vec<f64> = m.as_rows().iter().map(|r| r.iter().map(|v| v.abs()).sum()).collect();
    let max = sums.iter().copied().fold(0.0_f64, f64::max);
    let min = sums.iter().copied().fold(f64::INFINITY, f64::min);
    if min == 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

pub fn nonzero_rows(m: &Matrix, tolerance: f64) -> usize {
    m.as_rows().iter().filter(|r| r.iter().any(|v| v.abs() > tolerance)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_sum_ratio_of_diagonal() {
        let m = Matrix::diagonal(&[4.0, 2.0, 1.0]);
        assert_eq!(row_sum_ratio(&m), 4.0);
        assert!(row_sum_ratio(&Matrix::diagonal(&[1.0, 0.0])).is_infinite());
    }

    #[test]
    fn vocabulary_mismatch_is_dimension_error() {
        let w_in = Matrix::identity(3);
        let w_out = Matrix::zeros(3, 4);
        assert!(compute_ridge_alignment(&w_in, &w_out, 0.1).unwrap_err().is_dimension());
    }

    #[test]
    fn negative_lambda_rejected() {
        let w = Matrix::identity(2);
        let err = compute_ridge_alignment(&w, &w, -1.0).unwrap_err();
        assert!(matches!(err, AlignError::InvalidArgument(_)));
    }

    #[test]
    fn singular_after_bump_raises() {
        // Zero row in W_out makes the unregularized system singular; 0 × 10 stays 0.
        let w_in = Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let w_out = Matrix::from_rows(vec![vec![1.0, 0.0, 1.0], vec![0.0, 0.0, 0.0]]).unwrap();
        let err = compute_ridge_alignment(&w_in, &w_out, 0.0).unwrap_err();
        assert!(err.is_singular(), "{err}");
    }
}
