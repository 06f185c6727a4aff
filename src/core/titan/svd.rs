//! Singular value decomposition for general rectangular matrices.
//!
//! - `compute_svd`: `W = U·diag(S)·Vᵗ` with `S` sorted descending.
//! - 1×1 and 2×2 inputs use closed forms; everything else runs one-sided Jacobi
//!   (Hestenes) rotations over column pairs until a sweep applies no rotation.
//! - Wide matrices (`rows < cols`) are decomposed through their transpose.
//! - `truncate_svd`, `reconstruct_from_svd`, `compute_reconstruction_error` and
//!   `compute_condition_number` are the diagnostics used by the learners.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::linear_algebra::{dot, gram_schmidt, l2_norm};
use crate::core::titan::matrix::Matrix;

pub const DEFAULT_ROTATION_TOLERANCE: f64 = 1e-12;
pub const DEFAULT_SINGULAR_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_MAX_SWEEPS: usize = 100;

/// Tolerances and the sweep cap for the Jacobi iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvdConfig {
    /// Off-diagonal `|γ|` must exceed this times `sqrt(α·β)` for a pair to be rotated.
    pub rotation_tolerance: f64,
    /// Singular values at or below this are treated as zero.
    pub singular_tolerance: f64,
    pub max_sweeps: usize,
}

impl Default for SvdConfig {
    fn default() -> Self {
        Self {
            rotation_tolerance: DEFAULT_ROTATION_TOLERANCE,
            singular_tolerance: DEFAULT_SINGULAR_TOLERANCE,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SvdResult {
    /// `M×K`, orthonormal columns.
    pub u: Matrix,
    /// `K` non-negative values, descending.
    pub s: Vec<f64>,
    /// `N×K`, orthonormal columns.
    pub v: Matrix,
    /// Jacobi sweeps performed (0 for the closed forms).
    pub sweeps: usize,
    /// False when the sweep cap was hit; the factors are then best effort.
    pub converged: bool,
}

impl SvdResult {
    pub fn rank(&self, tolerance: f64) -> usize {
        self.s.iter().filter(|&&s| s > tolerance).count()
    }

    pub fn condition_number(&self) -> f64 {
        compute_condition_number(self)
    }
}

pub fn compute_svd(w: &Matrix) -> AlignResult<SvdResult> {
    compute_svd_with(w, &SvdConfig::default())
}

pub fn compute_svd_with(w: &Matrix, config: &SvdConfig) -> AlignResult<SvdResult> {
    if w.is_empty() {
        return Err(AlignError::dimension(format!(
            "cannot decompose a {}x{} matrix",
            w.rows(),
            w.cols()
        )));
    }
    if !w.is_finite() {
        return Err(AlignError::invalid("matrix contains NaN or infinite entries"));
    }

    let result = match w.shape() {
        (1, 1) => svd_1x1(w[(0, 0)]),
        (2, 2) => svd_2x2(w, config)?,
        (m, n) if m >= n => one_sided_jacobi(w, config)?,
        _ => {
            let t = one_sided_jacobi(&w.transpose(), config)?;
            SvdResult { u: t.v, s: t.s, v: t.u, sweeps: t.sweeps, converged: t.converged }
        }
    };
    debug!(
        rows = w.rows(),
        cols = w.cols(),
        sweeps = result.sweeps,
        converged = result.converged,
        "svd done"
    );
    Ok(result)
}

fn svd_1x1(a: f64) -> SvdResult {
    let sign = if a < 0.0 { -1.0 } else { 1.0 };
    SvdResult {
        u: Matrix::identity(1).scale(sign),
        s: vec![a.abs()],
        v: Matrix::identity(1),
        sweeps: 0,
        converged: true,
    }
}

/// Closed form: diagonalize `WᵗW = [[p, q], [q, r]]` with one rotation by
/// `θ = ½·atan2(2q, p − r)`, then `σᵢ = ‖W·vᵢ‖`, `uᵢ = W·vᵢ / σᵢ`.
fn svd_2x2(w: &Matrix, config: &SvdConfig) -> AlignResult<SvdResult> {
    let (a, b, c, d) = (w[(0, 0)], w[(0, 1)], w[(1, 0)], w[(1, 1)]);
    let p = a * a + c * c;
    let r = b * b + d * d;
    let q = a * b + c * d;

    let theta = 0.5 * (2.0 * q).atan2(p - r);
    let (sn, cs) = theta.sin_cos();
    let mut vs = [vec![cs, sn], vec![-sn, cs]];

    let mut sigma = [0.0; 2];
    let mut us = [vec![0.0; 2], vec![0.0; 2]];
    for k in 0..2 {
        let wv = w.mul_vec(&vs[k])?;
        sigma[k] = l2_norm(&wv);
        us[k] = unit_or_basis(&wv, sigma[k], k, config.singular_tolerance);
    }
    if sigma[1] > sigma[0] {
        sigma.swap(0, 1);
        us.swap(0, 1);
        vs.swap(0, 1);
    }

    Ok(SvdResult {
        u: gram_schmidt(&Matrix::from_columns(&us)?)?,
        s: sigma.to_vec(),
        v: Matrix::from_columns(&vs)?,
        sweeps: 0,
        converged: true,
    })
}

/// One-sided Jacobi for `rows >= cols`.
fn one_sided_jacobi(w: &Matrix, config: &SvdConfig) -> AlignResult<SvdResult> {
    let n = w.cols();
    // Column-major working copies: rotations touch whole columns.
    let mut a = w.columns();
    let mut v = Matrix::identity(n).columns();

    let mut sweeps = 0;
    let mut converged = false;
    let mut last_off = 0.0_f64;
    while sweeps < config.max_sweeps {
        sweeps += 1;
        let mut rotations = 0usize;
        last_off = 0.0;
        for i in 0..n.saturating_sub(1) {
            for j in (i + 1)..n {
                let alpha = dot(&a[i], &a[i]);
                let beta = dot(&a[j], &a[j]);
                let gamma = dot(&a[i], &a[j]);
                let scale = (alpha * beta).sqrt();
                if gamma == 0.0 || gamma.abs() <= config.rotation_tolerance * scale {
                    continue;
                }
                last_off = last_off.max(gamma.abs() / scale);
                rotations += 1;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                rotate_pair(&mut a, i, j, c, s);
                rotate_pair(&mut v, i, j, c, s);
            }
        }
        #[cfg(feature = "debug-metrics")]
        debug!(sweep = sweeps, rotations, "jacobi sweep");
        if rotations == 0 {
            converged = true;
            break;
        }
    }
    if !converged {
        warn!(
            sweeps,
            residual_off_diagonal = last_off,
            "Jacobi SVD did not converge within the sweep cap; returning best-effort factors"
        );
    }

    let norms: Vec<f64> = a.iter().map(|col| l2_norm(col)).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| norms[y].total_cmp(&norms[x]));

    let s: Vec<f64> = order.iter().map(|&k| norms[k]).collect();
    let u_cols: Vec<Vec<f64>> = order
        .iter()
        .map(|&k| unit_or_basis(&a[k], norms[k], k, config.singular_tolerance))
        .collect();
    let v_cols: Vec<Vec<f64>> = order.iter().map(|&k| v[k].clone()).collect();

    Ok(SvdResult {
        u: gram_schmidt(&Matrix::from_columns(&u_cols)?)?,
        s,
        v: gram_schmidt(&Matrix::from_columns(&v_cols)?)?,
        sweeps,
        converged,
    })
}

fn rotate_pair(cols: &mut [Vec<f64>], i: usize, j: usize, c: f64, s: f64) {
    let (head, tail) = cols.split_at_mut(j);
    let (ci, cj) = (&mut head[i], &mut tail[0]);
    for (x, y) in ci.iter_mut().zip(cj.iter_mut()) {
        let xi = *x;
        let yj = *y;
        *x = c * xi - s * yj;
        *y = s * xi + c * yj;
    }
}

/// `v / norm`, or the `k`-th standard basis vector when the column has vanished.
/// Gram-Schmidt afterwards makes any fallback orthogonal to the rest.
fn unit_or_basis(v: &[f64], norm: f64, k: usize, tolerance: f64) -> Vec<f64> {
    if norm > tolerance {
        v.iter().map(|x| x / norm).collect()
    } else {
        let mut e = vec![0.0; v.len()];
        e[k % v.len()] = 1.0;
        e
    }
}

/// `max(σ) / min(σ)` over the usable singular values; infinite when none are usable.
pub fn compute_condition_number(svd: &SvdResult) -> f64 {
    condition_from_values(&svd.s, DEFAULT_SINGULAR_TOLERANCE)
}

pub fn condition_from_values(values: &[f64], tolerance: f64) -> f64 {
    let usable: Vec<f64> = values.iter().copied().filter(|&s| s > tolerance).collect();
    if usable.is_empty() {
        return f64::INFINITY;
    }
    let max = usable.iter().copied().fold(f64::MIN, f64::max);
    let min = usable.iter().copied().fold(f64::MAX, f64::min);
    max / min
}

/// Drop singular values below `threshold`, always keeping at least the largest.
pub fn truncate_svd(svd: &SvdResult, threshold: f64) -> SvdResult {
    let keep = svd.s.iter().take_while(|&&s| s >= threshold).count().max(1);
    truncate_to_rank(svd, keep)
}

/// Keep the leading `k` triplets (at least one).
pub fn truncate_to_rank(svd: &SvdResult, k: usize) -> SvdResult {
    let keep = k.clamp(1, svd.s.len().max(1));
    SvdResult {
        u: svd.u.truncate_columns(keep),
        s: svd.s.iter().copied().take(keep).collect(),
        v: svd.v.truncate_columns(keep),
        sweeps: svd.sweeps,
        converged: svd.converged,
    }
}

pub fn reconstruct_from_svd(svd: &SvdResult) -> AlignResult<Matrix> {
    if svd.u.cols() != svd.s.len() || svd.v.cols() != svd.s.len() {
        return Err(AlignError::dimension(format!(
            "inconsistent factors: U has {} columns, V has {}, S has {} values",
            svd.u.cols(),
            svd.v.cols(),
            svd.s.len()
        )));
    }
    let us = Matrix::from_fn(svd.u.rows(), svd.s.len(), |i, k| svd.u[(i, k)] * svd.s[k]);
    us.matmul(&svd.v.transpose())
}

/// `‖W − U·diag(S)·Vᵗ‖_F`.
pub fn compute_reconstruction_error(w: &Matrix, svd: &SvdResult) -> AlignResult<f64> {
    Ok(w.sub(&reconstruct_from_svd(svd)?)?.frobenius_norm())
}

/// Best rank-`k` approximation of `w` (Eckart–Young).
pub fn low_rank_approximation(w: &Matrix, k: usize) -> AlignResult<Matrix> {
    reconstruct_from_svd(&truncate_to_rank(&compute_svd(w)?, k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: Vec<Vec<f64>>) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn one_by_one_keeps_sign_in_u() {
        let svd = compute_svd(&m(vec![vec![-3.0]])).unwrap();
        assert_eq!(svd.s, vec![3.0]);
        assert_eq!(svd.u[(0, 0)], -1.0);
        assert!(compute_reconstruction_error(&m(vec![vec![-3.0]]), &svd).unwrap() < 1e-15);
    }

    #[test]
    fn symmetric_two_by_two_closed_form() {
        let w = m(vec![vec![3.0, 1.0], vec![1.0, 3.0]]);
        let svd = compute_svd(&w).unwrap();
        assert!((svd.s[0] - 4.0).abs() < 1e-12, "s={:?}", svd.s);
        assert!((svd.s[1] - 2.0).abs() < 1e-12, "s={:?}", svd.s);
        assert_eq!(svd.sweeps, 0);
        assert!(compute_reconstruction_error(&w, &svd).unwrap() < 1e-12);
    }

    #[test]
    fn rank_one_two_by_two_falls_back_to_basis() {
        let w = m(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        let svd = compute_svd(&w).unwrap();
        assert!(svd.s[1] < 1e-12);
        assert_eq!(svd.rank(1e-10), 1);
        assert!(compute_reconstruction_error(&w, &svd).unwrap() < 1e-12);
    }

    #[test]
    fn wide_matrix_goes_through_transpose() {
        let w = m(vec![vec![1.0, 0.0, 2.0], vec![0.0, 3.0, 0.0]]);
        let svd = compute_svd(&w).unwrap();
        assert_eq!(svd.u.shape(), (2, 2));
        assert_eq!(svd.v.shape(), (3, 2));
        assert!((svd.s[0] - 3.0).abs() < 1e-12);
        assert!((svd.s[1] - 5.0_f64.sqrt()).abs() < 1e-12);
        assert!(compute_reconstruction_error(&w, &svd).unwrap() < 1e-10);
    }

    #[test]
    fn empty_matrix_is_dimension_error() {
        assert!(compute_svd(&Matrix::zeros(0, 3)).unwrap_err().is_dimension());
    }

    #[test]
    fn zero_matrix_has_infinite_condition() {
        let svd = compute_svd(&Matrix::zeros(3, 3)).unwrap();
        assert!(svd.s.iter().all(|&s| s == 0.0));
        assert!(compute_condition_number(&svd).is_infinite());
    }

    #[test]
    fn truncation_keeps_at_least_one() {
        let w = m(vec![vec![2.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 0.5]]);
        let svd = compute_svd(&w).unwrap();
        assert_eq!(truncate_svd(&svd, 0.75).s.len(), 2);
        assert_eq!(truncate_svd(&svd, 100.0).s.len(), 1);
        let t = truncate_svd(&svd, 0.75);
        assert_eq!(t.u.cols(), 2);
        assert_eq!(t.v.cols(), 2);
    }

    #[test]
    fn sweep_cap_is_reported() {
        let w = m(vec![vec![4.0, 1.0, 2.0], vec![1.0, 3.0, 0.5], vec![2.0, 0.5, 5.0]]);
        let cfg = SvdConfig { max_sweeps: 1, ..SvdConfig::default() };
        let svd = compute_svd_with(&w, &cfg).unwrap();
        assert_eq!(svd.sweeps, 1);
        assert!(!svd.converged);
    }
}
