//! Anchor-point learner: closed-form alignment from paired hidden states.
//!
//! Same dimension on both sides → orthogonal Procrustes on the cross-covariance
//! `Yᵗ·X`. Different dimensions → ridge least squares. An optional low-rank
//! correction then fits the remaining residual and keeps only its best rank-k
//! part, folded into the weights.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{fidelity_boost_pct, ridge_solve, rms_rows, stack_pairs, AlignmentMatrix, AlignmentMethod, HiddenState};
use crate::core::error::AlignResult;
use crate::core::titan::matrix::Matrix;
use crate::core::titan::procrustes::{procrustes_orthogonalize_with, ProcrustesConfig};
use crate::core::titan::svd::{compute_svd_with, low_rank_approximation};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Ridge term for the least-squares solves.
    pub lambda: f64,
    pub pivot_tolerance: f64,
    pub low_rank_correction: bool,
    pub lora_rank: usize,
    pub procrustes: ProcrustesConfig,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            lambda: 1e-6,
            pivot_tolerance: 1e-14,
            low_rank_correction: true,
            lora_rank: 64,
            procrustes: ProcrustesConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorAlignment {
    pub alignment: AlignmentMatrix,
    pub base_epsilon: f64,
    pub final_epsilon: f64,
    /// Rank of the folded correction; 0 when none was applied.
    pub lora_rank: usize,
    pub improvement_pct: f64,
    pub information_retention: f64,
    pub fidelity_score: f64,
}

pub fn align_anchor_points(
    source: &[HiddenState],
    target: &[HiddenState],
    config: &AnchorConfig,
) -> AlignResult<AnchorAlignment> {
    let started = Instant::now();
    let (x, y) = stack_pairs(source, target)?;
    let (d_in, d_out) = (x.cols(), y.cols());

    // Row convention throughout: aligned = X·Wᵗ.
    let mut wt = if d_in == d_out {
        let cross = y.transpose().matmul(&x)?;
        procrustes_orthogonalize_with(&cross, &config.procrustes)?.transpose()
    } else {
        ridge_solve(&x, &y, config.lambda, config.pivot_tolerance)?.0
    };
    let residual = y.sub(&x.matmul(&wt)?)?;
    let base_epsilon = rms_rows(&residual);

    let mut final_epsilon = base_epsilon;
    let mut lora_rank = 0;
    if config.low_rank_correction && config.lora_rank > 0 {
        let (correction, _) = ridge_solve(&x, &residual, config.lambda, config.pivot_tolerance)?;
        let k = config.lora_rank.min(d_in).min(d_out);
        let low_rank = low_rank_approximation(&correction, k)?;
        wt = wt.add(&low_rank)?;
        final_epsilon = rms_rows(&y.sub(&x.matmul(&wt)?)?);
        lora_rank = k;
    }

    let aligned = x.matmul(&wt)?;
    let information_retention = information_retention(&x, &aligned, config)?;
    let improvement_pct = fidelity_boost_pct(final_epsilon, base_epsilon);
    debug!(d_in, d_out, base_epsilon, final_epsilon, lora_rank, information_retention, "anchor alignment");

    let alignment = AlignmentMatrix::new(wt.transpose(), None, AlignmentMethod::Anchor)?
        .with_epsilon(final_epsilon)
        .with_elapsed(started.elapsed());
    Ok(AnchorAlignment {
        fidelity_score: alignment.fidelity_score(),
        alignment,
        base_epsilon,
        final_epsilon,
        lora_rank,
        improvement_pct,
        information_retention,
    })
}

/// `exp(−KL)` between the normalized singular spectra of the source samples and
/// the aligned samples, compared over their common length. 1 means the aligned
/// set spreads energy across directions exactly like the source set.
fn information_retention(source: &Matrix, aligned: &Matrix, config: &AnchorConfig) -> AlignResult<f64> {
    let s_src = compute_svd_with(source, &config.procrustes.svd)?.s;
    let s_out = compute_svd_with(aligned, &config.procrustes.svd)?.s;
    let k = s_src.len().min(s_out.len());
    let p = normalized(&s_src[..k]);
    let q = normalized(&s_out[..k]);
    let kl: f64 = p
        .iter()
        .zip(&q)
        .map(|(pi, qi)| pi * ((pi + 1e-10) / (qi + 1e-10)).ln())
        .sum();
    Ok((-kl).exp())
}

fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| v / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::titan::linear_algebra::random_orthogonal;

    #[test]
    fn recovers_a_rotation_exactly() {
        let r = random_orthogonal(4, 11).unwrap();
        let xs: Vec<Vec<f64>> = (0..12)
            .map(|i| (0..4).map(|j| ((i * 7 + j * 3) % 5) as f64 - 2.0 + 0.1 * j as f64).collect())
            .collect();
        let ys: Vec<Vec<f64>> = xs.iter().map(|x| r.mul_vec(x).unwrap()).collect();
        let cfg = AnchorConfig { low_rank_correction: false, ..AnchorConfig::default() };
        let out = align_anchor_points(&xs, &ys, &cfg).unwrap();
        assert!(out.base_epsilon < 1e-8, "eps={}", out.base_epsilon);
        assert!(out.alignment.weights.sub(&r).unwrap().frobenius_norm() < 1e-8);
        assert!((out.information_retention - 1.0).abs() < 1e-6);
    }
}
