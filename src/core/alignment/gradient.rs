//! Iterative gradient learner.
//!
//! Mini-batch gradient descent on `mean‖W·x + b − y‖² + λ‖W‖²` with a soft
//! Procrustes pull toward orthogonality after every batch and patience-based
//! early stopping on the validation loss. The weights of the best validation
//! epoch are the ones returned.

use std::time::Instant;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{stack_pairs, AlignmentMatrix, AlignmentMethod, HiddenState};
use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::matrix::Matrix;
use crate::core::titan::procrustes::{apply_soft_procrustes_constraint_with, compute_orthogonality_score, ProcrustesConfig};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// L2 penalty `λ` on the weights.
    pub l2_lambda: f64,
    /// Soft Procrustes blend applied after every mini-batch; 0 disables it.
    pub orthogonality_weight: f64,
    /// Fraction of samples held out for validation.
    pub validation_split: f64,
    pub patience: usize,
    /// Minimum validation decrease that counts as an improvement.
    pub min_delta: f64,
    pub seed: Option<u64>,
    pub procrustes: ProcrustesConfig,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            epochs: 100,
            batch_size: 32,
            l2_lambda: 1e-4,
            orthogonality_weight: 0.01,
            validation_split: 0.2,
            patience: 10,
            min_delta: 0.0,
            seed: None,
            procrustes: ProcrustesConfig::default(),
        }
    }
}

/// Output of one training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub alignment: AlignmentMatrix,
    /// Full-pass training objective after each epoch (data term + L2 term).
    pub train_losses: Vec<f64>,
    /// Validation MSE after each epoch.
    pub validation_losses: Vec<f64>,
    pub best_validation_loss: f64,
    /// 1-based epoch whose weights were kept.
    pub convergence_epoch: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub orthogonality_score: f64,
}

#[derive(Clone, Debug, Default)]
pub struct GradientAligner {
    config: GradientConfig,
}

impl GradientAligner {
    pub fn new(config: GradientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GradientConfig {
        &self.config
    }

    pub fn train(&self, source: &[HiddenState], target: &[HiddenState]) -> AlignResult<TrainingResult> {
        let started = Instant::now();
        let cfg = &self.config;
        validate_config(cfg)?;
        let (x, y) = stack_pairs(source, target)?;
        let (n, d_in, d_out) = (x.rows(), x.cols(), y.cols());

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let n_val = validation_count(n, cfg.validation_split);
        let (val_idx, train_idx) = order.split_at(n_val);
        let mut train_idx = train_idx.to_vec();
        // Without a held-out split, validate on the training samples.
        let val_idx: Vec<usize> = if val_idx.is_empty() { train_idx.clone() } else { val_idx.to_vec() };

        let mut w = xavier_uniform(d_out, d_in, &mut rng);
        let mut b = vec![0.0; d_out];

        let mut train_losses = Vec::with_capacity(cfg.epochs);
        let mut validation_losses = Vec::with_capacity(cfg.epochs);
        let mut best_loss = f64::INFINITY;
        let mut best = (w.clone(), b.clone());
        let mut best_epoch = 0;
        let mut stale = 0;
        let mut stopped_early = false;

        for epoch in 1..=cfg.epochs {
            train_idx.shuffle(&mut rng);
            for batch in train_idx.chunks(cfg.batch_size) {
                let (dw, db) = gradients(&w, &b, &x, &y, batch, cfg.l2_lambda)?;
                w.axpy(-cfg.learning_rate, &dw)?;
                for (bi, gi) in b.iter_mut().zip(&db) {
                    *bi -= cfg.learning_rate * gi;
                }
                if cfg.orthogonality_weight > 0.0 {
                    w = apply_soft_procrustes_constraint_with(&w, cfg.orthogonality_weight, &cfg.procrustes)?;
                }
            }

            let l2 = cfg.l2_lambda * w.frobenius_norm().powi(2);
            let train_loss = mse(&w, &b, &x, &y, &train_idx) + l2;
            let val_loss = mse(&w, &b, &x, &y, &val_idx);
            train_losses.push(train_loss);
            validation_losses.push(val_loss);
            debug!(epoch, train_loss, val_loss, "gradient epoch");

            if !val_loss.is_finite() {
                warn!(epoch, "validation loss diverged; keeping best weights so far");
                stopped_early = true;
                break;
            }
            if val_loss < best_loss - cfg.min_delta {
                best_loss = val_loss;
                best = (w.clone(), b.clone());
                best_epoch = epoch;
                stale = 0;
            } else {
                stale += 1;
                if stale >= cfg.patience {
                    debug!(epoch, best_epoch, "early stopping");
                    stopped_early = true;
                    break;
                }
            }
        }

        let epochs_run = validation_losses.len();
        let (best_w, best_b) = best;
        let orthogonality_score = compute_orthogonality_score(&best_w);
        let alignment = AlignmentMatrix::new(best_w, Some(best_b), AlignmentMethod::Gradient)?
            .with_epsilon(best_loss.sqrt())
            .with_elapsed(started.elapsed());
        debug!(epochs_run, best_epoch, epsilon = alignment.epsilon, orthogonality_score, "gradient training done");

        Ok(TrainingResult {
            alignment,
            train_losses,
            validation_losses,
            best_validation_loss: best_loss,
            convergence_epoch: best_epoch,
            epochs_run,
            stopped_early,
            orthogonality_score,
        })
    }
}

fn validate_config(cfg: &GradientConfig) -> AlignResult<()> {
    if !(cfg.learning_rate.is_finite() && cfg.learning_rate > 0.0) {
        return Err(AlignError::invalid("learning_rate must be positive"));
    }
    if cfg.epochs == 0 || cfg.batch_size == 0 {
        return Err(AlignError::invalid("epochs and batch_size must be at least 1"));
    }
    if !(0.0..1.0).contains(&cfg.validation_split) {
        return Err(AlignError::invalid("validation_split must lie in [0, 1)"));
    }
    if !(0.0..=1.0).contains(&cfg.orthogonality_weight) {
        return Err(AlignError::invalid("orthogonality_weight must lie in [0, 1]"));
    }
    if !(cfg.l2_lambda.is_finite() && cfg.l2_lambda >= 0.0) {
        return Err(AlignError::invalid("l2_lambda must be finite and >= 0"));
    }
    Ok(())
}

/// Held-out count: rounded fraction, but never all samples and at least one when requested.
fn validation_count(n: usize, split: f64) -> usize {
    if split <= 0.0 || n < 2 {
        return 0;
    }
    ((n as f64 * split).round() as usize).clamp(1, n - 1)
}

/// Xavier uniform initialization, `U(−s, s)` with `s = sqrt(2 / (fan_in + fan_out))`.
pub fn xavier_uniform(rows: usize, cols: usize, rng: &mut StdRng) -> Matrix {
    let s = (2.0 / (rows + cols) as f64).sqrt();
    let dist = Uniform::new_inclusive(-s, s);
    Matrix::from_fn(rows, cols, |_, _| dist.sample(&mut *rng))
}

/// Closed-form MSE + L2 gradients over one batch of sample indices.
fn gradients(
    w: &Matrix,
    b: &[f64],
    x: &Matrix,
    y: &Matrix,
    batch: &[usize],
    lambda: f64,
) -> AlignResult<(Matrix, Vec<f64>)> {
    let (d_out, d_in) = w.shape();
    let mut dw = Matrix::zeros(d_out, d_in);
    let mut db = vec![0.0; d_out];
    let scale = 2.0 / batch.len() as f64;
    for &idx in batch {
        let xi = x.row(idx);
        let r = residual(w, b, xi, y.row(idx));
        for (o, &ro) in r.iter().enumerate() {
            db[o] += scale * ro;
            if ro == 0.0 {
                continue;
            }
            for (k, &xk) in xi.iter().enumerate() {
                dw[(o, k)] += scale * ro * xk;
            }
        }
    }
    if lambda > 0.0 {
        dw.axpy(2.0 * lambda, w)?;
    }
    Ok((dw, db))
}

fn residual(w: &Matrix, b: &[f64], x: &[f64], y: &[f64]) -> Vec<f64> {
    w.as_rows()
        .iter()
        .zip(b)
        .zip(y)
        .map(|((row, bi), yi)| row.iter().zip(x).map(|(a, c)| a * c).sum::<f64>() + bi - yi)
        .collect()
}

fn mse(w: &Matrix, b: &[f64], x: &Matrix, y: &Matrix, idx: &[usize]) -> f64 {
    if idx.is_empty() {
        return 0.0;
    }
    let total: f64 = idx
        .iter()
        .map(|&i| residual(w, b, x.row(i), y.row(i)).iter().map(|r| r * r).sum::<f64>())
        .sum();
    total / idx.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_count_bounds() {
        assert_eq!(validation_count(100, 0.2), 20);
        assert_eq!(validation_count(3, 0.01), 1);
        assert_eq!(validation_count(2, 0.9), 1);
        assert_eq!(validation_count(10, 0.0), 0);
        assert_eq!(validation_count(1, 0.5), 0);
    }

    #[test]
    fn xavier_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let w = xavier_uniform(8, 24, &mut rng);
        let s = (2.0_f64 / 32.0).sqrt();
        assert!(w.as_rows().iter().flatten().all(|v| v.abs() <= s));
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let x = Matrix::from_rows(vec![vec![1.0, -2.0], vec![0.5, 0.3]]).unwrap();
        let y = Matrix::from_rows(vec![vec![0.2, 1.0, -1.0], vec![0.0, 0.4, 0.6]]).unwrap();
        let w = Matrix::from_rows(vec![vec![0.1, 0.2], vec![-0.3, 0.4], vec![0.5, -0.6]]).unwrap();
        let b = vec![0.05, -0.1, 0.2];
        let lambda = 0.01;
        let idx = [0usize, 1];
        let (dw, _) = gradients(&w, &b, &x, &y, &idx, lambda).unwrap();
        let objective = |w: &Matrix| mse(w, &b, &x, &y, &idx) + lambda * w.frobenius_norm().powi(2);
        let h = 1e-6;
        let mut wp = w.clone();
        wp[(1, 0)] += h;
        let mut wm = w.clone();
        wm[(1, 0)] -= h;
        let numeric = (objective(&wp) - objective(&wm)) / (2.0 * h);
        assert!((numeric - dw[(1, 0)]).abs() < 1e-6, "numeric={numeric} analytic={}", dw[(1, 0)]);
    }

    #[test]
    fn mismatched_sample_counts_rejected() {
        let err = GradientAligner::default()
            .train(&[vec![1.0], vec![2.0]], &[vec![1.0]])
            .unwrap_err();
        assert!(err.is_dimension());
    }
}
