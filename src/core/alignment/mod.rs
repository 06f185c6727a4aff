//! Alignment matrices ("W-matrices") and the learners that produce them.
//!
//! Every learner returns the same [`AlignmentMatrix`]: weights of shape
//! `target_dim × source_dim` applied as `y = W·x + b`, plus the residual loss
//! (`epsilon`, root-mean-square residual norm) and the orthogonality score.
//!
//! | Learner | Input | Module |
//! |---------|-------|--------|
//! | closed-form ridge | two weight matrices | [`ridge`] |
//! | mini-batch gradient | paired hidden states | [`gradient`] |
//! | anchor Procrustes / least squares + low-rank fix | paired hidden states | [`anchor`] |

pub mod anchor;
pub mod gradient;
pub mod ridge;
pub mod synthetic;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::linear_algebra::{gram, l2_norm, matrix_inverse, stack_rows};
use crate::core::titan::matrix::Matrix;
use crate::core::titan::procrustes::{compute_orthogonality_score, procrustes_orthogonalize_with, ProcrustesConfig};

/// A model's hidden state at one layer, as extracted by the caller.
pub type HiddenState = Vec<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    Identity,
    Ridge,
    Gradient,
    Anchor,
    Procrustes,
}

impl AlignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentMethod::Identity => "identity",
            AlignmentMethod::Ridge => "ridge",
            AlignmentMethod::Gradient => "gradient",
            AlignmentMethod::Anchor => "anchor",
            AlignmentMethod::Procrustes => "procrustes",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetadata {
    pub source_dim: usize,
    pub target_dim: usize,
    pub method: AlignmentMethod,
    /// RFC 3339 creation time.
    pub created_at: String,
    pub computation_time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMatrix {
    pub weights: Matrix,
    #[serde(default)]
    pub bias: Option<Vec<f64>>,
    pub epsilon: f64,
    pub orthogonality_score: f64,
    pub metadata: AlignmentMetadata,
}

impl AlignmentMatrix {
    pub fn new(weights: Matrix, bias: Option<Vec<f64>>, method: AlignmentMethod) -> AlignResult<Self> {
        if weights.is_empty() {
            return Err(AlignError::dimension("alignment weights must be non-empty"));
        }
        if let Some(b) = &bias {
            if b.len() != weights.rows() {
                return Err(AlignError::dimension(format!(
                    "bias has length {}, expected target dimension {}",
                    b.len(),
                    weights.rows()
                )));
            }
        }
        let metadata = AlignmentMetadata {
            source_dim: weights.cols(),
            target_dim: weights.rows(),
            method,
            created_at: chrono::Utc::now().to_rfc3339(),
            computation_time_ms: 0,
        };
        let orthogonality_score = compute_orthogonality_score(&weights);
        Ok(Self { weights, bias, epsilon: 0.0, orthogonality_score, metadata })
    }

    pub fn identity(dim: usize) -> Self {
        let weights = Matrix::identity(dim);
        Self {
            orthogonality_score: 0.0,
            epsilon: 0.0,
            bias: None,
            metadata: AlignmentMetadata {
                source_dim: dim,
                target_dim: dim,
                method: AlignmentMethod::Identity,
                created_at: chrono::Utc::now().to_rfc3339(),
                computation_time_ms: 0,
            },
            weights,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.metadata.computation_time_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn source_dim(&self) -> usize { self.weights.cols() }
    pub fn target_dim(&self) -> usize { self.weights.rows() }

    /// `W·x + b`.
    pub fn apply(&self, x: &[f64]) -> AlignResult<Vec<f64>> {
        let mut y = self.weights.mul_vec(x)?;
        if let Some(b) = &self.bias {
            for (yi, bi) in y.iter_mut().zip(b) {
                *yi += bi;
            }
        }
        Ok(y)
    }

    pub fn apply_batch(&self, xs: &[HiddenState]) -> AlignResult<Vec<HiddenState>> {
        xs.iter().map(|x| self.apply(x)).collect()
    }

    /// Squared alignment loss `‖W·x + b − y‖²` for one pair.
    pub fn compute_epsilon(&self, source: &[f64], target: &[f64]) -> AlignResult<f64> {
        let y = self.apply(source)?;
        if y.len() != target.len() {
            return Err(AlignError::dimension(format!(
                "target has length {}, expected {}",
                target.len(),
                y.len()
            )));
        }
        Ok(y.iter().zip(target).map(|(a, b)| (a - b) * (a - b)).sum())
    }

    /// Root-mean-square residual norm over paired samples.
    pub fn rms_epsilon(&self, sources: &[HiddenState], targets: &[HiddenState]) -> AlignResult<f64> {
        if sources.len() != targets.len() || sources.is_empty() {
            return Err(AlignError::dimension(format!(
                "need equal, non-empty sample sets ({} vs {})",
                sources.len(),
                targets.len()
            )));
        }
        let mut total = 0.0;
        for (x, y) in sources.iter().zip(targets) {
            total += self.compute_epsilon(x, y)?;
        }
        Ok((total / sources.len() as f64).sqrt())
    }

    /// `1 / (1 + epsilon)`; higher is better.
    pub fn fidelity_score(&self) -> f64 {
        1.0 / (1.0 + self.epsilon)
    }

    /// Percentage by which `epsilon` undercuts `baseline_epsilon`, in `[0, 100]`.
    pub fn fidelity_boost(&self, baseline_epsilon: f64) -> f64 {
        fidelity_boost_pct(self.epsilon, baseline_epsilon)
    }

    /// Replace the weights with their Procrustes projection.
    pub fn orthogonalized(&self, config: &ProcrustesConfig) -> AlignResult<Self> {
        let weights = procrustes_orthogonalize_with(&self.weights, config)?;
        let mut out = self.clone();
        out.orthogonality_score = compute_orthogonality_score(&weights);
        out.weights = weights;
        out.metadata.method = AlignmentMethod::Procrustes;
        Ok(out)
    }

    pub fn to_json(&self) -> AlignResult<String> {
        serde_json::to_string(self).map_err(|e| AlignError::invalid(format!("serialize alignment: {e}")))
    }

    pub fn from_json(json: &str) -> AlignResult<Self> {
        let m: AlignmentMatrix = serde_json::from_str(json)
            .map_err(|e| AlignError::invalid(format!("parse alignment: {e}")))?;
        m.validate()?;
        Ok(m)
    }

    /// Shape checks for matrices that did not come through [`AlignmentMatrix::new`].
    pub fn validate(&self) -> AlignResult<()> {
        if self.weights.is_empty() {
            return Err(AlignError::dimension("alignment weights are empty"));
        }
        if let Some(b) = &self.bias {
            if b.len() != self.weights.rows() {
                return Err(AlignError::dimension("bias length does not match weights"));
            }
        }
        if self.metadata.source_dim != self.weights.cols() || self.metadata.target_dim != self.weights.rows() {
            return Err(AlignError::dimension("metadata dimensions do not match weights"));
        }
        Ok(())
    }
}

/// Solve `X = (AᵗA + λI)⁻¹·Aᵗ·B`; also returns the regularized system matrix.
pub(crate) fn ridge_solve(
    a: &Matrix,
    b: &Matrix,
    lambda: f64,
    pivot_tolerance: f64,
) -> AlignResult<(Matrix, Matrix)> {
    if a.rows() != b.rows() {
        return Err(AlignError::dimension(format!(
            "least squares needs matching rows ({} vs {})",
            a.rows(),
            b.rows()
        )));
    }
    let mut system = gram(a);
    for i in 0..system.rows() {
        system[(i, i)] += lambda;
    }
    let inv = matrix_inverse(&system, pivot_tolerance)?;
    let atb = a.transpose().matmul(b)?;
    Ok((inv.matmul(&atb)?, system))
}

/// Validate paired samples and stack them into `n×d_in`, `n×d_out` matrices.
pub(crate) fn stack_pairs(source: &[HiddenState], target: &[HiddenState]) -> AlignResult<(Matrix, Matrix)> {
    if source.len() != target.len() {
        return Err(AlignError::dimension(format!(
            "source has {} samples, target has {}",
            source.len(),
            target.len()
        )));
    }
    if source.is_empty() {
        return Err(AlignError::dimension("no paired samples supplied"));
    }
    let x = stack_rows(source)?;
    let y = stack_rows(target)?;
    if x.cols() == 0 || y.cols() == 0 {
        return Err(AlignError::dimension("hidden states must have at least one dimension"));
    }
    if !x.is_finite() || !y.is_finite() {
        return Err(AlignError::invalid("hidden states contain NaN or infinite values"));
    }
    Ok((x, y))
}

/// Root-mean-square row norm of `residual`.
pub(crate) fn rms_rows(residual: &Matrix) -> f64 {
    if residual.rows() == 0 {
        return 0.0;
    }
    let total: f64 = residual.as_rows().iter().map(|r| l2_norm(r).powi(2)).sum();
    (total / residual.rows() as f64).sqrt()
}

/// Baseline loss assumed when no unaligned measurement is available.
pub const DEFAULT_BASELINE_EPSILON: f64 = 0.1;

pub(crate) fn fidelity_boost_pct(epsilon: f64, baseline_epsilon: f64) -> f64 {
    if baseline_epsilon.is_nan() || baseline_epsilon <= 0.0 || epsilon >= baseline_epsilon {
        return 0.0;
    }
    ((baseline_epsilon - epsilon) / baseline_epsilon * 100.0).clamp(0.0, 100.0)
}
