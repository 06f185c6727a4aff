//! Latent rollout: repeated alignment + simulated inference on one latent vector.
//!
//! Each step `t → t+1`:
//! 1. `e = W·h_t` (the `h_t·Wa` product in row-vector form),
//! 2. L2-normalize `e`,
//! 3. `candidate = forward(e)`,
//! 4. drift `|‖candidate‖ / ‖h₀‖ − 1|` is recorded,
//! 5. with protection on and drift above threshold, the candidate is rescaled to `‖h₀‖`.
//!    A zero candidate has no direction; it falls back to the direction of `h_t`.
//!
//! The loop always runs exactly `steps` iterations. Drift is never an error.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::alignment::AlignmentMatrix;
use crate::core::error::{AlignError, AlignResult};
use crate::core::kv_cache::KvCacheState;
use crate::core::titan::linear_algebra::{l2_norm, normalize, scale_to_norm};
use crate::core::titan::procrustes::ProcrustesConfig;

/// Rollouts longer than this are allowed but logged.
pub const RECOMMENDED_MAX_STEPS: usize = 80;
/// Gain of the default simulated forward step.
pub const SIMULATED_FORWARD_GAIN: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub steps: usize,
    pub drift_threshold: f64,
    pub drift_protection: bool,
    /// Project the alignment onto the orthogonal manifold before rolling out.
    pub orthogonalize: bool,
    /// Record `(h_t, h_{t+1})` in the session's KV cache.
    pub record_kv: bool,
    /// SVD/Procrustes settings used when `orthogonalize` is on.
    pub procrustes: ProcrustesConfig,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            drift_threshold: 0.5,
            drift_protection: true,
            orthogonalize: false,
            record_kv: true,
            procrustes: ProcrustesConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftMetrics {
    pub max_drift: f64,
    pub avg_drift: f64,
    pub drift_detected: bool,
    /// Steps whose candidate was renormalized.
    pub corrections: usize,
    /// `|d − 1|` per step, in order.
    pub trace: Vec<f64>,
}

impl DriftMetrics {
    fn from_trace(trace: Vec<f64>, threshold: f64, corrections: usize) -> Self {
        let max_drift = trace.iter().copied().fold(0.0_f64, f64::max);
        let avg_drift = if trace.is_empty() { 0.0 } else { trace.iter().sum::<f64>() / trace.len() as f64 };
        Self { max_drift, avg_drift, drift_detected: max_drift > threshold, corrections, trace }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatentRolloutResult {
    /// `h_steps`; equals `h₀` when `steps == 0`.
    pub latent_thought: Vec<f64>,
    /// Accepted `h_1 … h_steps`.
    pub trajectory: Vec<Vec<f64>>,
    pub drift: DriftMetrics,
    /// The session cache, handed back when the session ends.
    pub kv_cache: Option<KvCacheState>,
}

/// Default stand-in for one model inference step: bounded, deterministic.
pub fn simulated_forward(embedding: &[f64]) -> Vec<f64> {
    embedding.iter().map(|x| (SIMULATED_FORWARD_GAIN * x).tanh()).collect()
}

/// One rollout session: exclusively owns its KV cache until [`RolloutSession::run`]
/// hands it back inside the result.
pub struct RolloutSession<'a> {
    alignment: Cow<'a, AlignmentMatrix>,
    config: RolloutConfig,
    cache: KvCacheState,
}

impl<'a> RolloutSession<'a> {
    pub fn new(alignment: &'a AlignmentMatrix, config: RolloutConfig) -> AlignResult<Self> {
        let cache = KvCacheState::new(1, 1, alignment.source_dim())?;
        Self::with_cache(alignment, config, cache)
    }

    /// Continue an existing cache; it keeps growing by appends.
    pub fn with_cache(alignment: &'a AlignmentMatrix, config: RolloutConfig, cache: KvCacheState) -> AlignResult<Self> {
        if config.record_kv && cache.head_dim() != alignment.source_dim() {
            return Err(AlignError::dimension(format!(
                "cache head_dim {} does not match alignment source dim {}",
                cache.head_dim(),
                alignment.source_dim()
            )));
        }
        if !(config.drift_threshold.is_finite() && config.drift_threshold >= 0.0) {
            return Err(AlignError::invalid("drift_threshold must be finite and >= 0"));
        }
        let alignment = if config.orthogonalize {
            Cow::Owned(alignment.orthogonalized(&config.procrustes)?)
        } else {
            Cow::Borrowed(alignment)
        };
        Ok(Self { alignment, config, cache })
    }

    pub fn cache(&self) -> &KvCacheState {
        &self.cache
    }

    pub fn run<F>(mut self, h0: &[f64], mut forward: F) -> AlignResult<LatentRolloutResult>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let cfg = self.config;
        if h0.len() != self.alignment.source_dim() {
            return Err(AlignError::dimension(format!(
                "initial vector has length {}, alignment expects {}",
                h0.len(),
                self.alignment.source_dim()
            )));
        }
        let h0_norm = l2_norm(h0);
        if !(h0_norm.is_finite() && h0_norm > 0.0) {
            return Err(AlignError::invalid("initial latent vector must have a finite, non-zero norm"));
        }
        if cfg.steps > RECOMMENDED_MAX_STEPS {
            warn!(steps = cfg.steps, "rollout longer than the recommended {RECOMMENDED_MAX_STEPS} steps");
        }

        let mut h = h0.to_vec();
        let mut trajectory = Vec::with_capacity(cfg.steps);
        let mut trace = Vec::with_capacity(cfg.steps);
        let mut corrections = 0;

        for step in 1..=cfg.steps {
            let e = normalize(&self.alignment.apply(&h)?);
            let candidate = forward(&e);
            let norm = l2_norm(&candidate);
            if !norm.is_finite() {
                return Err(AlignError::invalid(format!("forward step {step} produced non-finite values")));
            }
            let drift = (norm / h0_norm - 1.0).abs();
            trace.push(drift);

            let accepted = if cfg.drift_protection && drift > cfg.drift_threshold {
                corrections += 1;
                debug!(step, drift, "drift above threshold; renormalizing to initial scale");
                if norm > 0.0 {
                    scale_to_norm(&candidate, h0_norm)
                } else {
                    // h_t is non-zero here: every earlier accepted state was either
                    // within threshold of ‖h₀‖ > 0 or rescaled onto it.
                    scale_to_norm(&h, h0_norm)
                }
            } else {
                candidate
            };

            if cfg.record_kv {
                self.cache.append_token(&h, &accepted)?;
            }
            trajectory.push(accepted.clone());
            h = accepted;
        }

        let drift = DriftMetrics::from_trace(trace, cfg.drift_threshold, corrections);
        debug!(
            steps = cfg.steps,
            max_drift = drift.max_drift,
            avg_drift = drift.avg_drift,
            corrections,
            "rollout finished"
        );
        Ok(LatentRolloutResult {
            latent_thought: h,
            trajectory,
            drift,
            kv_cache: cfg.record_kv.then_some(self.cache),
        })
    }
}

/// Roll out with the default simulated forward step.
pub fn rollout(h0: &[f64], alignment: &AlignmentMatrix, config: RolloutConfig) -> AlignResult<LatentRolloutResult> {
    rollout_with(h0, alignment, config, simulated_forward)
}

/// Roll out with a caller-supplied forward step (e.g. a real model call).
pub fn rollout_with<F>(
    h0: &[f64],
    alignment: &AlignmentMatrix,
    config: RolloutConfig,
    forward: F,
) -> AlignResult<LatentRolloutResult>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    RolloutSession::new(alignment, config)?.run(h0, forward)
}

/// Move a finished latent into another model's space.
pub fn transfer_latent(result: &LatentRolloutResult, target_alignment: &AlignmentMatrix) -> AlignResult<Vec<f64>> {
    target_alignment.apply(&result.latent_thought)
}
