//! `ridge`, `train` and `anchor` subcommands: each writes an alignment report whose
//! `alignment` field is the matrix JSON `rollout --alignment` reads.

use std::path::PathBuf;

use anyhow::Result;

use super::{emit, read_json, status, warn_line};
use crate::config::LatentConfig;
use crate::core::alignment::anchor::align_anchor_points;
use crate::core::alignment::gradient::GradientAligner;
use crate::core::alignment::ridge::RidgeAligner;
use crate::core::alignment::{AlignmentMatrix, HiddenState};
use crate::core::titan::matrix::Matrix;

fn summary(label: &str, a: &AlignmentMatrix) {
    status(&format!(
        "{label}: {} -> {} epsilon {:.4e} orthogonality {:.4e} ({} ms)",
        a.source_dim(),
        a.target_dim(),
        a.epsilon,
        a.orthogonality_score,
        a.metadata.computation_time_ms
    ));
}

pub fn ridge(cfg: &LatentConfig, w_in: PathBuf, w_out: PathBuf, lambda: Option<f64>, out: Option<PathBuf>) -> Result<()> {
    let w_in: Matrix = read_json(&w_in)?;
    let w_out: Matrix = read_json(&w_out)?;
    let mut ridge_cfg = cfg.ridge;
    if let Some(l) = lambda {
        ridge_cfg.lambda = l;
    }
    let result = RidgeAligner::new(ridge_cfg).derive(&w_in, &w_out)?;
    if result.retried {
        warn_line(&format!("system was singular; solved with lambda {:.1e}", result.lambda_used));
    }
    summary("ridge", &result.alignment);
    emit(&result, out.as_deref())
}

pub fn train(
    cfg: &LatentConfig,
    source: PathBuf,
    target: PathBuf,
    epochs: Option<usize>,
    seed: Option<u64>,
    out: Option<PathBuf>,
) -> Result<()> {
    let source: Vec<HiddenState> = read_json(&source)?;
    let target: Vec<HiddenState> = read_json(&target)?;
    let mut gcfg = cfg.gradient();
    if let Some(e) = epochs {
        gcfg.epochs = e;
    }
    if seed.is_some() {
        gcfg.seed = seed;
    }
    let result = GradientAligner::new(gcfg).train(&source, &target)?;
    status(&format!(
        "{} epochs, best validation loss {:.4e} at epoch {}{}",
        result.epochs_run,
        result.best_validation_loss,
        result.convergence_epoch,
        if result.stopped_early { " (early stop)" } else { "" }
    ));
    summary("gradient", &result.alignment);
    emit(&result, out.as_deref())
}

pub fn anchor(
    cfg: &LatentConfig,
    source: PathBuf,
    target: PathBuf,
    no_correction: bool,
    rank: Option<usize>,
    out: Option<PathBuf>,
) -> Result<()> {
    let source: Vec<HiddenState> = read_json(&source)?;
    let target: Vec<HiddenState> = read_json(&target)?;
    let mut acfg = cfg.anchor();
    if no_correction {
        acfg.low_rank_correction = false;
    }
    if let Some(k) = rank {
        acfg.lora_rank = k;
    }
    let result = align_anchor_points(&source, &target, &acfg)?;
    status(&format!(
        "epsilon {:.4e} -> {:.4e} ({:.1}% better), retention {:.3}",
        result.base_epsilon, result.final_epsilon, result.improvement_pct, result.information_retention
    ));
    summary("anchor", &result.alignment);
    emit(&result, out.as_deref())
}
