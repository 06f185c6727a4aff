//! `svd` and `procrustes` subcommands.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use super::{emit, read_json, status, warn_line};
use crate::config::LatentConfig;
use crate::core::titan::matrix::Matrix;
use crate::core::titan::procrustes::{apply_soft_procrustes_constraint_with, compute_orthogonality_score};
use crate::core::titan::svd::{compute_reconstruction_error, compute_svd_with, truncate_svd, SvdResult};

#[derive(Debug, Serialize)]
struct SvdReport {
    rows: usize,
    cols: usize,
    rank: usize,
    condition_number: f64,
    reconstruction_error: f64,
    #[serde(flatten)]
    svd: SvdResult,
}

pub fn svd(cfg: &LatentConfig, input: PathBuf, truncate: Option<f64>, out: Option<PathBuf>) -> Result<()> {
    let m: Matrix = read_json(&input)?;
    let mut svd = compute_svd_with(&m, &cfg.svd)?;
    if !svd.converged {
        warn_line(&format!("Jacobi stopped at the {}-sweep cap; factors are approximate", svd.sweeps));
    }
    if let Some(threshold) = truncate {
        svd = truncate_svd(&svd, threshold);
    }
    let report = SvdReport {
        rows: m.rows(),
        cols: m.cols(),
        rank: svd.rank(cfg.svd.singular_tolerance),
        condition_number: svd.condition_number(),
        reconstruction_error: compute_reconstruction_error(&m, &svd)?,
        svd,
    };
    status(&format!(
        "{}x{} rank {} cond {:.3e}",
        report.rows, report.cols, report.rank, report.condition_number
    ));
    emit(&report, out.as_deref())
}

#[derive(Debug, Serialize)]
struct ProcrustesReport {
    alpha: f64,
    orthogonality_before: f64,
    orthogonality_after: f64,
    weights: Matrix,
}

pub fn procrustes(cfg: &LatentConfig, input: PathBuf, alpha: f64, out: Option<PathBuf>) -> Result<()> {
    let m: Matrix = read_json(&input)?;
    let projected = apply_soft_procrustes_constraint_with(&m, alpha, &cfg.procrustes())?;
    let report = ProcrustesReport {
        alpha,
        orthogonality_before: compute_orthogonality_score(&m),
        orthogonality_after: compute_orthogonality_score(&projected),
        weights: projected,
    };
    status(&format!(
        "orthogonality {:.3e} -> {:.3e}",
        report.orthogonality_before, report.orthogonality_after
    ));
    emit(&report, out.as_deref())
}
