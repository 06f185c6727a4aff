//! `rollout` subcommand.

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

use super::{emit, read_json, status, warn_line};
use crate::config::LatentConfig;
use crate::core::alignment::AlignmentMatrix;
use crate::core::rollout::rollout;

/// Accept a bare alignment or any learner report carrying one.
#[derive(Deserialize)]
#[serde(untagged)]
enum AlignmentFile {
    Report { alignment: AlignmentMatrix },
    Bare(AlignmentMatrix),
}

impl AlignmentFile {
    fn into_inner(self) -> AlignmentMatrix {
        match self {
            AlignmentFile::Report { alignment } | AlignmentFile::Bare(alignment) => alignment,
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    cfg: &LatentConfig,
    alignment: PathBuf,
    h0: PathBuf,
    steps: Option<usize>,
    threshold: Option<f64>,
    no_protection: bool,
    cache_out: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let alignment = read_json::<AlignmentFile>(&alignment)?.into_inner();
    alignment.validate()?;
    let h0: Vec<f64> = read_json(&h0)?;

    let mut rcfg = cfg.rollout();
    if let Some(n) = steps {
        rcfg.steps = n;
    }
    if let Some(t) = threshold {
        rcfg.drift_threshold = t;
    }
    if no_protection {
        rcfg.drift_protection = false;
    }
    rcfg.record_kv = cache_out.is_some();

    let mut result = rollout(&h0, &alignment, rcfg)?;
    let d = &result.drift;
    if d.drift_detected {
        warn_line(&format!(
            "drift peaked at {:.3} (threshold {:.3}); {} step(s) renormalized",
            d.max_drift, rcfg.drift_threshold, d.corrections
        ));
    }
    status(&format!("{} steps, max drift {:.4}, avg drift {:.4}", rcfg.steps, d.max_drift, d.avg_drift));

    if let (Some(path), Some(cache)) = (cache_out.as_deref(), result.kv_cache.take()) {
        emit(&cache, Some(path))?;
    }
    emit(&result, out.as_deref())
}
