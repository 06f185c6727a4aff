//! `compress` subcommand.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use super::{emit, read_json, status, warn_line};
use crate::config::LatentConfig;
use crate::core::kv_cache::KvCacheState;
use crate::core::kv_compress::{estimate_savings, validate_quality, CompressedKvCache, KvCompressor, QualityReport};

#[derive(Debug, Serialize)]
struct CompressReport {
    quality: QualityReport,
    compressed: CompressedKvCache,
}

pub fn run(cfg: &LatentConfig, cache: PathBuf, threshold: Option<f64>, estimate: bool, out: Option<PathBuf>) -> Result<()> {
    let cache: KvCacheState = read_json(&cache)?;
    let mut ccfg = cfg.compression;
    if let Some(t) = threshold {
        ccfg.attention_threshold = t;
    }

    if estimate {
        let est = estimate_savings(cache.seq_len(), cache.head_dim(), &ccfg)?;
        status(&format!(
            "estimated {} of {} tokens kept ({:.1}% saved)",
            est.estimated_selected_tokens, est.total_tokens, est.bandwidth_savings_percent
        ));
        return emit(&est, out.as_deref());
    }

    let compressed = KvCompressor::new(ccfg).compress(&cache)?;
    let quality = validate_quality(&compressed, &ccfg);
    for w in &quality.warnings {
        warn_line(w);
    }
    let m = compressed.metrics();
    status(&format!(
        "kept {} of {} tokens ({:.1}% saved), coverage {:.3}",
        m.selected_tokens, m.total_tokens, m.bandwidth_savings_percent, m.cumulative_attention
    ));
    emit(&CompressReport { quality, compressed }, out.as_deref())
}
