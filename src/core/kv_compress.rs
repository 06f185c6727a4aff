//! Attention-guided KV cache compression.
//!
//! Each head scores its tokens with `softmax(q·k / √d)` averaged over a set of
//! queries, then keeps the highest-scoring tokens until their cumulative
//! attention reaches the threshold. The count is clamped to
//! `[min_tokens, max_tokens]`. Kept tokens stay in their original order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{AlignError, AlignResult};
use crate::core::kv_cache::KvCacheState;
use crate::core::titan::linear_algebra::dot;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Cumulative attention the kept tokens must cover, in `(0, 1]`.
    pub attention_threshold: f64,
    pub min_tokens: usize,
    pub max_tokens: usize,
    /// Trailing keys used as queries when none are supplied.
    pub query_window: usize,
    /// Allowed shortfall below the threshold before quality validation fails.
    pub quality_tolerance: f64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { attention_threshold: 0.9, min_tokens: 10, max_tokens: 2048, query_window: 4, quality_tolerance: 0.05 }
    }
}

impl CompressionConfig {
    fn validate(&self) -> AlignResult<()> {
        if !(self.attention_threshold > 0.0 && self.attention_threshold <= 1.0) {
            return Err(AlignError::invalid("attention_threshold must lie in (0, 1]"));
        }
        if self.max_tokens == 0 || self.min_tokens > self.max_tokens {
            return Err(AlignError::invalid(format!(
                "token bounds must satisfy 0 <= min_tokens <= max_tokens and max_tokens > 0 (got {}..{})",
                self.min_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionMetrics {
    pub total_tokens: usize,
    pub selected_tokens: usize,
    pub compression_ratio: f64,
    pub bandwidth_savings_percent: f64,
    pub cumulative_attention: f64,
}

impl CompressionMetrics {
    fn new(total: usize, selected: usize, cumulative_attention: f64) -> Self {
        let compression_ratio = if total == 0 { 1.0 } else { selected as f64 / total as f64 };
        Self {
            total_tokens: total,
            selected_tokens: selected,
            compression_ratio,
            bandwidth_savings_percent: (1.0 - compression_ratio) * 100.0,
            cumulative_attention,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressedHead {
    /// Original sequence positions of the kept tokens, ascending.
    pub positions: Vec<usize>,
    pub keys: Vec<Vec<f64>>,
    pub values: Vec<Vec<f64>>,
    /// Attention weight of each kept token.
    pub attention: Vec<f64>,
    pub metrics: CompressionMetrics,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressedKvCache {
    pub layers: Vec<Vec<CompressedHead>>,
    pub head_dim: usize,
    pub original_seq_len: usize,
    pub attention_threshold: f64,
}

impl CompressedKvCache {
    /// Totals over every head.
    pub fn metrics(&self) -> CompressionMetrics {
        let heads: Vec<&CompressedHead> = self.layers.iter().flatten().collect();
        let total = heads.iter().map(|h| h.metrics.total_tokens).sum();
        let selected = heads.iter().map(|h| h.metrics.selected_tokens).sum();
        let coverage = if heads.is_empty() {
            0.0
        } else {
            heads.iter().map(|h| h.metrics.cumulative_attention).sum::<f64>() / heads.len() as f64
        };
        CompressionMetrics::new(total, selected, coverage)
    }
}

/// Mean attention distribution over `keys` across all `queries`.
pub fn attention_scores(keys: &[Vec<f64>], queries: &[Vec<f64>]) -> AlignResult<Vec<f64>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    if queries.is_empty() {
        return Err(AlignError::invalid("attention scoring needs at least one query"));
    }
    let d = keys[0].len();
    if keys.iter().chain(queries).any(|v| v.len() != d) {
        return Err(AlignError::dimension(format!("queries and keys must all have length {d}")));
    }
    let scale = 1.0 / (d.max(1) as f64).sqrt();
    let mut scores = vec![0.0; keys.len()];
    for q in queries {
        let logits: Vec<f64> = keys.iter().map(|k| dot(q, k) * scale).collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let z: f64 = exps.iter().sum();
        for (s, e) in scores.iter_mut().zip(&exps) {
            *s += e / z;
        }
    }
    let n = queries.len() as f64;
    scores.iter_mut().for_each(|s| *s /= n);
    Ok(scores)
}

/// Compress one head. Without `queries`, the last `query_window` keys stand in.
pub fn compress_head(
    keys: &[Vec<f64>],
    values: &[Vec<f64>],
    queries: Option<&[Vec<f64>]>,
    config: &CompressionConfig,
) -> AlignResult<CompressedHead> {
    config.validate()?;
    if keys.len() != values.len() {
        return Err(AlignError::dimension(format!("{} keys but {} values", keys.len(), values.len())));
    }
    let total = keys.len();
    if total == 0 {
        return Ok(CompressedHead { metrics: CompressionMetrics::new(0, 0, 0.0), ..CompressedHead::default() });
    }

    let window_start = total.saturating_sub(config.query_window.max(1));
    let queries = queries.unwrap_or(&keys[window_start..]);
    let scores = attention_scores(keys, queries)?;

    let mut ranked: Vec<usize> = (0..total).collect();
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut cumulative = 0.0;
    let mut needed = total;
    for (i, &idx) in ranked.iter().enumerate() {
        cumulative += scores[idx];
        if cumulative >= config.attention_threshold {
            needed = i + 1;
            break;
        }
    }
    let keep = needed.max(config.min_tokens).min(config.max_tokens).clamp(1, total);

    let mut positions = ranked[..keep].to_vec();
    positions.sort_unstable();
    let attention: Vec<f64> = positions.iter().map(|&p| scores[p]).collect();
    let covered: f64 = attention.iter().sum();

    Ok(CompressedHead {
        keys: positions.iter().map(|&p| keys[p].clone()).collect(),
        values: positions.iter().map(|&p| values[p].clone()).collect(),
        metrics: CompressionMetrics::new(total, keep, covered),
        attention,
        positions,
    })
}

#[derive(Clone, Debug, Default)]
pub struct KvCompressor {
    config: CompressionConfig,
}

impl KvCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn compress(&self, cache: &KvCacheState) -> AlignResult<CompressedKvCache> {
        self.compress_inner(cache, None)
    }

    /// Use the same explicit queries for every head.
    pub fn compress_with_queries(&self, cache: &KvCacheState, queries: &[Vec<f64>]) -> AlignResult<CompressedKvCache> {
        self.compress_inner(cache, Some(queries))
    }

    fn compress_inner(&self, cache: &KvCacheState, queries: Option<&[Vec<f64>]>) -> AlignResult<CompressedKvCache> {
        let layers = cache
            .layers()
            .iter()
            .map(|layer| {
                layer
                    .iter()
                    .map(|head| compress_head(&head.keys, &head.values, queries, &self.config))
                    .collect::<AlignResult<Vec<_>>>()
            })
            .collect::<AlignResult<Vec<_>>>()?;
        let out = CompressedKvCache {
            layers,
            head_dim: cache.head_dim(),
            original_seq_len: cache.seq_len(),
            attention_threshold: self.config.attention_threshold,
        };
        let m = out.metrics();
        debug!(
            total = m.total_tokens,
            selected = m.selected_tokens,
            ratio = m.compression_ratio,
            coverage = m.cumulative_attention,
            "kv cache compressed"
        );
        Ok(out)
    }
}

/// Rebuild a full-length cache; dropped positions come back as zero vectors.
pub fn decompress(compressed: &CompressedKvCache) -> AlignResult<KvCacheState> {
    let num_layers = compressed.layers.len();
    let num_heads = compressed.layers.first().map_or(0, Vec::len);
    let mut cache = KvCacheState::new(num_layers, num_heads, compressed.head_dim)?;
    let zero = vec![0.0; compressed.head_dim];
    for (l, layer) in compressed.layers.iter().enumerate() {
        for (h, head) in layer.iter().enumerate() {
            let mut kept = head.positions.iter().zip(head.keys.iter().zip(&head.values)).peekable();
            for pos in 0..head.metrics.total_tokens {
                match kept.peek() {
                    Some((&p, (k, v))) if p == pos => {
                        cache.append(l, h, k, v)?;
                        kept.next();
                    }
                    _ => cache.append(l, h, &zero, &zero)?,
                }
            }
        }
    }
    Ok(cache)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub passed: bool,
    /// Mean cumulative attention over heads.
    pub attention_coverage: f64,
    pub information_loss: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn validate_quality(compressed: &CompressedKvCache, config: &CompressionConfig) -> QualityReport {
    let floor = compressed.attention_threshold - config.quality_tolerance;
    let mut warnings = Vec::new();
    let mut capped = false;
    for (l, layer) in compressed.layers.iter().enumerate() {
        for (h, head) in layer.iter().enumerate() {
            let m = &head.metrics;
            if m.total_tokens == 0 || m.cumulative_attention >= floor {
                continue;
            }
            warnings.push(format!(
                "layer {l} head {h} covers {:.1}% of attention, below target {:.1}%",
                m.cumulative_attention * 100.0,
                compressed.attention_threshold * 100.0
            ));
            if m.selected_tokens >= config.max_tokens {
                capped = true;
            }
        }
    }

    let overall = compressed.metrics();
    let mut recommendations = Vec::new();
    if capped {
        recommendations.push(format!("raise max_tokens above {}", config.max_tokens));
    }
    if !warnings.is_empty() && !capped {
        recommendations.push("lower attention_threshold or supply task-specific queries".to_string());
    }
    if overall.total_tokens > 0 && overall.compression_ratio > 0.9 {
        recommendations.push("attention is diffuse; compression saves little for this cache".to_string());
    }
    let passed = warnings.is_empty();
    if !passed {
        warn!(heads = warnings.len(), "compressed cache below attention target");
    }
    QualityReport {
        passed,
        attention_coverage: overall.cumulative_attention,
        information_loss: (1.0 - overall.cumulative_attention).max(0.0),
        warnings,
        recommendations,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsEstimate {
    pub total_tokens: usize,
    pub estimated_selected_tokens: usize,
    pub compression_ratio: f64,
    pub bandwidth_savings_percent: f64,
    pub bytes_saved: usize,
    pub expected_coverage: f64,
}

/// Estimate savings before compressing, assuming Zipf-distributed attention (`p_r ∝ 1/r`).
/// Bytes count keys and values stored as `f64`.
pub fn estimate_savings(
    num_tokens: usize,
    head_dim: usize,
    config: &CompressionConfig,
) -> AlignResult<SavingsEstimate> {
    config.validate()?;
    if num_tokens == 0 {
        return Ok(SavingsEstimate { compression_ratio: 1.0, ..SavingsEstimate::default() });
    }
    let harmonic: f64 = (1..=num_tokens).map(|r| 1.0 / r as f64).sum();
    let mut cumulative = 0.0;
    let mut needed = num_tokens;
    for r in 1..=num_tokens {
        cumulative += 1.0 / (r as f64 * harmonic);
        if cumulative >= config.attention_threshold {
            needed = r;
            break;
        }
    }
    let selected = needed.max(config.min_tokens).min(config.max_tokens).clamp(1, num_tokens);
    let coverage: f64 = (1..=selected).map(|r| 1.0 / (r as f64 * harmonic)).sum();
    let metrics = CompressionMetrics::new(num_tokens, selected, coverage);
    Ok(SavingsEstimate {
        total_tokens: num_tokens,
        estimated_selected_tokens: selected,
        compression_ratio: metrics.compression_ratio,
        bandwidth_savings_percent: metrics.bandwidth_savings_percent,
        bytes_saved: (num_tokens - selected) * head_dim * 2 * std::mem::size_of::<f64>(),
        expected_coverage: coverage.min(1.0),
    })
}
