//! Per-layer, per-head key/value cache used as a transferable memory artifact.
//!
//! A cache grows only by appends and is owned by one rollout session at a time.
//! Merging two caches never touches either input; it builds a third one.

use serde::{Deserialize, Serialize};

use crate::core::alignment::AlignmentMatrix;
use crate::core::error::{AlignError, AlignResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadCache {
    pub keys: Vec<Vec<f64>>,
    pub values: Vec<Vec<f64>>,
}

impl HeadCache {
    pub fn len(&self) -> usize { self.keys.len() }
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KvCacheState {
    layers: Vec<Vec<HeadCache>>,
    head_dim: usize,
    seq_len: usize,
}

impl KvCacheState {
    pub fn new(num_layers: usize, num_heads: usize, head_dim: usize) -> AlignResult<Self> {
        if num_layers == 0 || num_heads == 0 || head_dim == 0 {
            return Err(AlignError::dimension(format!(
                "cache shape must be non-zero (layers={num_layers}, heads={num_heads}, head_dim={head_dim})"
            )));
        }
        Ok(Self {
            layers: vec![vec![HeadCache::default(); num_heads]; num_layers],
            head_dim,
            seq_len: 0,
        })
    }

    pub fn num_layers(&self) -> usize { self.layers.len() }
    pub fn num_heads(&self) -> usize { self.layers.first().map_or(0, Vec::len) }
    pub fn head_dim(&self) -> usize { self.head_dim }
    /// Longest token sequence held by any head.
    pub fn seq_len(&self) -> usize { self.seq_len }
    pub fn layers(&self) -> &[Vec<HeadCache>] { &self.layers }

    pub fn head(&self, layer: usize, head: usize) -> AlignResult<&HeadCache> {
        self.layers
            .get(layer)
            .and_then(|l| l.get(head))
            .ok_or_else(|| AlignError::dimension(format!("no head {head} in layer {layer}")))
    }

    pub fn append(&mut self, layer: usize, head: usize, key: &[f64], value: &[f64]) -> AlignResult<()> {
        if key.len() != self.head_dim || value.len() != self.head_dim {
            return Err(AlignError::dimension(format!(
                "key/value lengths {}/{} do not match head_dim {}",
                key.len(),
                value.len(),
                self.head_dim
            )));
        }
        let slot = self
            .layers
            .get_mut(layer)
            .and_then(|l| l.get_mut(head))
            .ok_or_else(|| AlignError::dimension(format!("no head {head} in layer {layer}")))?;
        slot.keys.push(key.to_vec());
        slot.values.push(value.to_vec());
        self.seq_len = self.seq_len.max(slot.len());
        Ok(())
    }

    /// Append the same key/value pair to every layer and head.
    pub fn append_token(&mut self, key: &[f64], value: &[f64]) -> AlignResult<()> {
        for layer in 0..self.num_layers() {
            for head in 0..self.num_heads() {
                self.append(layer, head, key, value)?;
            }
        }
        Ok(())
    }
}

/// Align every key/value vector of `source` into the target space and place those
/// tokens ahead of the target's own tokens, head by head.
pub fn merge_kv_caches(
    source: &KvCacheState,
    target: &KvCacheState,
    alignment: &AlignmentMatrix,
) -> AlignResult<KvCacheState> {
    if source.num_layers() != target.num_layers() || source.num_heads() != target.num_heads() {
        return Err(AlignError::dimension(format!(
            "cache layouts differ: {}x{} vs {}x{}",
            source.num_layers(),
            source.num_heads(),
            target.num_layers(),
            target.num_heads()
        )));
    }
    if source.head_dim() != alignment.source_dim() || target.head_dim() != alignment.target_dim() {
        return Err(AlignError::dimension(format!(
            "alignment maps {} -> {}, caches use {} -> {}",
            alignment.source_dim(),
            alignment.target_dim(),
            source.head_dim(),
            target.head_dim()
        )));
    }

    let mut merged = KvCacheState::new(target.num_layers(), target.num_heads(), target.head_dim())?;
    for (l, (src_layer, tgt_layer)) in source.layers().iter().zip(target.layers()).enumerate() {
        for (h, (src, tgt)) in src_layer.iter().zip(tgt_layer).enumerate() {
            let keys = alignment.apply_batch(&src.keys)?;
            let values = alignment.apply_batch(&src.values)?;
            for (k, v) in keys.iter().zip(&values) {
                merged.append(l, h, k, v)?;
            }
            for (k, v) in tgt.keys.iter().zip(&tgt.values) {
                merged.append(l, h, k, v)?;
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::AlignmentMethod;
    use crate::core::titan::matrix::Matrix;

    #[test]
    fn append_checks_shape_and_tracks_length() {
        let mut cache = KvCacheState::new(2, 2, 3).unwrap();
        cache.append(1, 0, &[1.0, 2.0, 3.0], &[0.0, 0.0, 1.0]).unwrap();
        cache.append(1, 0, &[1.0, 2.0, 3.0], &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(cache.seq_len(), 2);
        assert!(cache.append(0, 0, &[1.0], &[1.0, 2.0, 3.0]).unwrap_err().is_dimension());
        assert!(cache.append(2, 0, &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap_err().is_dimension());
    }

    #[test]
    fn merge_aligns_source_then_appends_target() {
        let mut src = KvCacheState::new(1, 1, 2).unwrap();
        src.append_token(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        let mut tgt = KvCacheState::new(1, 1, 3).unwrap();
        tgt.append_token(&[9.0, 9.0, 9.0], &[8.0, 8.0, 8.0]).unwrap();
        let w = Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let a = AlignmentMatrix::new(w, None, AlignmentMethod::Ridge).unwrap();

        let merged = merge_kv_caches(&src, &tgt, &a).unwrap();
        let head = merged.head(0, 0).unwrap();
        assert_eq!(merged.seq_len(), 2);
        assert_eq!(head.keys[0], vec![1.0, 0.0, 1.0]);
        assert_eq!(head.values[0], vec![0.0, 1.0, 1.0]);
        assert_eq!(head.keys[1], vec![9.0, 9.0, 9.0]);
        // Inputs untouched.
        assert_eq!(src.seq_len(), 1);
        assert_eq!(tgt.seq_len(), 1);
    }
}
