//! LRU cache of learned alignment matrices, keyed by model pair and method.
//! The cache belongs to whoever creates it; there is no process-wide instance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::alignment::{AlignmentMatrix, AlignmentMethod};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlignmentKey {
    pub source_model: String,
    pub target_model: String,
    pub method: AlignmentMethod,
}

impl AlignmentKey {
    pub fn new(source_model: impl Into<String>, target_model: impl Into<String>, method: AlignmentMethod) -> Self {
        Self { source_model: source_model.into(), target_model: target_model.into(), method }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    matrix: AlignmentMatrix,
    last_used: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Clone, Debug)]
pub struct AlignmentCache {
    entries: HashMap<AlignmentKey, Entry>,
    capacity: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub const DEFAULT_CAPACITY: usize = 128;

impl Default for AlignmentCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl AlignmentCache {
    /// A capacity of 0 is treated as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: HashMap::new(), capacity: capacity.max(1), tick: 0, hits: 0, misses: 0, evictions: 0 }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&mut self, key: &AlignmentKey) -> Option<&AlignmentMatrix> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(e) => {
                self.hits += 1;
                e.last_used = self.tick;
                Some(&e.matrix)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &AlignmentKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace; returns the previous matrix for the key.
    pub fn put(&mut self, key: AlignmentKey, matrix: AlignmentMatrix) -> Option<AlignmentMatrix> {
        self.tick += 1;
        let previous = self.entries.insert(key, Entry { matrix, last_used: self.tick }).map(|e| e.matrix);
        self.prune();
        previous
    }

    pub fn evict(&mut self, key: &AlignmentKey) -> Option<AlignmentMatrix> {
        self.entries.remove(key).map(|e| e.matrix)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn prune(&mut self) {
        if self.entries.len() <= self.capacity {
            return;
        }
        let before = self.entries.len();
        let mut by_age: Vec<(u64, AlignmentKey)> =
            self.entries.iter().map(|(k, e)| (e.last_used, k.clone())).collect();
        by_age.sort_by_key(|(t, _)| *t);
        for (_, key) in by_age {
            if self.entries.len() <= self.capacity {
                break;
            }
            self.entries.remove(&key);
            self.evictions += 1;
        }
        debug!(before, after = self.entries.len(), "alignment cache pruned");
    }
}
