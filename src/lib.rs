//! LatentBridge: cross-model latent-space alignment.
//!
//! - [`core::titan`]: dense matrices, Jacobi SVD, Procrustes projection
//! - [`core::alignment`]: ridge, gradient and anchor-point learners producing an [`AlignmentMatrix`]
//! - [`core::rollout`]: multi-step latent rollout with drift protection
//! - [`core::kv_cache`] / [`core::kv_compress`]: KV cache transfer and attention-guided compression
//! - [`core::alignment_cache`]: LRU cache of learned matrices
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod io;

pub use crate::core::alignment::{AlignmentMatrix, AlignmentMethod, HiddenState};
pub use crate::core::error::{AlignError, AlignResult};
pub use crate::core::titan::Matrix;
