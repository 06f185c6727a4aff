//! Core module tree for the alignment engine.

pub mod alignment;
pub mod alignment_cache;
pub mod debug; // tracing setup gated by LATENTBRIDGE_DEBUG=1
pub mod error;
pub mod kv_cache;
pub mod kv_compress;
pub mod rollout;
pub mod titan;
