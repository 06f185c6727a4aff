use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "latentbridge",
    about = "LatentBridge: learn cross-model alignment matrices, roll out latents, compress KV caches",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct LatentCli {
    /// Global: debug-level tracing on stderr (env LATENTBRIDGE_DEBUG=1 also works)
    #[arg(long = "debug", action = ArgAction::SetTrue, global = true)]
    pub debug: bool,

    /// Global: path to config (TOML); default: ~/.latentbridge/config.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Singular value decomposition of a JSON matrix
    ///
    /// Examples:
    ///   latentbridge svd w.json -o svd.json
    ///   latentbridge svd w.json --truncate 1e-6
    Svd {
        #[arg(value_name = "MATRIX")]
        input: PathBuf,
        /// Drop singular values at or below this threshold (at least one is kept)
        #[arg(long = "truncate", value_name = "THRESHOLD")]
        truncate: Option<f64>,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Project a matrix toward the orthogonal manifold
    Procrustes {
        #[arg(value_name = "MATRIX")]
        input: PathBuf,
        /// Blend factor: 0 keeps the input, 1 is the full projection
        #[arg(long = "alpha", value_name = "A", default_value_t = 1.0)]
        alpha: f64,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Closed-form ridge alignment from input/output embedding matrices
    Ridge {
        /// Input embedding matrix, vocab × target_dim
        #[arg(long = "w-in", value_name = "FILE")]
        w_in: PathBuf,
        /// Output projection matrix, source_dim × vocab
        #[arg(long = "w-out", value_name = "FILE")]
        w_out: PathBuf,
        #[arg(long = "lambda", value_name = "L")]
        lambda: Option<f64>,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Gradient-trained alignment from paired hidden states
    Train {
        #[arg(long = "source", value_name = "FILE")]
        source: PathBuf,
        #[arg(long = "target", value_name = "FILE")]
        target: PathBuf,
        #[arg(long = "epochs", value_name = "N")]
        epochs: Option<usize>,
        #[arg(long = "seed", value_name = "N")]
        seed: Option<u64>,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Anchor-point alignment (Procrustes or least squares, plus low-rank correction)
    Anchor {
        #[arg(long = "source", value_name = "FILE")]
        source: PathBuf,
        #[arg(long = "target", value_name = "FILE")]
        target: PathBuf,
        /// Skip the low-rank residual correction
        #[arg(long = "no-correction", action = ArgAction::SetTrue)]
        no_correction: bool,
        #[arg(long = "rank", value_name = "K")]
        rank: Option<usize>,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Multi-step latent rollout with drift protection
    Rollout {
        /// Alignment matrix JSON (as written by ridge/train/anchor)
        #[arg(long = "alignment", value_name = "FILE")]
        alignment: PathBuf,
        /// Initial latent vector, JSON array
        #[arg(long = "h0", value_name = "FILE")]
        h0: PathBuf,
        #[arg(long = "steps", value_name = "N")]
        steps: Option<usize>,
        #[arg(long = "threshold", value_name = "T")]
        threshold: Option<f64>,
        #[arg(long = "no-protection", action = ArgAction::SetTrue)]
        no_protection: bool,
        /// Also write the session KV cache here
        #[arg(long = "cache-out", value_name = "FILE")]
        cache_out: Option<PathBuf>,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Attention-guided KV cache compression
    Compress {
        /// KV cache JSON (as written by `rollout --cache-out`)
        #[arg(value_name = "CACHE")]
        cache: PathBuf,
        #[arg(long = "threshold", value_name = "T")]
        threshold: Option<f64>,
        /// Only estimate savings for the cache's size, assuming Zipf attention
        #[arg(long = "estimate", action = ArgAction::SetTrue)]
        estimate: bool,
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Generate synthetic paired hidden states
    Synth {
        #[arg(long = "source-dim", value_name = "N")]
        source_dim: usize,
        #[arg(long = "target-dim", value_name = "N")]
        target_dim: usize,
        #[arg(long = "points", value_name = "N", default_value_t = 100)]
        points: usize,
        #[arg(long = "noise", value_name = "STD", default_value_t = 0.01)]
        noise: f64,
        #[arg(long = "seed", value_name = "N", default_value_t = 42)]
        seed: u64,
        /// Writes source.json, target.json and projection.json here
        #[arg(long = "out-dir", value_name = "DIR")]
        out_dir: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}
