//! `synth` subcommand.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::status;
use crate::core::alignment::synthetic::generate_synthetic_anchor_points;
use crate::io::write_json;

pub fn run(source_dim: usize, target_dim: usize, points: usize, noise: f64, seed: u64, out_dir: PathBuf) -> Result<()> {
    let data = generate_synthetic_anchor_points(source_dim, target_dim, points, noise, seed)?;
    for (name, value) in [("source.json", &data.source), ("target.json", &data.target)] {
        let path = out_dir.join(name);
        write_json(&path, value).with_context(|| format!("writing {}", path.display()))?;
    }
    let path = out_dir.join("projection.json");
    write_json(&path, &data.projection).with_context(|| format!("writing {}", path.display()))?;
    status(&format!("{points} pairs {source_dim} -> {target_dim} in {}", out_dir.display()));
    Ok(())
}
