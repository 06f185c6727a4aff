pub mod align;
pub mod compress;
pub mod decompose;
pub mod rollout;
pub mod synth;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::io::write_json;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&txt).with_context(|| format!("parsing {}", path.display()))
}

/// Write to `out` when given, otherwise pretty-print to stdout.
pub(crate) fn emit<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            write_json(path, value).with_context(|| format!("writing {}", path.display()))?;
            status(&format!("wrote {}", path.display()));
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

pub(crate) fn status(msg: &str) {
    eprintln!("{} {}", "ok:".green().bold(), msg);
}

pub(crate) fn warn_line(msg: &str) {
    eprintln!("{} {}", "warn:".yellow().bold(), msg);
}
