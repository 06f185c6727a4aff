//! `LatentConfig`: built-in defaults + optional TOML file.
//!
//! - `LatentConfig::default()` → every tunable at its documented default
//! - `LatentConfig::from_toml_file(path)` → missing sections/keys keep defaults
//! - `load_or_default(cli_path)` → `--config FILE`, else ~/.latentbridge/config.toml if present
//!
//! `[svd]` and `[procrustes]` are shared: the accessors below push them down
//! into every learner that orthogonalizes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::alignment::anchor::AnchorConfig;
use crate::core::alignment::gradient::GradientConfig;
use crate::core::alignment::ridge::RidgeConfig;
use crate::core::alignment_cache::{AlignmentCache, DEFAULT_CAPACITY};
use crate::core::kv_compress::CompressionConfig;
use crate::core::rollout::RolloutConfig;
use crate::core::titan::procrustes::ProcrustesConfig;
use crate::core::titan::svd::SvdConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub capacity: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentConfig {
    pub svd: SvdConfig,
    pub procrustes: ProcrustesConfig,
    pub ridge: RidgeConfig,
    pub gradient: GradientConfig,
    pub anchor: AnchorConfig,
    pub rollout: RolloutConfig,
    pub compression: CompressionConfig,
    pub cache: CacheSection,
}

impl LatentConfig {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        toml::from_str(txt).context("parsing latentbridge config")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&txt).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing latentbridge config")
    }

    pub fn procrustes(&self) -> ProcrustesConfig {
        ProcrustesConfig { svd: self.svd, ..self.procrustes }
    }

    pub fn gradient(&self) -> GradientConfig {
        GradientConfig { procrustes: self.procrustes(), ..self.gradient }
    }

    pub fn anchor(&self) -> AnchorConfig {
        AnchorConfig { procrustes: self.procrustes(), ..self.anchor }
    }

    pub fn rollout(&self) -> RolloutConfig {
        RolloutConfig { procrustes: self.procrustes(), ..self.rollout }
    }

    /// A fresh, empty cache sized from `[cache]`.
    pub fn alignment_cache(&self) -> AlignmentCache {
        AlignmentCache::with_capacity(self.cache.capacity)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|h| h.join(".latentbridge").join("config.toml"))
}

pub fn resolve_config_path(cli_path: &Option<PathBuf>) -> Option<PathBuf> {
    if let Some(p) = cli_path {
        return Some(p.clone());
    }
    default_config_path()
}

/// An explicit path must exist; the default path is optional.
pub fn load_or_default(cli_path: &Option<PathBuf>) -> Result<LatentConfig> {
    match (cli_path, resolve_config_path(cli_path)) {
        (Some(_), Some(p)) => LatentConfig::from_toml_file(&p),
        (None, Some(p)) if p.is_file() => LatentConfig::from_toml_file(&p),
        _ => Ok(LatentConfig::default()),
    }
}
