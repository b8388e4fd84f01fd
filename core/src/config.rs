use crate::persist::load_json;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub cache: CacheConfig,
    pub scoring: ScoringConfig,
    pub semantic: SemanticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    /// An autosave becomes due after this many insertions; 0 disables autosave.
    pub autosave_interval: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight for a matched term that has no IDF entry.
    pub default_idf: f32,
    /// Added once per adjacent occurrence of consecutive query terms.
    pub phrase_bonus: f32,
    pub phrase_max_gap: u32,
    pub authority: AuthorityWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityWeights {
    pub link_rank: f32,
    pub domain_rank: f32,
    pub citation_rank: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub default_use: bool,
    pub default_weight: f32,
    /// Score the whole corpus by similarity when no keyword matches. Cost grows with corpus size.
    pub full_scan_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache: CacheConfig::default(),
            scoring: ScoringConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 500, autosave_interval: 50 }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { default_idf: 1.0, phrase_bonus: 5.0, phrase_max_gap: 1, authority: AuthorityWeights::default() }
    }
}

impl Default for AuthorityWeights {
    fn default() -> Self {
        Self { link_rank: 1.0, domain_rank: 1.0, citation_rank: 1.0 }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self { default_use: true, default_weight: 20.0, full_scan_fallback: false }
    }
}

impl EngineConfig {
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self { data_dir: data_dir.as_ref().to_path_buf(), ..Self::default() }
    }

    /// Load a JSON config file. Missing sections fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{ "cache": { "max_size": 2 }, "scoring": { "authority": { "citation_rank": 0.5 } } }"#).unwrap();
        assert_eq!(cfg.cache.max_size, 2);
        assert_eq!(cfg.cache.autosave_interval, 50);
        assert_eq!(cfg.scoring.authority.citation_rank, 0.5);
        assert_eq!(cfg.scoring.authority.link_rank, 1.0);
        assert_eq!(cfg.semantic.default_weight, 20.0);
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
    }
}
