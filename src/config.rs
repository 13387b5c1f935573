// src/config.rs
//! Runtime configuration: `config/tagging.toml` plus env overrides.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::tagging::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::tagging::compiler::{CompileLimits, DEFAULT_MAX_EXCLUDES, DEFAULT_MAX_PATTERNS, MAX_WEIGHT};
use crate::tagging::scored::DEFAULT_THRESHOLD;
use crate::tagging::store::BundlePaths;
use crate::tagging::unify::TagMode;

pub const DEFAULT_CONFIG_PATH: &str = "config/tagging.toml";

pub const ENV_CONFIG_PATH: &str = "TAGGING_CONFIG_PATH";
pub const ENV_MIN_SCORE: &str = "TAGS_MIN_SCORE";
pub const ENV_MODE: &str = "TAGS_MODE";
pub const ENV_RULES_PATH: &str = "TAG_RULES_PATH";
pub const ENV_CATALOG_URL: &str = "TAG_CATALOG_URL";

fn default_rules_path() -> PathBuf {
    PathBuf::from("config/tag_rules.yaml")
}
fn default_catalog_cache_path() -> PathBuf {
    PathBuf::from("cache/tag_rules.json")
}
fn default_max_patterns() -> usize {
    DEFAULT_MAX_PATTERNS
}
fn default_max_excludes() -> usize {
    DEFAULT_MAX_EXCLUDES
}
fn default_min_score() -> f64 {
    DEFAULT_THRESHOLD
}
fn default_min_token_hits() -> usize {
    1
}
fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}
fn default_prune_secs() -> u64 {
    60
}
fn default_catalog_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesSection {
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub synonyms_path: Option<PathBuf>,
    #[serde(default)]
    pub people_path: Option<PathBuf>,
    #[serde(default = "default_catalog_cache_path")]
    pub catalog_cache_path: PathBuf,
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
    #[serde(default = "default_max_excludes")]
    pub max_excludes: usize,
}

impl Default for RulesSection {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
            synonyms_path: None,
            people_path: None,
            catalog_cache_path: default_catalog_cache_path(),
            max_patterns: DEFAULT_MAX_PATTERNS,
            max_excludes: DEFAULT_MAX_EXCLUDES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSection {
    /// "tokens" | "scored" | "both"; anything else falls back to "both".
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_min_token_hits")]
    pub min_token_hits: usize,
}

impl Default for MatchingSection {
    fn default() -> Self {
        Self {
            mode: None,
            min_score: DEFAULT_THRESHOLD,
            min_token_hits: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_prune_secs")]
    pub prune_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl_secs: DEFAULT_TTL.as_secs(),
            prune_interval_secs: default_prune_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the env var holding the bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            url: None,
            token_env: None,
            timeout_secs: default_catalog_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    rules: RulesSection,
    #[serde(default)]
    matching: MatchingSection,
    #[serde(default)]
    cache: CacheSection,
    #[serde(default)]
    catalog: CatalogSection,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct TaggingConfig {
    pub rules: RulesSection,
    pub mode: TagMode,
    pub min_score: f64,
    pub min_token_hits: usize,
    pub cache: CacheSection,
    pub catalog: CatalogSection,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            rules: RulesSection::default(),
            mode: TagMode::default(),
            min_score: DEFAULT_THRESHOLD,
            min_token_hits: 1,
            cache: CacheSection::default(),
            catalog: CatalogSection::default(),
        }
    }
}

fn parse_mode(raw: &str) -> TagMode {
    raw.parse::<TagMode>().unwrap_or_else(|e| {
        warn!(target: "tagging", error = %e, "invalid tag mode, using `both`");
        TagMode::Both
    })
}

// parse optional float env and clamp to <0.0..=10.0>
fn parse_min_score_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, MAX_WEIGHT))
}

impl TaggingConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(s)?;
        let min_score = if file.matching.min_score.is_finite() {
            file.matching.min_score.clamp(0.0, MAX_WEIGHT)
        } else {
            DEFAULT_THRESHOLD
        };
        Ok(Self {
            mode: file
                .matching
                .mode
                .as_deref()
                .map(parse_mode)
                .unwrap_or_default(),
            min_score,
            min_token_hits: file.matching.min_token_hits.max(1),
            rules: file.rules,
            cache: file.cache,
            catalog: file.catalog,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading tagging config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing tagging config {}", path.display()))
    }

    /// `$TAGGING_CONFIG_PATH` (must exist), else `config/tagging.toml`, else
    /// defaults. Env overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::from_path(&pb)?
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
                if pb.exists() {
                    Self::from_path(&pb)?
                } else {
                    info!(target: "tagging", "no tagging config file, using defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(t) = parse_min_score_env(std::env::var(ENV_MIN_SCORE).ok()) {
            self.min_score = t;
        }
        if let Ok(m) = std::env::var(ENV_MODE) {
            self.mode = parse_mode(&m);
        }
        if let Ok(p) = std::env::var(ENV_RULES_PATH) {
            if !p.trim().is_empty() {
                self.rules.path = PathBuf::from(p);
            }
        }
        if let Ok(u) = std::env::var(ENV_CATALOG_URL) {
            if !u.trim().is_empty() {
                self.catalog.url = Some(u);
            }
        }
    }

    pub fn bundle_paths(&self) -> BundlePaths {
        BundlePaths {
            rules: self.rules.path.clone(),
            synonyms: self.rules.synonyms_path.clone(),
            people: self.rules.people_path.clone(),
        }
    }

    pub fn compile_limits(&self) -> CompileLimits {
        CompileLimits {
            max_patterns: self.rules.max_patterns,
            max_excludes: self.rules.max_excludes,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
