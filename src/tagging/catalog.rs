// src/tagging/catalog.rs
//! Remote rule catalog and sync with local fallbacks.
//!
//! Source order: remote catalog → rules file → last cached catalog. A catalog
//! fetch that applies cleanly is written to the cache file so the next start
//! can fall back to it when the catalog is unreachable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::category::Category;
use super::compiler::compile_bundle;
use super::error::TaggingError;
use super::state::RuntimeState;
use super::store::{
    load_people_file, load_rules_file, load_synonyms_file, normalize_rules, Person, RawRuleSet,
    RuleBundle, SynonymDictionary,
};
use crate::config::CatalogSection;

fn default_active() -> bool {
    true
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRule {
    /// Full label, `Kind/Name`.
    pub tag: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default, alias = "excludes")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[async_trait]
pub trait RuleCatalog: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CatalogRule>>;
    fn name(&self) -> &'static str;
}

/// Catalog served as a JSON array of [`CatalogRule`] over HTTP.
pub struct HttpCatalog {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building catalog http client")?;
        Ok(Self {
            url: url.into(),
            token,
            client,
        })
    }

    /// `None` when no catalog URL is configured.
    pub fn from_config(cfg: &CatalogSection) -> Result<Option<Self>> {
        let Some(url) = cfg.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let token = cfg
            .token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|t| !t.trim().is_empty());
        Self::new(url, token, Duration::from_secs(cfg.timeout_secs)).map(Some)
    }
}

#[async_trait]
impl RuleCatalog for HttpCatalog {
    async fn fetch(&self) -> Result<Vec<CatalogRule>> {
        let t0 = Instant::now();
        let mut req = self.client.get(&self.url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "tagging", error = ?e, "catalog http error");
                counter!("tagging_catalog_errors_total").increment(1);
                return Err(e).context("catalog http get()");
            }
        };
        let rows: Vec<CatalogRule> = resp
            .error_for_status()
            .context("catalog http status")?
            .json()
            .await
            .context("catalog http .json()")?;
        histogram!("tagging_catalog_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Usable rows as raw definitions. Inactive rows and rows without a tag
/// or patterns are skipped.
pub fn catalog_to_raw(rows: &[CatalogRule]) -> RawRuleSet {
    let mut raw = RawRuleSet::default();
    for row in rows {
        let tag = row.tag.trim();
        if !row.active || tag.is_empty() || row.patterns.is_empty() {
            continue;
        }
        let mut spec = serde_json::json!({
            "patterns": row.patterns,
            "exclude": row.exclude,
        });
        if let Some(w) = row.weight {
            spec["weight"] = serde_json::json!(w);
        }
        if let Some(c) = &row.category {
            spec["category"] = serde_json::json!(c);
        }
        raw.push(tag, spec);
    }
    raw
}

pub fn write_catalog_cache(path: &Path, rows: &[CatalogRule]) -> Result<(), TaggingError> {
    let io_err = |source: std::io::Error| TaggingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let body = serde_json::to_string_pretty(rows).map_err(|e| TaggingError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, body).map_err(io_err)
}

pub fn read_catalog_cache(path: &Path) -> Result<Vec<CatalogRule>, TaggingError> {
    let content = fs::read_to_string(path).map_err(|source| TaggingError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| TaggingError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    Catalog,
    RulesFile,
    CatalogCache,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub source: SyncSource,
    pub rules_count: usize,
    pub category_breakdown: BTreeMap<Category, usize>,
    pub dry_run: bool,
    /// Why earlier sources were skipped.
    pub failures: Vec<String>,
}

fn side_files(state: &RuntimeState) -> Result<(SynonymDictionary, Vec<Person>), TaggingError> {
    let rules = &state.config().rules;
    let synonyms = match &rules.synonyms_path {
        Some(p) => load_synonyms_file(p)?,
        None => SynonymDictionary::new(),
    };
    let people = match &rules.people_path {
        Some(p) => load_people_file(p)?,
        None => Vec::new(),
    };
    Ok((synonyms, people))
}

fn breakdown(raw: &RawRuleSet) -> BTreeMap<Category, usize> {
    let (rules, _) = normalize_rules(raw);
    let mut out = BTreeMap::new();
    for r in rules {
        *out.entry(r.category).or_insert(0) += 1;
    }
    out
}

fn apply(
    state: &RuntimeState,
    raw: RawRuleSet,
    dry_run: bool,
) -> Result<(usize, BTreeMap<Category, usize>), TaggingError> {
    let (synonyms, people) = side_files(state)?;
    let categories = breakdown(&raw);
    let bundle = RuleBundle {
        rules: raw,
        synonyms,
        people,
    };
    let count = if dry_run {
        compile_bundle(&bundle, &state.config().compile_limits())
            .map(|out| out.snapshot.stats.total_rules)
            .map_err(|report| TaggingError::Validation(report.errors))?
    } else {
        state.reload_with(&bundle)?
    };
    Ok((count, categories))
}

/// Load rules from the first source that works. With `dry_run` every step
/// validates but nothing is swapped and the cache file is left alone.
pub async fn smart_sync(
    state: &RuntimeState,
    catalog: Option<&dyn RuleCatalog>,
    dry_run: bool,
) -> Result<SyncOutcome, TaggingError> {
    let mut failures = Vec::new();
    let cache_path = state.config().rules.catalog_cache_path.clone();
    let outcome = |source: SyncSource,
                   (rules_count, category_breakdown): (usize, BTreeMap<Category, usize>),
                   failures: Vec<String>| SyncOutcome {
        source,
        rules_count,
        category_breakdown,
        dry_run,
        failures,
    };

    if let Some(cat) = catalog {
        match cat.fetch().await {
            Ok(rows) => {
                let raw = catalog_to_raw(&rows);
                if raw.is_empty() {
                    failures.push(format!("catalog {}: no active rules", cat.name()));
                } else {
                    match apply(state, raw, dry_run) {
                        Ok(res) => {
                            if !dry_run {
                                if let Err(e) = write_catalog_cache(&cache_path, &rows) {
                                    warn!(target: "tagging", error = %e, "could not write catalog cache");
                                }
                            }
                            info!(target: "tagging", source = cat.name(), rules = res.0, dry_run, "rules synced from catalog");
                            return Ok(outcome(SyncSource::Catalog, res, failures));
                        }
                        Err(e) => failures.push(format!("catalog {}: {e}", cat.name())),
                    }
                }
            }
            Err(e) => failures.push(format!("catalog {}: {e:#}", cat.name())),
        }
    }

    let rules_path = state.config().rules.path.clone();
    match load_rules_file(&rules_path).and_then(|raw| apply(state, raw, dry_run)) {
        Ok(res) => {
            info!(target: "tagging", path = %rules_path.display(), rules = res.0, dry_run, "rules synced from file");
            return Ok(outcome(SyncSource::RulesFile, res, failures));
        }
        Err(e) => failures.push(format!("rules file: {e}")),
    }

    match read_catalog_cache(&cache_path).and_then(|rows| apply(state, catalog_to_raw(&rows), dry_run)) {
        Ok(res) => {
            warn!(target: "tagging", rules = res.0, dry_run, "rules synced from cached catalog");
            Ok(outcome(SyncSource::CatalogCache, res, failures))
        }
        Err(e) => {
            failures.push(format!("catalog cache: {e}"));
            counter!("tagging_sync_failures_total").increment(1);
            Err(TaggingError::Catalog(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tag: &str, patterns: &[&str]) -> CatalogRule {
        CatalogRule {
            tag: tag.to_string(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            weight: None,
            category: None,
            active: true,
        }
    }

    #[test]
    fn rows_become_raw_rules() {
        let mut inactive = row("Topic/Old", &["old"]);
        inactive.active = false;
        let mut weighted = row("Finance/IFRS", &["ifrs"]);
        weighted.weight = Some(1.5);
        weighted.exclude = vec!["@".into()];
        let raw = catalog_to_raw(&[
            weighted,
            inactive,
            row("Topic/Empty", &[]),
            row("  ", &["x"]),
        ]);
        assert_eq!(raw.len(), 1);
        let (rules, errors) = normalize_rules(&raw);
        assert!(errors.is_empty());
        assert_eq!(rules[0].weight, 1.5);
        assert_eq!(rules[0].excludes, vec!["@"]);
    }

    #[test]
    fn cache_file_roundtrip_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache/tag_rules.json");
        write_catalog_cache(&path, &[row("Topic/A", &["a"])]).unwrap();
        let back = read_catalog_cache(&path).unwrap();
        assert_eq!(back[0].tag, "Topic/A");
        assert!(back[0].active);
    }

    #[test]
    fn rows_default_to_active() {
        let rows: Vec<CatalogRule> =
            serde_json::from_str(r#"[{"tag": "Topic/A", "patterns": ["a"]}]"#).unwrap();
        assert!(rows[0].active);
        assert!(rows[0].weight.is_none());
    }
}
