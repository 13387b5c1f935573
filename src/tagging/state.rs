// src/tagging/state.rs
//! Runtime state: the active snapshot, result cache and call statistics,
//! shared by every caller through `Arc<RuntimeState>`.
//!
//! Reads clone the snapshot `Arc` under a short read lock and then work on
//! the immutable snapshot. A reload compiles outside the lock and holds the
//! write lock only for the pointer swap.

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::cache::{CacheKey, ResultCache};
use super::category::Category;
use super::compiler::{compile_bundle, validate_bundle, RuleSetSnapshot};
use super::error::TaggingError;
use super::inherit::inherit;
use super::scored::{self, ScoredTag};
use super::stats::{CacheView, CallStats, TaggingStats};
use super::store::{load_bundle, RuleBundle};
use super::tokens::{self, TextMeta};
use super::unify::{unify, Unified};
use crate::config::TaggingConfig;

/// Record kind a text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Meeting,
    Commit,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TagKind::Meeting => "meeting",
            TagKind::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Loaded,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loaded => "loaded",
        }
    }
}

fn is_dev_env() -> bool {
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

// Dev logging gate: TAGGING_DEV_LOG=1 AND dev env
pub(crate) fn dev_logging_enabled() -> bool {
    std::env::var("TAGGING_DEV_LOG").ok().as_deref() == Some("1") && is_dev_env()
}

/// Short anonymous id for a text; raw text is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn dev_log_tagging(kind: TagKind, text: &str, labels: &[String], cached: bool) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(text);
    let labels_short: Vec<&str> = labels.iter().take(5).map(String::as_str).collect();
    info!(
        target: "tagging",
        %id, kind = kind.as_str(), cached,
        count = labels.len(),
        labels = ?labels_short,
        "tagged text"
    );
}

fn recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

pub struct RuntimeState {
    config: TaggingConfig,
    active: RwLock<Arc<RuleSetSnapshot>>,
    reload_lock: Mutex<()>,
    last_version: AtomicU64,
    cache: ResultCache<Vec<String>>,
    stats: Mutex<CallStats>,
}

impl RuntimeState {
    /// Uninitialized state: tagging returns empty results until the first reload.
    pub fn new(config: TaggingConfig) -> Self {
        let cache = ResultCache::new(config.cache.capacity, config.cache_ttl());
        Self {
            config,
            active: RwLock::new(Arc::new(RuleSetSnapshot::empty())),
            reload_lock: Mutex::new(()),
            last_version: AtomicU64::new(0),
            cache,
            stats: Mutex::new(CallStats::default()),
        }
    }

    /// Build and load the configured rule files.
    pub fn from_config(config: TaggingConfig) -> Result<Self, TaggingError> {
        let state = Self::new(config);
        state.reload_rules()?;
        Ok(state)
    }

    pub fn config(&self) -> &TaggingConfig {
        &self.config
    }

    /// Currently active snapshot; `None` only if the lock is poisoned.
    pub fn snapshot(&self) -> Option<Arc<RuleSetSnapshot>> {
        match self.active.read() {
            Ok(guard) => Some(Arc::clone(&guard)),
            Err(_) => {
                error!(target: "tagging", "snapshot lock poisoned");
                None
            }
        }
    }

    pub fn state(&self) -> EngineState {
        match self.snapshot() {
            Some(s) if s.is_loaded() => EngineState::Loaded,
            _ => EngineState::Uninitialized,
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot().map(|s| s.version).unwrap_or(0)
    }

    /// Compile `bundle` and make it active. On failure the previous snapshot
    /// stays active and every validation error is returned.
    pub fn reload_with(&self, bundle: &RuleBundle) -> Result<usize, TaggingError> {
        let _serialized = self
            .reload_lock
            .lock()
            .map_err(|_| TaggingError::LockPoisoned)?;

        let started = Instant::now();
        let compiled = compile_bundle(bundle, &self.config.compile_limits()).map_err(|report| {
            counter!("tagging_reloads_total", "outcome" => "rejected").increment(1);
            warn!(
                target: "tagging",
                errors = report.errors.len(),
                "rule reload rejected, keeping active rules"
            );
            TaggingError::Validation(report.errors)
        })?;

        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(compiled.snapshot.activate(version, Utc::now()));
        let count = snapshot.stats.total_rules;
        {
            let mut active = self
                .active
                .write()
                .map_err(|_| TaggingError::LockPoisoned)?;
            *active = snapshot;
        }
        self.clear_cache();

        counter!("tagging_reloads_total", "outcome" => "ok").increment(1);
        gauge!("tagging_rules_active").set(count as f64);
        info!(
            target: "tagging",
            version,
            rules = count,
            warnings = compiled.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rules reloaded"
        );
        Ok(count)
    }

    /// Read the configured files, then [`reload_with`](Self::reload_with).
    pub fn reload_rules(&self) -> Result<usize, TaggingError> {
        let bundle = load_bundle(&self.config.bundle_paths())?;
        self.reload_with(&bundle)
    }

    /// Compile without swapping. Empty means valid; warnings carry a `WARNING: ` prefix.
    pub fn validate(&self, bundle: &RuleBundle) -> Vec<String> {
        validate_bundle(bundle, &self.config.compile_limits()).messages()
    }

    pub fn validate_rules(&self) -> Vec<String> {
        match load_bundle(&self.config.bundle_paths()) {
            Ok(bundle) => self.validate(&bundle),
            Err(e) => vec![e.to_string()],
        }
    }

    pub fn tag_text(&self, text: &str, kind: TagKind) -> Vec<String> {
        self.tag_text_with_meta(text, kind, &TextMeta::default())
    }

    /// Unified labels for `text`, cached per snapshot version. Never fails:
    /// internal problems are logged and produce an empty result.
    pub fn tag_text_with_meta(&self, text: &str, kind: TagKind, meta: &TextMeta) -> Vec<String> {
        let started = Instant::now();
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        if !snapshot.is_loaded() {
            return Vec::new();
        }
        if text.trim().is_empty() && meta.title.trim().is_empty() && meta.attendees.is_empty() {
            return Vec::new();
        }

        let mode = self.config.mode;
        let attendees = meta.attendees.join("\u{1f}");
        let key = CacheKey::new(
            snapshot.version,
            &[kind.as_str(), mode.as_str(), text, &meta.title, &attendees],
        );

        if let Some(labels) = self.cache.get(&key) {
            counter!("tagging_cache_hits_total").increment(1);
            let mut stats = recover(&self.stats);
            stats.record_cache(true);
            stats.record_call(kind.as_str(), &labels, None, started.elapsed());
            drop(stats);
            dev_log_tagging(kind, text, &labels, true);
            return labels;
        }
        counter!("tagging_cache_misses_total").increment(1);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            unify(
                &snapshot,
                text,
                meta,
                mode,
                self.config.min_token_hits,
                self.config.min_score,
            )
        }));
        let Unified {
            labels,
            metrics: dedup,
            mean_score,
        } = match outcome {
            Ok(u) => u,
            Err(_) => {
                error!(target: "tagging", id = %anon_hash(text), "tagging failed, returning no labels");
                return Vec::new();
            }
        };

        self.cache.insert(key, labels.clone());
        let elapsed = started.elapsed();
        {
            let mut stats = recover(&self.stats);
            stats.record_cache(false);
            stats.record_dedup(&dedup);
            stats.record_call(kind.as_str(), &labels, mean_score, elapsed);
        }
        counter!("tagging_calls_total", "kind" => kind.as_str()).increment(1);
        histogram!("tagging_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
        dev_log_tagging(kind, text, &labels, false);
        labels
    }

    /// Strategy B only, every positive score, highest first.
    pub fn tag_text_scored(&self, text: &str) -> Vec<ScoredTag> {
        match self.snapshot() {
            Some(s) => scored::tag_text_scored(&s, text),
            None => Vec::new(),
        }
    }

    /// Strategy B labels at an explicit threshold, alphabetical.
    pub fn tag_text_above(&self, text: &str, threshold: f64) -> Vec<String> {
        match self.snapshot() {
            Some(s) => scored::tag_text(&s, text, threshold),
            None => Vec::new(),
        }
    }

    /// Strategy A only, in its own loose naming.
    pub fn tag_text_tokens(&self, text: &str, meta: &TextMeta) -> Vec<String> {
        match self.snapshot() {
            Some(s) if s.is_loaded() => {
                tokens::tag_text_tokens(&s.synonyms, text, meta, self.config.min_token_hits)
            }
            _ => Vec::new(),
        }
    }

    /// Labels for a new commit: its own labels plus what it inherits from the meeting.
    pub fn merge_meeting_and_commit_tags(&self, meeting: &[String], commit: &[String]) -> Vec<String> {
        let snapshot = self.snapshot();
        let classify = |label: &str| match &snapshot {
            Some(s) => s.category_of(label),
            None => Category::from_label(label),
        };
        let (merged, metrics) = inherit(meeting, commit, classify);
        recover(&self.stats).record_inheritance(&metrics);
        merged
    }

    pub fn get_rules_stats(&self) -> TaggingStats {
        let snapshot = self
            .snapshot()
            .unwrap_or_else(|| Arc::new(RuleSetSnapshot::empty()));
        let cache = CacheView {
            expired_total: self.cache.expired_total(),
            size: self.cache.len(),
            capacity: self.cache.capacity(),
        };
        let state = if snapshot.is_loaded() {
            EngineState::Loaded
        } else {
            EngineState::Uninitialized
        };
        TaggingStats {
            state: state.as_str(),
            version: snapshot.version,
            mode: self.config.mode,
            min_score: self.config.min_score,
            rules: snapshot.stats.clone(),
            calls: recover(&self.stats).view(),
            cache,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop expired cache entries; returns how many were removed.
    pub fn prune_cache(&self) -> usize {
        self.cache.prune()
    }
}

/// Returns true if we should enable hot reload (dev/local only).
fn hot_reload_enabled() -> bool {
    std::env::var("TAGGING_HOT_RELOAD").ok().as_deref() == Some("1") && is_dev_env()
}

fn latest_mtime(paths: &[PathBuf]) -> Option<SystemTime> {
    paths
        .iter()
        .filter_map(|p| fs::metadata(p).and_then(|m| m.modified()).ok())
        .max()
}

/// Poll the configured rule files every 2s and reload on change.
/// A rejected reload keeps the previous rules.
pub fn start_hot_reload_thread(state: Arc<RuntimeState>) {
    if !hot_reload_enabled() {
        return;
    }

    let bundle = state.config().bundle_paths();
    let mut paths = vec![bundle.rules];
    paths.extend(bundle.synonyms);
    paths.extend(bundle.people);

    let mut last_mtime = latest_mtime(&paths);
    thread::spawn(move || {
        let poll = Duration::from_secs(2);

        loop {
            thread::sleep(poll);
            let Some(mtime) = latest_mtime(&paths) else {
                continue;
            };
            if last_mtime.is_some_and(|prev| mtime <= prev) {
                continue;
            }
            last_mtime = Some(mtime);
            match state.reload_rules() {
                Ok(count) => info!(target: "tagging", rules = count, "hot reload applied"),
                Err(e) => warn!(target: "tagging", error = %e, "hot reload rejected"),
            }
        }
    });
}

/// Periodically drop expired cache entries.
pub fn spawn_cache_housekeeping(state: Arc<RuntimeState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(100)));
        loop {
            ticker.tick().await;
            let pruned = state.prune_cache();
            counter!("tagging_cache_pruned_total").increment(pruned as u64);
            if pruned > 0 {
                tracing::debug!(target: "tagging", pruned, "cache housekeeping tick");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::store::{Person, RawRuleSet, SynonymDictionary};

    fn bundle(yaml: &str) -> RuleBundle {
        RuleBundle::from_rules(RawRuleSet::from_yaml_str(yaml).unwrap())
    }

    const RULES: &str = r#"
Finance/IFRS:
  patterns: ["ifrs", "мсфо"]
  exclude: ["@"]
  weight: 1.2
Topic/Planning: ["план"]
"#;

    #[test]
    fn starts_uninitialized_and_returns_nothing() {
        let st = RuntimeState::new(TaggingConfig::default());
        assert_eq!(st.state(), EngineState::Uninitialized);
        assert!(st.tag_text("ifrs ifrs", TagKind::Meeting).is_empty());
        assert_eq!(st.get_rules_stats().state, "uninitialized");
    }

    #[test]
    fn uninitialized_ignores_metadata_and_caches_nothing() {
        let st = RuntimeState::new(TaggingConfig::default());
        let meta = TextMeta {
            title: "Weekly sync".into(),
            attendees: vec!["Alice Smith".into()],
        };
        assert!(st.tag_text_with_meta("anything", TagKind::Meeting, &meta).is_empty());
        assert!(st.tag_text_tokens("anything", &meta).is_empty());
        let stats = st.get_rules_stats();
        assert_eq!(stats.cache.size, 0);
        assert_eq!(stats.calls.total_calls, 0);
    }

    #[tokio::test]
    async fn housekeeping_drops_expired_entries() {
        let mut cfg = TaggingConfig::default();
        cfg.cache.ttl_secs = 1;
        let st = Arc::new(RuntimeState::new(cfg));
        st.reload_with(&bundle(RULES)).unwrap();
        st.tag_text("ifrs план", TagKind::Meeting);
        st.tag_text("мсфо", TagKind::Commit);

        let task = spawn_cache_housekeeping(st.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1600)).await;

        let cache = st.get_rules_stats().cache;
        assert_eq!(cache.expired_total, 2);
        assert_eq!(cache.size, 0);
        task.abort();
    }

    #[test]
    fn reload_bumps_version_and_counts_rules() {
        let st = RuntimeState::new(TaggingConfig::default());
        assert_eq!(st.reload_with(&bundle(RULES)).unwrap(), 2);
        assert_eq!(st.state(), EngineState::Loaded);
        assert_eq!(st.version(), 1);
        st.reload_with(&bundle(RULES)).unwrap();
        assert_eq!(st.version(), 2);
        assert!(st.get_rules_stats().rules.last_reload.is_some());
    }

    #[test]
    fn unified_output_merges_strategies() {
        let mut syn = SynonymDictionary::new();
        syn.insert("area/ifrs".into(), vec!["ifrs".into()]);
        syn.insert("area/lavka".into(), vec!["лавка".into()]);
        let b = bundle(RULES).with_synonyms(syn).with_people(vec![Person {
            name_en: "Daniil".into(),
            aliases: vec!["Даниил".into()],
        }]);
        let st = RuntimeState::new(TaggingConfig::default());
        st.reload_with(&b).unwrap();

        let labels = st.tag_text("Даниил: ifrs для Лавки", TagKind::Meeting);
        assert_eq!(labels, vec!["People/Daniil", "Business/Lavka", "Finance/IFRS"]);
        let stats = st.get_rules_stats();
        assert_eq!(stats.calls.dedup.v1_priority_wins, 1);
    }

    #[test]
    fn repeated_calls_hit_the_cache() {
        let st = RuntimeState::new(TaggingConfig::default());
        st.reload_with(&bundle(RULES)).unwrap();
        let a = st.tag_text("ifrs план", TagKind::Commit);
        let b = st.tag_text("ifrs план", TagKind::Commit);
        assert_eq!(a, b);
        let calls = st.get_rules_stats().calls;
        assert_eq!(calls.cache_hits, 1);
        assert_eq!(calls.cache_misses, 1);
        assert_eq!(calls.total_calls, 2);
    }

    #[test]
    fn validate_reports_without_swapping() {
        let st = RuntimeState::new(TaggingConfig::default());
        st.reload_with(&bundle(RULES)).unwrap();
        let errs = st.validate(&bundle("Finance/Bad: [\"(\"]"));
        assert_eq!(errs.len(), 1);
        assert!(errs[0].starts_with("Invalid regex in Finance/Bad pattern 0"));
        assert_eq!(st.version(), 1);
        assert!(st.validate(&bundle(RULES)).is_empty());
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        assert_eq!(anon_hash("abc").len(), 12);
        assert_eq!(anon_hash("abc"), anon_hash("abc"));
        assert_ne!(anon_hash("abc"), anon_hash("abd"));
    }
}
