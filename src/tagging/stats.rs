//! Call statistics kept by the runtime state.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use super::compiler::SnapshotStats;
use super::inherit::InheritanceMetrics;
use super::unify::{DedupMetrics, TagMode};

const LATENCY_WINDOW: usize = 100;
const TOP_TAGS: usize = 10;
const EMA_KEEP: f64 = 0.9;

#[derive(Debug, Default)]
pub struct CallStats {
    total_calls: u64,
    calls_by_kind: BTreeMap<String, u64>,
    tags_found: u64,
    avg_score: Option<f64>,
    tag_counts: HashMap<String, u64>,
    latencies_ms: VecDeque<f64>,
    cache_hits: u64,
    cache_misses: u64,
    dedup: DedupMetrics,
    inheritance: InheritanceMetrics,
}

impl CallStats {
    /// One tagging call. `mean_score` is the average strategy-B score of the
    /// call, when it produced any.
    pub fn record_call(
        &mut self,
        kind: &str,
        labels: &[String],
        mean_score: Option<f64>,
        elapsed: Duration,
    ) {
        self.total_calls += 1;
        *self.calls_by_kind.entry(kind.to_string()).or_insert(0) += 1;
        self.tags_found += labels.len() as u64;
        for label in labels {
            *self.tag_counts.entry(label.clone()).or_insert(0) += 1;
        }
        if let Some(s) = mean_score {
            self.avg_score = Some(match self.avg_score {
                None => s,
                Some(prev) => EMA_KEEP * prev + (1.0 - EMA_KEEP) * s,
            });
        }
        if self.latencies_ms.len() == LATENCY_WINDOW {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_cache(&mut self, hit: bool) {
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }

    pub fn record_dedup(&mut self, m: &DedupMetrics) {
        self.dedup.absorb(m);
    }

    pub fn record_inheritance(&mut self, m: &InheritanceMetrics) {
        self.inheritance.absorb(m);
    }

    pub fn top_tags(&self, n: usize) -> Vec<TagCount> {
        let mut v: Vec<TagCount> = self
            .tag_counts
            .iter()
            .map(|(tag, count)| TagCount {
                tag: tag.clone(),
                count: *count,
            })
            .collect();
        v.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        v.truncate(n);
        v
    }

    pub fn view(&self) -> CallStatsView {
        let top_tags = self.top_tags(TOP_TAGS);
        let avg_latency_ms = if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
        };
        CallStatsView {
            total_calls: self.total_calls,
            calls_by_kind: self.calls_by_kind.clone(),
            tags_found: self.tags_found,
            avg_score: self.avg_score.unwrap_or(0.0),
            avg_latency_ms,
            most_frequent_tag: top_tags.first().map(|t| t.tag.clone()),
            top_tags,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            dedup: self.dedup,
            inheritance: self.inheritance.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallStatsView {
    pub total_calls: u64,
    pub calls_by_kind: BTreeMap<String, u64>,
    pub tags_found: u64,
    /// Exponential moving average of per-call scores.
    pub avg_score: f64,
    /// Mean over the last 100 calls.
    pub avg_latency_ms: f64,
    pub most_frequent_tag: Option<String>,
    pub top_tags: Vec<TagCount>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub dedup: DedupMetrics,
    pub inheritance: InheritanceMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheView {
    pub size: usize,
    pub capacity: usize,
    /// Entries dropped for exceeding the TTL since start.
    pub expired_total: u64,
}

/// Everything `get_rules_stats` reports.
#[derive(Debug, Clone, Serialize)]
pub struct TaggingStats {
    pub state: &'static str,
    pub version: u64,
    pub mode: TagMode,
    pub min_score: f64,
    pub rules: SnapshotStats,
    pub calls: CallStatsView,
    pub cache: CacheView,
}
