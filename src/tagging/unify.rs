//! Unifier: maps strategy-A labels into the canonical label space and fuses
//! both strategies into one deterministic label set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::category::{canonicalize_label, comparison_key, Category};
use super::compiler::RuleSetSnapshot;
use super::scored::{labels_above, tag_text_scored};
use super::tokens::{tag_text_tokens, TextMeta};

/// Strategy-A label → canonical label. Consulted before the prefix rules.
const TOKEN_LABEL_MAP: &[(&str, &str)] = &[
    ("person/sasha_katanov", "People/Sasha Katanov"),
    ("person/valentin_dobrynin", "People/Valentin Dobrynin"),
    ("person/daniil", "People/Daniil"),
    ("area/ifrs", "Finance/IFRS"),
    ("area/audit", "Finance/Audit"),
    ("area/budget", "Finance/Budget"),
    ("project/budgets", "Finance/Budget"),
    ("area/lavka", "Business/Lavka"),
    ("area/kovcheg", "Business/Kovcheg"),
    ("area/alaska", "Business/Alaska"),
    ("project/evm", "Projects/EVM"),
    ("project/integration", "Projects/Integration"),
    ("topic/meeting", "Topic/Meeting"),
    ("topic/planning", "Topic/Planning"),
    ("topic/risk", "Topic/Risk"),
    ("topic/decision", "Topic/Decision"),
    ("topic/review", "Topic/Review"),
    ("topic/deadline", "Topic/Deadline"),
];

/// `area/<x>` values that map to `Finance/<X>` instead of `Topic/<X>`.
const FINANCE_AREAS: [&str; 3] = ["IFRS", "AUDIT", "BUDGET"];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `sasha_katanov` → `Sasha Katanov`.
fn title_case(slug: &str) -> String {
    slug.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Translate one strategy-A label into the canonical label space.
pub fn map_token_label(label: &str) -> String {
    let trimmed = label.trim();
    let lower = trimmed.to_lowercase();
    if let Some((_, canonical)) = TOKEN_LABEL_MAP.iter().find(|(k, _)| *k == lower) {
        return (*canonical).to_string();
    }

    let Some((prefix, rest)) = trimmed.split_once('/') else {
        return canonicalize_label(trimmed);
    };
    if rest.trim().is_empty() {
        return canonicalize_label(trimmed);
    }
    match prefix.to_lowercase().as_str() {
        "person" => format!("People/{}", title_case(rest)),
        "area" => {
            let upper = rest.trim().to_uppercase();
            if FINANCE_AREAS.contains(&upper.as_str()) {
                format!("Finance/{upper}")
            } else {
                format!("Topic/{}", title_case(rest))
            }
        }
        "project" => format!("Projects/{}", title_case(rest)),
        "topic" => format!("Topic/{}", title_case(rest)),
        _ => canonicalize_label(trimmed),
    }
}

/// Counters of one fuse operation; accumulated by the runtime stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupMetrics {
    pub v0_tags_total: u64,
    pub v1_tags_total: u64,
    pub merged_tags_total: u64,
    pub duplicates_removed: u64,
    pub v1_priority_wins: u64,
    pub people_tags_preserved: u64,
}

impl DedupMetrics {
    pub fn absorb(&mut self, other: &DedupMetrics) {
        self.v0_tags_total += other.v0_tags_total;
        self.v1_tags_total += other.v1_tags_total;
        self.merged_tags_total += other.merged_tags_total;
        self.duplicates_removed += other.duplicates_removed;
        self.v1_priority_wins += other.v1_priority_wins;
        self.people_tags_preserved += other.people_tags_preserved;
    }
}

/// Family order first (People, Business, Projects, Finance, Topic, other),
/// then lexicographic.
pub fn sort_by_family<F>(labels: &mut [String], classify: F)
where
    F: Fn(&str) -> Category,
{
    labels.sort_by(|a, b| {
        classify(a)
            .family_rank()
            .cmp(&classify(b).family_rank())
            .then_with(|| a.cmp(b))
    });
}

/// Fuse strategy-A (`token`, loose naming) and strategy-B (`scored`,
/// canonical) labels. Same comparison key → the scored label wins. Person
/// labels from either side survive with exact-string dedup only.
pub fn dedup_fuse<F>(token: &[String], scored: &[String], classify: F) -> (Vec<String>, DedupMetrics)
where
    F: Fn(&str) -> Category,
{
    let mut metrics = DedupMetrics {
        v0_tags_total: token.len() as u64,
        v1_tags_total: scored.len() as u64,
        ..Default::default()
    };

    let mut people: BTreeSet<String> = BTreeSet::new();
    let mut by_key: BTreeMap<String, String> = BTreeMap::new();

    for label in scored {
        let label = canonicalize_label(label);
        if label.is_empty() {
            continue;
        }
        if classify(&label) == Category::Person {
            if !people.insert(label) {
                metrics.duplicates_removed += 1;
            }
            continue;
        }
        let key = comparison_key(&label);
        if by_key.contains_key(&key) {
            metrics.duplicates_removed += 1;
        } else {
            by_key.insert(key, label);
        }
    }
    let scored_keys: BTreeSet<String> = by_key.keys().cloned().collect();

    for raw in token {
        let label = map_token_label(raw);
        if label.is_empty() {
            continue;
        }
        if classify(&label) == Category::Person {
            if !people.insert(label) {
                metrics.duplicates_removed += 1;
            }
            continue;
        }
        let key = comparison_key(&label);
        if by_key.contains_key(&key) {
            metrics.duplicates_removed += 1;
            if scored_keys.contains(&key) {
                metrics.v1_priority_wins += 1;
            }
        } else {
            by_key.insert(key, label);
        }
    }

    metrics.people_tags_preserved = people.len() as u64;
    let mut merged: Vec<String> = people.into_iter().chain(by_key.into_values()).collect();
    sort_by_family(&mut merged, &classify);
    metrics.merged_tags_total = merged.len() as u64;
    (merged, metrics)
}

/// Which matchers a tagging call runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    /// Strategy A only, mapped to canonical labels.
    Tokens,
    /// Strategy B only.
    Scored,
    #[default]
    Both,
}

impl std::str::FromStr for TagMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tokens" | "v0" => Ok(TagMode::Tokens),
            "scored" | "v1" => Ok(TagMode::Scored),
            "both" => Ok(TagMode::Both),
            other => Err(format!("unknown tag mode `{other}`")),
        }
    }
}

impl TagMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TagMode::Tokens => "tokens",
            TagMode::Scored => "scored",
            TagMode::Both => "both",
        }
    }
}

/// The two interchangeable matchers as a closed set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Token { min_hits: usize },
    Scored { threshold: f64 },
}

/// Labels produced by one strategy, still in that strategy's naming.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCandidates {
    pub strategy: Strategy,
    pub labels: Vec<String>,
    /// Scores of the accepted labels; empty for the token strategy.
    pub scores: Vec<f64>,
}

impl Strategy {
    pub fn evaluate(&self, snapshot: &RuleSetSnapshot, text: &str, meta: &TextMeta) -> LabelCandidates {
        match *self {
            Strategy::Token { min_hits } => LabelCandidates {
                strategy: *self,
                labels: tag_text_tokens(&snapshot.synonyms, text, meta, min_hits),
                scores: Vec::new(),
            },
            Strategy::Scored { threshold } => {
                let scored = tag_text_scored(snapshot, text);
                let scores = scored
                    .iter()
                    .filter(|t| t.score >= threshold)
                    .map(|t| t.score)
                    .collect();
                LabelCandidates {
                    strategy: *self,
                    labels: labels_above(&scored, threshold),
                    scores,
                }
            }
        }
    }
}

/// Output of one unified tagging pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Unified {
    pub labels: Vec<String>,
    pub metrics: DedupMetrics,
    /// Mean strategy-B score of the accepted labels, if any.
    pub mean_score: Option<f64>,
}

fn mean(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

/// Run the strategies selected by `mode` and fuse their output.
pub fn unify(
    snapshot: &RuleSetSnapshot,
    text: &str,
    meta: &TextMeta,
    mode: TagMode,
    min_hits: usize,
    threshold: f64,
) -> Unified {
    let classify = |label: &str| snapshot.category_of(label);
    let token = match mode {
        TagMode::Scored => None,
        _ => Some(Strategy::Token { min_hits }.evaluate(snapshot, text, meta)),
    };
    let scored = match mode {
        TagMode::Tokens => None,
        _ => Some(Strategy::Scored { threshold }.evaluate(snapshot, text, meta)),
    };

    let empty: &[String] = &[];
    let (labels, metrics) = dedup_fuse(
        token.as_ref().map_or(empty, |c| c.labels.as_slice()),
        scored.as_ref().map_or(empty, |c| c.labels.as_slice()),
        classify,
    );
    Unified {
        labels,
        metrics,
        mean_score: scored.as_ref().and_then(|c| mean(&c.scores)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_mapping_wins_over_prefix_rules() {
        assert_eq!(map_token_label("area/ifrs"), "Finance/IFRS");
        assert_eq!(map_token_label("project/budgets"), "Finance/Budget");
        assert_eq!(map_token_label("area/lavka"), "Business/Lavka");
        assert_eq!(map_token_label("AREA/IFRS"), "Finance/IFRS");
    }

    #[test]
    fn prefix_rules() {
        assert_eq!(map_token_label("person/ivan_petrov"), "People/Ivan Petrov");
        assert_eq!(map_token_label("area/tax"), "Topic/Tax");
        assert_eq!(map_token_label("project/new_crm"), "Projects/New Crm");
        assert_eq!(map_token_label("topic/retro"), "Topic/Retro");
        assert_eq!(map_token_label("  Misc/Some   thing "), "Misc/Some thing");
        assert_eq!(map_token_label("plain"), "plain");
    }

    #[test]
    fn scored_spelling_wins_on_same_key() {
        let (merged, m) = dedup_fuse(
            &strings(&["area/ifrs", "topic/risk"]),
            &strings(&["Finance/Ifrs"]),
            Category::from_label,
        );
        assert_eq!(merged, vec!["Finance/Ifrs", "Topic/Risk"]);
        assert_eq!(m.v1_priority_wins, 1);
        assert_eq!(m.duplicates_removed, 1);
        assert_eq!(m.merged_tags_total, 2);
    }

    #[test]
    fn people_from_one_side_are_kept() {
        let (merged, m) = dedup_fuse(
            &strings(&["person/sasha_katanov"]),
            &strings(&["People/Valentin Dobrynin", "Finance/IFRS"]),
            Category::from_label,
        );
        assert_eq!(
            merged,
            vec![
                "People/Sasha Katanov",
                "People/Valentin Dobrynin",
                "Finance/IFRS"
            ]
        );
        assert_eq!(m.people_tags_preserved, 2);
    }

    #[test]
    fn family_order_is_stable() {
        let (merged, _) = dedup_fuse(
            &[],
            &strings(&["Topic/A", "Misc/X", "Finance/B", "Projects/C", "Business/D", "People/E"]),
            Category::from_label,
        );
        assert_eq!(
            merged,
            vec!["People/E", "Business/D", "Projects/C", "Finance/B", "Topic/A", "Misc/X"]
        );
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Scored".parse::<TagMode>(), Ok(TagMode::Scored));
        assert_eq!("v0".parse::<TagMode>(), Ok(TagMode::Tokens));
        assert!("all".parse::<TagMode>().is_err());
    }
}
