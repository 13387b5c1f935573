//! Scored pattern matcher (strategy B): weighted regex hits with absolute
//! exclusions, plus people-directory detection.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use super::compiler::{CompiledRule, RuleSetSnapshot};

pub const DEFAULT_THRESHOLD: f64 = 0.8;
/// Score given to a person found by alias.
pub const PERSON_SCORE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTag {
    pub name: String,
    pub score: f64,
}

/// Inclusion hits × weight; any exclusion match forces 0.0.
pub fn score(text: &str, rule: &CompiledRule) -> f64 {
    if rule.excludes.iter().any(|re| re.is_match(text)) {
        return 0.0;
    }
    let hits: usize = rule
        .patterns
        .iter()
        .map(|re| re.find_iter(text).count())
        .sum();
    hits as f64 * rule.weight
}

/// Every rule with a strictly positive score, plus people found by alias.
/// Sorted by score descending, then name.
pub fn tag_text_scored(snapshot: &RuleSetSnapshot, text: &str) -> Vec<ScoredTag> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut best: HashMap<&str, f64> = HashMap::new();
    for rule in &snapshot.rules {
        let s = score(text, rule);
        if s > 0.0 {
            best.insert(rule.name.as_str(), s);
        }
    }

    if !snapshot.people.is_empty() {
        let lower = text.to_lowercase();
        for person in &snapshot.people {
            if person.needles.iter().any(|n| lower.contains(n.as_str())) {
                let entry = best.entry(person.label.as_str()).or_insert(0.0);
                if *entry < PERSON_SCORE {
                    *entry = PERSON_SCORE;
                }
            }
        }
    }

    let mut out: Vec<ScoredTag> = best
        .into_iter()
        .map(|(name, score)| ScoredTag {
            name: name.to_string(),
            score,
        })
        .collect();
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

/// Labels with `score >= threshold`, distinct and alphabetical.
pub fn tag_text(snapshot: &RuleSetSnapshot, text: &str, threshold: f64) -> Vec<String> {
    labels_above(&tag_text_scored(snapshot, text), threshold)
}

pub fn labels_above(scored: &[ScoredTag], threshold: f64) -> Vec<String> {
    scored
        .iter()
        .filter(|t| t.score >= threshold)
        .map(|t| t.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
