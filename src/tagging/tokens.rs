//! Token matcher (strategy A): tokenizer, suffix stemming and a synonym index.
//!
//! Trades precision for recall: `аудита`, `аудитом` and `audits` all reduce
//! to the same stem as the dictionary synonym, which a literal regex would
//! miss. Labels come out in the loose strategy-A naming (`area/ifrs`,
//! `person/sasha_katanov`) and are mapped to canonical labels by the unifier.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use super::store::SynonymDictionary;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-zА-Яа-яЁё0-9\-]+").expect("token regex"));
static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-]+").expect("non-word regex"));

/// Suffixes cut by [`normalize_token`], longest first. At most one is removed.
const SUFFIXES: &[&str] = &[
    "ированием",
    "ирование",
    "ирования",
    "ованием",
    "ением",
    "ание",
    "ения",
    "ении",
    "ings",
    "ами",
    "ями",
    "ием",
    "ией",
    "ета",
    "ете",
    "ing",
    "ах",
    "ях",
    "ую",
    "ем",
    "ам",
    "ям",
    "ов",
    "ев",
    "ые",
    "ий",
    "ой",
    "ый",
    "ая",
    "ия",
    "ся",
    "ть",
    "ти",
    "ет",
    "ла",
    "ли",
    "ло",
    "ed",
    "л",
    "а",
    "е",
    "и",
    "о",
    "у",
    "ы",
    "я",
    "s",
];

/// Minimum stem length (in characters) left after cutting a suffix.
const MIN_STEM_CHARS: usize = 3;

/// Metadata that accompanies a meeting transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub attendees: Vec<String>,
}

impl TextMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            attendees: Vec::new(),
        }
    }
}

/// Lowercase, drop everything but word characters and `-`, then cut one suffix.
pub fn normalize_token(word: &str) -> String {
    let lower = word.to_lowercase();
    let cleaned = NON_WORD_RE.replace_all(&lower, "");
    let mut w = cleaned.into_owned();

    for suffix in SUFFIXES {
        if *suffix == "s" && w.ends_with("ss") {
            continue;
        }
        if let Some(stem) = w.strip_suffix(suffix) {
            if stem.chars().count() >= MIN_STEM_CHARS {
                w = stem.to_string();
                break;
            }
        }
    }
    w
}

/// Frequency of normalized tokens; tokens shorter than two characters are skipped.
pub fn token_counts(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for m in TOKEN_RE.find_iter(text) {
        let normalized = normalize_token(m.as_str());
        if normalized.chars().count() < 2 {
            continue;
        }
        *counts.entry(normalized).or_insert(0) += 1;
    }
    counts
}

/// Normalized synonym → strategy-A label.
#[derive(Debug, Clone, Default)]
pub struct SynonymIndex {
    by_token: HashMap<String, String>,
}

impl SynonymIndex {
    pub fn build(dictionary: &SynonymDictionary) -> Self {
        let mut by_token = HashMap::new();
        for (label, synonyms) in dictionary {
            for synonym in synonyms {
                let key = normalize_token(synonym);
                if key.is_empty() {
                    continue;
                }
                if let Some(prev) = by_token.insert(key.clone(), label.clone()) {
                    debug!(
                        target: "tagging",
                        synonym = %synonym, %key, previous = %prev, label = %label,
                        "duplicate synonym, later label wins"
                    );
                }
            }
        }
        Self { by_token }
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    pub fn lookup(&self, token: &str) -> Option<&str> {
        self.by_token.get(token).map(String::as_str)
    }
}

/// `Sasha Katanov` → `person/sasha_katanov`.
pub fn attendee_label(name: &str) -> Option<String> {
    let slug = name.trim().to_lowercase().replace(' ', "_");
    if slug.is_empty() {
        None
    } else {
        Some(format!("person/{slug}"))
    }
}

/// Strategy A. Returns sorted, distinct strategy-A labels.
pub fn tag_text_tokens(
    index: &SynonymIndex,
    text: &str,
    meta: &TextMeta,
    min_hits: usize,
) -> Vec<String> {
    let full = format!("{} {}", text, meta.title);
    let counts = token_counts(&full);

    let mut found = BTreeSet::new();
    for (token, count) in &counts {
        if *count < min_hits.max(1) {
            continue;
        }
        if let Some(label) = index.lookup(token) {
            found.insert(label.to_string());
        }
    }
    for attendee in &meta.attendees {
        if let Some(label) = attendee_label(attendee) {
            found.insert(label);
        }
    }
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> SynonymDictionary {
        let mut d = SynonymDictionary::new();
        d.insert("area/audit".into(), vec!["аудит".into(), "audit".into()]);
        d.insert("area/ifrs".into(), vec!["ifrs".into(), "мсфо".into()]);
        d.insert("topic/meeting".into(), vec!["meeting".into()]);
        d
    }

    #[test]
    fn suffixes_are_cut_once() {
        assert_eq!(normalize_token("Аудита"), "аудит");
        assert_eq!(normalize_token("аудитами"), "аудит");
        assert_eq!(normalize_token("Audits"), "audit");
        assert_eq!(normalize_token("meetings"), "meet");
        assert_eq!(normalize_token("process"), "process");
    }

    #[test]
    fn short_stems_are_kept_whole() {
        // cutting "а" would leave two characters
        assert_eq!(normalize_token("эта"), "эта");
        assert_eq!(normalize_token("is"), "is");
    }

    #[test]
    fn punctuation_is_stripped() {
        assert_eq!(normalize_token("Budget!"), "budget");
        assert_eq!(normalize_token("«Лавка»"), "лавк");
    }

    #[test]
    fn morphological_variants_match() {
        let idx = SynonymIndex::build(&dict());
        let out = tag_text_tokens(
            &idx,
            "Обсудили итоги аудита, два audits и МСФО",
            &TextMeta::default(),
            1,
        );
        assert_eq!(out, vec!["area/audit", "area/ifrs"]);
    }

    #[test]
    fn min_hits_threshold() {
        let idx = SynonymIndex::build(&dict());
        let out = tag_text_tokens(&idx, "audit once", &TextMeta::default(), 2);
        assert!(out.is_empty());
        let out = tag_text_tokens(&idx, "audit and audit", &TextMeta::default(), 2);
        assert_eq!(out, vec!["area/audit"]);
    }

    #[test]
    fn title_and_attendees_contribute() {
        let idx = SynonymIndex::build(&dict());
        let meta = TextMeta {
            title: "Weekly meeting".into(),
            attendees: vec!["Sasha Katanov".into(), "  ".into()],
        };
        let out = tag_text_tokens(&idx, "", &meta, 1);
        assert_eq!(out, vec!["person/sasha_katanov", "topic/meeting"]);
    }
}
