//! Rule store: reads human-edited rule definitions, the token dictionary and
//! the people directory, and normalizes rules into one canonical shape.
//!
//! Accepted rule shapes (YAML or JSON):
//! ```yaml
//! Finance/IFRS:
//!   patterns: ["\\bifrs\\b", "МСФО"]
//!   exclude: ["@ifrs"]
//!   weight: 1.2
//!   category: finance        # optional, derived from the prefix otherwise
//! Topic/Planning: ["планирование", "план"]   # legacy shorthand
//! ```
//! Legacy lists become `patterns=[...]`, `excludes=[]`, `weight=1.0`.
//! Nothing downstream of [`normalize_rules`] sees the legacy shape.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::category::{canonicalize_label, Category};
use super::error::TaggingError;

pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Raw definitions in file order. Duplicate names are kept so the compiler
/// can report them instead of silently keeping the last one.
#[derive(Debug, Clone, Default)]
pub struct RawRuleSet {
    pub entries: Vec<RawRuleEntry>,
}

#[derive(Debug, Clone)]
pub struct RawRuleEntry {
    pub name: String,
    pub spec: serde_json::Value,
}

impl<'de> Deserialize<'de> for RawRuleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawRuleSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of tag name to rule definition")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, spec)) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push(RawRuleEntry { name, spec });
                }
                Ok(RawRuleSet { entries })
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(RawRuleSet::default())
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(RawRuleSet::default())
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl RawRuleSet {
    pub fn from_yaml_str(s: &str) -> Result<Self, String> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(s).map_err(|e| e.to_string())
    }

    pub fn from_json_str(s: &str) -> Result<Self, String> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(s).map_err(|e| e.to_string())
    }

    pub fn push(&mut self, name: impl Into<String>, spec: serde_json::Value) {
        self.entries.push(RawRuleEntry {
            name: name.into(),
            spec,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Full object form of a rule definition.
#[derive(Debug, Deserialize)]
struct RuleSpec {
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default, alias = "excludes")]
    exclude: Vec<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    category: Option<String>,
}

/// Canonical rule shape handed to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRule {
    pub name: String,
    pub patterns: Vec<String>,
    pub excludes: Vec<String>,
    pub weight: f64,
    pub category: Category,
}

impl TagRule {
    /// Legacy shorthand: patterns only, defaults for the rest.
    pub fn from_patterns(name: &str, patterns: Vec<String>) -> Self {
        Self {
            name: canonicalize_label(name),
            patterns,
            excludes: Vec::new(),
            weight: DEFAULT_WEIGHT,
            category: Category::from_label(name),
        }
    }
}

/// Turn raw entries into `TagRule`s. Shape problems are returned as
/// human-readable errors; value checks (regex, weight range, duplicates)
/// belong to the compiler.
pub fn normalize_rules(raw: &RawRuleSet) -> (Vec<TagRule>, Vec<String>) {
    let mut rules = Vec::with_capacity(raw.entries.len());
    let mut errors = Vec::new();

    for entry in &raw.entries {
        match &entry.spec {
            serde_json::Value::Array(items) => {
                let mut patterns = Vec::with_capacity(items.len());
                let mut shape_ok = true;
                for (i, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(p) => patterns.push(p.to_string()),
                        None => {
                            errors.push(format!(
                                "Pattern {i} must be string for tag {}: {item}",
                                entry.name
                            ));
                            shape_ok = false;
                        }
                    }
                }
                if shape_ok {
                    rules.push(TagRule::from_patterns(&entry.name, patterns));
                }
            }
            serde_json::Value::Object(_) => {
                let spec: RuleSpec = match serde_json::from_value(entry.spec.clone()) {
                    Ok(s) => s,
                    Err(e) => {
                        errors.push(format!("Invalid rule for tag {}: {e}", entry.name));
                        continue;
                    }
                };
                let category = match spec.category.as_deref() {
                    Some(c) => match c.parse::<Category>() {
                        Ok(cat) => cat,
                        Err(e) => {
                            errors.push(format!("Invalid category for tag {}: {e}", entry.name));
                            continue;
                        }
                    },
                    None => Category::from_label(&entry.name),
                };
                rules.push(TagRule {
                    name: canonicalize_label(&entry.name),
                    patterns: spec.patterns,
                    excludes: spec.exclude,
                    weight: spec.weight.unwrap_or(DEFAULT_WEIGHT),
                    category,
                });
            }
            other => {
                errors.push(format!(
                    "Invalid spec format for tag {}: expected list or mapping, got {}",
                    entry.name,
                    value_kind(other)
                ));
            }
        }
    }

    debug!(
        target: "tagging",
        rules = rules.len(),
        errors = errors.len(),
        "normalized rule definitions"
    );
    (rules, errors)
}

fn value_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "mapping",
    }
}

/// A known person: canonical English name plus aliases found in transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name_en: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PeopleFile {
    #[serde(default)]
    people: Vec<Person>,
}

/// Token-matcher dictionary: loose label → synonyms.
pub type SynonymDictionary = BTreeMap<String, Vec<String>>;

/// Everything a reload consumes, already fetched.
#[derive(Debug, Clone, Default)]
pub struct RuleBundle {
    pub rules: RawRuleSet,
    pub synonyms: SynonymDictionary,
    pub people: Vec<Person>,
}

impl RuleBundle {
    pub fn from_rules(rules: RawRuleSet) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    pub fn with_synonyms(mut self, synonyms: SynonymDictionary) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_people(mut self, people: Vec<Person>) -> Self {
        self.people = people;
        self
    }
}

/// File locations of the three inputs of a bundle.
#[derive(Debug, Clone)]
pub struct BundlePaths {
    pub rules: PathBuf,
    pub synonyms: Option<PathBuf>,
    pub people: Option<PathBuf>,
}

fn read_file(path: &Path) -> Result<String, TaggingError> {
    fs::read_to_string(path).map_err(|source| TaggingError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "yaml" | "yml"
    )
}

/// Read a rule file. `.yaml`/`.yml` is parsed as YAML, anything else as JSON.
pub fn load_rules_file(path: &Path) -> Result<RawRuleSet, TaggingError> {
    let content = read_file(path)?;
    let parsed = if is_yaml(path) {
        RawRuleSet::from_yaml_str(&content)
    } else {
        RawRuleSet::from_json_str(&content)
    };
    parsed.map_err(|message| TaggingError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Missing dictionary → empty (the token matcher simply finds nothing).
pub fn load_synonyms_file(path: &Path) -> Result<SynonymDictionary, TaggingError> {
    if !path.exists() {
        warn!(target: "tagging", path = %path.display(), "token dictionary not found, using empty");
        return Ok(SynonymDictionary::new());
    }
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|e| TaggingError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Missing directory → no people.
pub fn load_people_file(path: &Path) -> Result<Vec<Person>, TaggingError> {
    if !path.exists() {
        warn!(target: "tagging", path = %path.display(), "people directory not found, using empty");
        return Ok(Vec::new());
    }
    let content = read_file(path)?;
    let file: PeopleFile = serde_json::from_str(&content).map_err(|e| TaggingError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(file.people)
}

/// Load a full bundle from disk. The rule file is required.
pub fn load_bundle(paths: &BundlePaths) -> Result<RuleBundle, TaggingError> {
    let rules = load_rules_file(&paths.rules)?;
    let synonyms = match &paths.synonyms {
        Some(p) => load_synonyms_file(p)?,
        None => SynonymDictionary::new(),
    };
    let people = match &paths.people {
        Some(p) => load_people_file(p)?,
        None => Vec::new(),
    };
    Ok(RuleBundle {
        rules,
        synonyms,
        people,
    })
}
