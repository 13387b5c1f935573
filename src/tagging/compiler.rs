//! Rule compiler: validates a [`RuleBundle`] and builds an immutable
//! [`RuleSetSnapshot`]. Either every rule compiles or nothing is produced.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::category::Category;
use super::store::{normalize_rules, Person, RuleBundle, TagRule};
use super::tokens::SynonymIndex;

pub const DEFAULT_MAX_PATTERNS: usize = 500;
pub const DEFAULT_MAX_EXCLUDES: usize = 100;
pub const MAX_WEIGHT: f64 = 10.0;

/// Soft limits: exceeding them only produces warnings.
#[derive(Debug, Clone, Copy)]
pub struct CompileLimits {
    pub max_patterns: usize,
    pub max_excludes: usize,
}

impl Default for CompileLimits {
    fn default() -> Self {
        Self {
            max_patterns: DEFAULT_MAX_PATTERNS,
            max_excludes: DEFAULT_MAX_EXCLUDES,
        }
    }
}

#[derive(Debug)]
pub struct CompiledRule {
    pub name: String,
    pub category: Category,
    pub patterns: Vec<Regex>,
    pub excludes: Vec<Regex>,
    pub weight: f64,
}

/// A person from the directory, ready for case-insensitive substring search.
#[derive(Debug, Clone)]
pub struct CompiledPerson {
    pub label: String,
    /// Lowercased aliases followed by the lowercased canonical name.
    pub needles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub total_rules: usize,
    pub total_patterns: usize,
    pub total_excludes: usize,
    pub average_weight: f64,
    pub total_synonyms: usize,
    pub total_people: usize,
    pub last_reload: Option<DateTime<Utc>>,
}

/// Immutable, versioned compiled rule set. Swapped on reload, never edited.
#[derive(Debug)]
pub struct RuleSetSnapshot {
    pub version: u64,
    pub rules: Vec<CompiledRule>,
    pub synonyms: SynonymIndex,
    pub people: Vec<CompiledPerson>,
    pub stats: SnapshotStats,
    categories: HashMap<String, Category>,
}

impl RuleSetSnapshot {
    /// The `Uninitialized` snapshot: version 0, no rules.
    pub fn empty() -> Self {
        Self {
            version: 0,
            rules: Vec::new(),
            synonyms: SynonymIndex::default(),
            people: Vec::new(),
            stats: SnapshotStats {
                average_weight: 1.0,
                ..Default::default()
            },
            categories: HashMap::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.version > 0
    }

    /// Explicit rule category when the label is a rule of this set,
    /// otherwise derived from the label prefix.
    pub fn category_of(&self, label: &str) -> Category {
        self.categories
            .get(label)
            .copied()
            .unwrap_or_else(|| Category::from_label(label))
    }

    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Stamp version and reload time; called by the runtime state right before the swap.
    pub(crate) fn activate(mut self, version: u64, at: DateTime<Utc>) -> Self {
        self.version = version;
        self.stats.last_reload = Some(at);
        self
    }
}

/// Errors block activation; warnings are informational.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors followed by `WARNING: `-prefixed warnings.
    pub fn messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .cloned()
            .chain(self.warnings.iter().map(|w| format!("WARNING: {w}")))
            .collect()
    }
}

#[derive(Debug)]
pub struct CompileOutput {
    pub snapshot: RuleSetSnapshot,
    pub warnings: Vec<String>,
}

fn build_regex(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn compile_list(
    tag: &str,
    what: &str,
    sources: &[String],
    errors: &mut Vec<String>,
) -> Vec<Regex> {
    let mut out = Vec::with_capacity(sources.len());
    for (i, p) in sources.iter().enumerate() {
        if p.trim().is_empty() {
            errors.push(format!("Empty {what} {i} for tag: {tag}"));
            continue;
        }
        match build_regex(p) {
            Ok(re) => out.push(re),
            Err(e) => errors.push(format!("Invalid regex in {tag} {what} {i}: '{p}' -> {e}")),
        }
    }
    out
}

fn compile_rule(rule: &TagRule, errors: &mut Vec<String>) -> Option<CompiledRule> {
    let before = errors.len();

    if rule.patterns.is_empty() {
        errors.push(format!("No patterns for tag: {}", rule.name));
    }
    let patterns = compile_list(&rule.name, "pattern", &rule.patterns, errors);
    let excludes = compile_list(&rule.name, "exclude", &rule.excludes, errors);

    if !rule.weight.is_finite() || rule.weight < 0.0 || rule.weight > MAX_WEIGHT {
        errors.push(format!(
            "Weight must be 0.0-10.0 for tag {}: {}",
            rule.name, rule.weight
        ));
    }

    if errors.len() > before {
        return None;
    }
    Some(CompiledRule {
        name: rule.name.clone(),
        category: rule.category,
        patterns,
        excludes,
        weight: rule.weight,
    })
}

fn compile_people(people: &[Person], warnings: &mut Vec<String>) -> Vec<CompiledPerson> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(people.len());
    for person in people {
        let name = person.name_en.trim();
        if name.is_empty() {
            warnings.push("Person without name_en skipped".to_string());
            continue;
        }
        if !seen.insert(name.to_lowercase()) {
            continue;
        }
        let mut needles: Vec<String> = person
            .aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        needles.push(name.to_lowercase());
        out.push(CompiledPerson {
            label: format!("People/{name}"),
            needles,
        });
    }
    out
}

/// Validate and compile. Pure: the same bundle always yields equivalent matchers.
pub fn compile_bundle(
    bundle: &RuleBundle,
    limits: &CompileLimits,
) -> Result<CompileOutput, ValidationReport> {
    let (rules, mut errors) = normalize_rules(&bundle.rules);
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    let mut compiled = Vec::with_capacity(rules.len());
    let mut total_patterns = 0usize;
    let mut total_excludes = 0usize;

    for rule in &rules {
        if rule.name.is_empty() {
            errors.push(format!("Invalid tag name: '{}'", rule.name));
            continue;
        }
        if !seen.insert(rule.name.clone()) {
            errors.push(format!("Duplicate tag: {}", rule.name));
            continue;
        }
        if !rule.name.contains('/') {
            warnings.push(format!(
                "Tag should have category/subcategory format: {}",
                rule.name
            ));
        }
        total_patterns += rule.patterns.len();
        total_excludes += rule.excludes.len();
        if let Some(c) = compile_rule(rule, &mut errors) {
            compiled.push(c);
        }
    }

    if total_patterns > limits.max_patterns {
        warnings.push(format!(
            "Too many patterns ({total_patterns}), may impact performance"
        ));
    }
    if total_excludes > limits.max_excludes {
        warnings.push(format!(
            "Too many excludes ({total_excludes}), may impact performance"
        ));
    }

    let people = compile_people(&bundle.people, &mut warnings);

    if !errors.is_empty() {
        return Err(ValidationReport { errors, warnings });
    }
    for w in &warnings {
        warn!(target: "tagging", warning = %w, "rule set warning");
    }

    let synonyms = SynonymIndex::build(&bundle.synonyms);
    let average_weight = if compiled.is_empty() {
        1.0
    } else {
        compiled.iter().map(|r| r.weight).sum::<f64>() / compiled.len() as f64
    };
    let stats = SnapshotStats {
        total_rules: compiled.len(),
        total_patterns,
        total_excludes,
        average_weight,
        total_synonyms: synonyms.len(),
        total_people: people.len(),
        last_reload: None,
    };
    let categories = compiled
        .iter()
        .map(|r| (r.name.clone(), r.category))
        .collect();

    debug!(
        target: "tagging",
        rules = stats.total_rules,
        patterns = stats.total_patterns,
        excludes = stats.total_excludes,
        "compiled rule set"
    );

    Ok(CompileOutput {
        snapshot: RuleSetSnapshot {
            version: 0,
            rules: compiled,
            synonyms,
            people,
            stats,
            categories,
        },
        warnings,
    })
}

/// Compile without keeping the result.
pub fn validate_bundle(bundle: &RuleBundle, limits: &CompileLimits) -> ValidationReport {
    match compile_bundle(bundle, limits) {
        Ok(out) => ValidationReport {
            errors: Vec::new(),
            warnings: out.warnings,
        },
        Err(report) => report,
    }
}
