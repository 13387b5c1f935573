//! Label categories and the comparison key used for dedup.
//!
//! Labels are hierarchical strings (`Finance/IFRS`, `People/Sasha Katanov`).
//! The category decides how a label behaves during dedup (person labels are
//! always preserved) and during meeting → commit inheritance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefixes stripped by [`comparison_key`]. Checked in order, first hit wins.
const COMPARISON_PREFIXES: [&str; 8] = [
    "person/",
    "area/",
    "project/",
    "topic/",
    "people/",
    "finance/",
    "business/",
    "projects/",
];

/// Family order used for deterministic output of the unifier.
pub const FAMILY_ORDER: [Category; 5] = [
    Category::Person,
    Category::Business,
    Category::Projects,
    Category::Finance,
    Category::Topic,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Person,
    Business,
    Projects,
    Finance,
    Topic,
    Other,
}

/// What happens to a meeting label when a commit is derived from the meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritancePolicy {
    /// Inherited only when the commit carries no label of the same category.
    IfCommitHasNone,
    /// Always inherited.
    Always,
    /// Inherited unless the commit already holds a label of the same
    /// category or with the same comparison key; the commit's label wins.
    UnlessConflict,
    Never,
}

impl Category {
    /// Derive the category from the label prefix (`People/...` → Person).
    pub fn from_label(label: &str) -> Self {
        let prefix = match label.split_once('/') {
            Some((p, _)) => p.trim().to_ascii_lowercase(),
            None => return Category::Other,
        };
        match prefix.as_str() {
            "people" | "person" => Category::Person,
            "business" => Category::Business,
            "projects" | "project" => Category::Projects,
            "finance" => Category::Finance,
            "topic" => Category::Topic,
            _ => Category::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Person => "person",
            Category::Business => "business",
            Category::Projects => "projects",
            Category::Finance => "finance",
            Category::Topic => "topic",
            Category::Other => "other",
        }
    }

    pub fn inheritance(self) -> InheritancePolicy {
        match self {
            Category::Person => InheritancePolicy::IfCommitHasNone,
            Category::Business | Category::Projects => InheritancePolicy::Always,
            Category::Finance | Category::Topic => InheritancePolicy::UnlessConflict,
            Category::Other => InheritancePolicy::Never,
        }
    }

    /// Position in [`FAMILY_ORDER`]; unknown families sort last.
    pub fn family_rank(self) -> usize {
        FAMILY_ORDER
            .iter()
            .position(|c| *c == self)
            .unwrap_or(FAMILY_ORDER.len())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" | "people" => Ok(Category::Person),
            "business" => Ok(Category::Business),
            "projects" | "project" => Ok(Category::Projects),
            "finance" => Ok(Category::Finance),
            "topic" => Ok(Category::Topic),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category `{other}`")),
        }
    }
}

/// Collapse inner whitespace and trim.
pub fn canonicalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key for "same concept, different spelling" detection:
/// lowercase, drop one hierarchy prefix, separators (`/ - _`) → spaces,
/// collapse whitespace.
pub fn comparison_key(label: &str) -> String {
    let mut key = label.to_lowercase();
    for prefix in COMPARISON_PREFIXES {
        if let Some(rest) = key.strip_prefix(prefix) {
            key = rest.to_string();
            break;
        }
    }
    let key = key.replace(['/', '-', '_'], " ");
    key.split_whitespace().collect::<Vec<_>>().join(" ")
}
