//! Meeting → commit label inheritance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::category::{canonicalize_label, comparison_key, Category, InheritancePolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceMetrics {
    pub meeting_tags_total: u64,
    pub commit_tags_total: u64,
    pub inherited_total: u64,
    pub duplicates_removed: u64,
    pub conflicts_resolved: u64,
    pub inherited_by_category: BTreeMap<Category, u64>,
}

impl InheritanceMetrics {
    pub fn absorb(&mut self, other: &InheritanceMetrics) {
        self.meeting_tags_total += other.meeting_tags_total;
        self.commit_tags_total += other.commit_tags_total;
        self.inherited_total += other.inherited_total;
        self.duplicates_removed += other.duplicates_removed;
        self.conflicts_resolved += other.conflicts_resolved;
        for (cat, n) in &other.inherited_by_category {
            *self.inherited_by_category.entry(*cat).or_insert(0) += n;
        }
    }
}

/// Merge a parent meeting's labels into a commit's labels.
///
/// Commit labels are always kept. Meeting labels follow their category's
/// [`InheritancePolicy`]. Output is deduplicated by comparison key and
/// sorted alphabetically.
pub fn inherit<F>(meeting: &[String], commit: &[String], classify: F) -> (Vec<String>, InheritanceMetrics)
where
    F: Fn(&str) -> Category,
{
    let mut metrics = InheritanceMetrics {
        meeting_tags_total: meeting.len() as u64,
        commit_tags_total: commit.len() as u64,
        ..Default::default()
    };

    let mut keys: HashSet<String> = HashSet::new();
    let mut commit_categories: HashSet<Category> = HashSet::new();
    let mut merged: BTreeSet<String> = BTreeSet::new();

    for label in commit {
        let label = canonicalize_label(label);
        if label.is_empty() {
            continue;
        }
        if !keys.insert(comparison_key(&label)) {
            metrics.duplicates_removed += 1;
            continue;
        }
        commit_categories.insert(classify(&label));
        merged.insert(label);
    }

    for label in meeting {
        let label = canonicalize_label(label);
        if label.is_empty() {
            continue;
        }
        let key = comparison_key(&label);
        if keys.contains(&key) {
            metrics.duplicates_removed += 1;
            continue;
        }
        let category = classify(&label);
        let take = match category.inheritance() {
            InheritancePolicy::Always => true,
            InheritancePolicy::IfCommitHasNone => !commit_categories.contains(&Category::Person),
            InheritancePolicy::UnlessConflict => {
                let conflict = commit_categories.contains(&category);
                if conflict {
                    metrics.conflicts_resolved += 1;
                }
                !conflict
            }
            InheritancePolicy::Never => false,
        };
        if !take {
            continue;
        }
        keys.insert(key);
        merged.insert(label);
        metrics.inherited_total += 1;
        *metrics.inherited_by_category.entry(category).or_insert(0) += 1;
    }

    (merged.into_iter().collect(), metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn run(meeting: &[&str], commit: &[&str]) -> (Vec<String>, InheritanceMetrics) {
        inherit(&strings(meeting), &strings(commit), Category::from_label)
    }

    #[test]
    fn commit_finance_label_wins() {
        let (merged, m) = run(
            &["People/Alice", "Business/Lavka", "Finance/IFRS"],
            &["Finance/Audit"],
        );
        assert_eq!(merged, vec!["Business/Lavka", "Finance/Audit", "People/Alice"]);
        assert_eq!(m.inherited_total, 2);
        assert_eq!(m.conflicts_resolved, 1);
        assert_eq!(m.inherited_by_category[&Category::Person], 1);
    }

    #[test]
    fn people_only_when_commit_has_none() {
        let (merged, _) = run(&["People/Alice", "People/Bob"], &["People/Carol"]);
        assert_eq!(merged, vec!["People/Carol"]);

        let (merged, _) = run(&["People/Alice", "People/Bob"], &[]);
        assert_eq!(merged, vec!["People/Alice", "People/Bob"]);
    }

    #[test]
    fn business_and_projects_always_inherited() {
        let (merged, _) = run(
            &["Business/Lavka", "Projects/EVM"],
            &["Business/Alaska", "Projects/Integration"],
        );
        assert_eq!(
            merged,
            vec![
                "Business/Alaska",
                "Business/Lavka",
                "Projects/EVM",
                "Projects/Integration"
            ]
        );
    }

    #[test]
    fn topic_inherited_without_conflict_and_other_never() {
        let (merged, _) = run(&["Topic/Risk", "Misc/Internal"], &["Finance/Audit"]);
        assert_eq!(merged, vec!["Finance/Audit", "Topic/Risk"]);
    }

    #[test]
    fn same_key_keeps_commit_spelling() {
        let (merged, m) = run(&["Business/Lavka"], &["business/lavka"]);
        assert_eq!(merged, vec!["business/lavka"]);
        assert_eq!(m.duplicates_removed, 1);
    }
}
