// src/records.rs
//! Meetings and commits with their label sets.
//!
//! A meeting is tagged once when ingested. A commit is tagged when extracted
//! and merged with its parent's labels at that moment only; later edits to
//! the meeting reach the commit only through [`Commit::resync_from`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tagging::category::{canonicalize_label, comparison_key};
use crate::tagging::{RuntimeState, TagKind, TextMeta};

/// Labels deduplicated by comparison key; the first spelling seen wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    by_key: BTreeMap<String, String>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an equivalent label was already present.
    pub fn insert(&mut self, label: &str) -> bool {
        let label = canonicalize_label(label);
        if label.is_empty() {
            return false;
        }
        let key = comparison_key(&label);
        if self.by_key.contains_key(&key) {
            return false;
        }
        self.by_key.insert(key, label);
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.by_key.contains_key(&comparison_key(label))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Labels in alphabetical order.
    pub fn to_vec(&self) -> Vec<String> {
        let mut v: Vec<String> = self.by_key.values().cloned().collect();
        v.sort();
        v
    }
}

impl<S: AsRef<str>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = LabelSet::new();
        for label in iter {
            set.insert(label.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for LabelSet {
    fn from(v: Vec<String>) -> Self {
        v.into_iter().collect()
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(set: LabelSet) -> Self {
        set.to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub attendees: Vec<String>,
    pub labels: LabelSet,
}

impl Meeting {
    /// Tag a freshly ingested transcript.
    pub fn ingest(
        tagger: &RuntimeState,
        id: impl Into<String>,
        title: impl Into<String>,
        attendees: Vec<String>,
        transcript: &str,
    ) -> Self {
        let mut meeting = Self {
            id: id.into(),
            title: title.into(),
            attendees,
            labels: LabelSet::new(),
        };
        meeting.labels = meeting.compute_labels(tagger, transcript);
        meeting
    }

    /// Explicit retag against the currently active rules.
    pub fn retag(&mut self, tagger: &RuntimeState, transcript: &str) {
        self.labels = self.compute_labels(tagger, transcript);
    }

    fn compute_labels(&self, tagger: &RuntimeState, transcript: &str) -> LabelSet {
        let meta = TextMeta {
            title: self.title.clone(),
            attendees: self.attendees.clone(),
        };
        tagger
            .tag_text_with_meta(transcript, TagKind::Meeting, &meta)
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub meeting_id: Option<String>,
    pub text: String,
    pub labels: LabelSet,
}

impl Commit {
    /// Extract a commit; when it comes from a meeting, the meeting's labels
    /// are inherited once, here.
    pub fn extract(
        tagger: &RuntimeState,
        id: impl Into<String>,
        text: impl Into<String>,
        parent: Option<&Meeting>,
    ) -> Self {
        let text = text.into();
        let own = tagger.tag_text(&text, TagKind::Commit);
        let labels = match parent {
            Some(m) => tagger.merge_meeting_and_commit_tags(&m.labels.to_vec(), &own),
            None => own,
        };
        Self {
            id: id.into(),
            meeting_id: parent.map(|m| m.id.clone()),
            text,
            labels: labels.into_iter().collect(),
        }
    }

    /// Re-run tagging and inheritance from `meeting` explicitly.
    pub fn resync_from(&mut self, tagger: &RuntimeState, meeting: &Meeting) {
        let own = tagger.tag_text(&self.text, TagKind::Commit);
        let merged = tagger.merge_meeting_and_commit_tags(&meeting.labels.to_vec(), &own);
        self.meeting_id = Some(meeting.id.clone());
        self.labels = merged.into_iter().collect();
    }
}
