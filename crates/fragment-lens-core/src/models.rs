//! Core data models shared by the store, retrieval and insight modules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Maximum length of fragment text in search output.
pub const RESULT_TEXT_LIMIT: usize = 500;

/// The unit of indexing: one embedded chunk of a source document.
///
/// Immutable once written, except for `notable_snippets` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    /// UUID assigned on creation, never reused.
    pub id: String,
    /// Filename or identifier of the originating document.
    pub source_document: String,
    /// Content type of the originating document (informational).
    pub source_media_type: String,
    pub text: String,
    /// Embedding; one fixed length per index generation.
    #[serde(skip_serializing)]
    pub vector: Vec<f32>,
    pub project_id: String,
    pub module_tag: String,
    pub notable_snippets: Vec<String>,
    pub chunk_index: usize,
    pub chunk_count: usize,
    /// SHA-256 hex of `text`.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Insertion ordinal assigned by the store; final tie-breaker in ranking.
    pub sequence: u64,
}

impl Fragment {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// Optional filters applied by [`FragmentStore::scan`](crate::store::FragmentStore::scan).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentFilter {
    /// Equality filter on `project_id`.
    pub project_id: Option<String>,
    /// Set-membership filter on `module_tag`. An empty set matches nothing.
    pub module_tags: Option<BTreeSet<String>>,
}

impl FragmentFilter {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            module_tags: None,
        }
    }

    pub fn with_module(mut self, module_tag: impl Into<String>) -> Self {
        self.module_tags
            .get_or_insert_with(BTreeSet::new)
            .insert(module_tag.into());
        self
    }

    pub fn matches(&self, fragment: &Fragment) -> bool {
        if let Some(ref project) = self.project_id {
            if &fragment.project_id != project {
                return false;
            }
        }
        if let Some(ref tags) = self.module_tags {
            if !tags.contains(&fragment.module_tag) {
                return false;
            }
        }
        true
    }
}

/// A fragment paired with its similarity to a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredFragment {
    #[serde(flatten)]
    pub fragment: Arc<Fragment>,
    pub score: f64,
}

impl ScoredFragment {
    /// Build the outward-facing result record.
    pub fn to_result_item(&self) -> SearchResultItem {
        let f = &self.fragment;
        SearchResultItem {
            fragment_id: f.id.clone(),
            source_document: f.source_document.clone(),
            text: truncate_text(&f.text, RESULT_TEXT_LIMIT),
            score: self.score,
            project_id: f.project_id.clone(),
            module_tag: f.module_tag.clone(),
            notable_snippets: f.notable_snippets.clone(),
            created_at: f.created_at,
        }
    }
}

/// One ranked search result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultItem {
    pub fragment_id: String,
    pub source_document: String,
    /// Fragment text, truncated to 500 chars with a trailing `...`.
    pub text: String,
    pub score: f64,
    pub project_id: String,
    pub module_tag: String,
    pub notable_snippets: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of an advisory read operation.
///
/// Retrieval never raises: failures leave `items` empty and describe the
/// cause in `error`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> SearchOutcome<T> {
    pub fn ok(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Observability snapshot of the fragment index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_fragments: usize,
    pub fragments_by_module: BTreeMap<String, usize>,
    pub fragments_by_project: BTreeMap<String, usize>,
    /// `None` until the first fragment is written.
    pub embedding_dimension: Option<usize>,
    pub last_rebuild_at: Option<DateTime<Utc>>,
    pub generation: u64,
}

/// Truncate `text` to `max_len` chars, ending in `...` when shortened.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fragment;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_text("hello", 500), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        let long = "é".repeat(600);
        let out = truncate_text(&long, 500);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_filter_matches() {
        let f = fragment("p1", "security", "text", vec![1.0]);
        assert!(FragmentFilter::default().matches(&f));
        assert!(FragmentFilter::project("p1").matches(&f));
        assert!(!FragmentFilter::project("p2").matches(&f));
        assert!(FragmentFilter::project("p1").with_module("security").matches(&f));
        assert!(!FragmentFilter::project("p1").with_module("architecture").matches(&f));

        let empty_tags = FragmentFilter {
            project_id: None,
            module_tags: Some(BTreeSet::new()),
        };
        assert!(!empty_tags.matches(&f));
    }

    #[test]
    fn test_scored_fragment_json_omits_vector() {
        let scored = ScoredFragment {
            fragment: Arc::new(fragment("p1", "security", "text", vec![1.0, 2.0])),
            score: 0.75,
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["project_id"], "p1");
        assert_eq!(json["score"], 0.75);
        assert!(json.get("vector").is_none());
    }

    #[test]
    fn test_result_item_truncates() {
        let f = fragment("p1", "security", &"a".repeat(700), vec![1.0]);
        let item = ScoredFragment {
            fragment: Arc::new(f),
            score: 0.9,
        }
        .to_result_item();
        assert_eq!(item.text.chars().count(), RESULT_TEXT_LIMIT);
        assert_eq!(item.project_id, "p1");
    }
}
