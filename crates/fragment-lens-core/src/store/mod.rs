//! Fragment index abstraction.
//!
//! The [`FragmentStore`] trait defines every storage operation the write
//! path, retrieval and insight mining need, so backends (SQLite, in-memory)
//! are interchangeable.
//!
//! Stores keep fragments in numbered *generations*. Normal writes go to the
//! live generation; a rebuild assembles a complete replacement off to the
//! side and publishes it with [`FragmentStore::publish_generation`], which
//! swaps it in atomically. Readers never observe a half-built generation.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{DecodeError, IndexError};
use crate::models::{Fragment, FragmentFilter};

/// One item of a scan: a fragment, or the reason its stored form could not
/// be decoded.
pub type ScanItem = std::result::Result<Arc<Fragment>, DecodeError>;

/// Lazy, unordered sequence of fragments produced by [`FragmentStore::scan`].
///
/// A scan reads from a snapshot taken when it was created; call `scan`
/// again to restart.
pub struct FragmentScan {
    inner: Box<dyn Iterator<Item = ScanItem> + Send>,
}

impl FragmentScan {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = ScanItem> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn from_fragments(fragments: Vec<Arc<Fragment>>) -> Self {
        Self::new(fragments.into_iter().map(Ok))
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for FragmentScan {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Bookkeeping for the live generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationInfo {
    /// Generation number, starting at 1 and bumped by every publish.
    pub number: u64,
    /// Bumped by every write (insert, delete, snippet update, publish).
    pub revision: u64,
    /// Embedding dimension fixed by the first write; `None` while empty.
    pub dimension: Option<usize>,
    pub last_rebuild_at: Option<DateTime<Utc>>,
}

/// Abstract fragment index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_batch`](FragmentStore::insert_batch) | Atomically add one document's fragments |
/// | [`scan`](FragmentStore::scan) | Filtered, lazy scan of the live generation |
/// | [`get`](FragmentStore::get) | Fetch one fragment by id |
/// | [`delete_by_document`](FragmentStore::delete_by_document) | Remove a whole (document, project) |
/// | [`replace_document`](FragmentStore::replace_document) | Swap a document's fragments in one write |
/// | [`update_snippets`](FragmentStore::update_snippets) | Replace a fragment's notable snippets |
/// | [`count`](FragmentStore::count) and friends | Observability counters |
/// | [`publish_generation`](FragmentStore::publish_generation) | Swap in a rebuilt generation |
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Insert a batch atomically: either every fragment is stored or none.
    ///
    /// Returns the stored fragments with `sequence` assigned. Fails with
    /// [`IndexError::DimensionMismatch`] if any vector length differs from
    /// the generation's dimension.
    async fn insert_batch(&self, fragments: Vec<Fragment>) -> Result<Vec<Fragment>>;

    /// Scan the live generation, applying `filter`.
    async fn scan(&self, filter: &FragmentFilter) -> Result<FragmentScan>;

    /// Fetch one fragment from the live generation.
    async fn get(&self, id: &str) -> Result<Option<Arc<Fragment>>>;

    /// Remove every fragment of `source_document` owned by `project_id`.
    ///
    /// Returns whether anything was removed.
    async fn delete_by_document(&self, source_document: &str, project_id: &str) -> Result<bool>;

    /// Remove every fragment of `(source_document, project_id)` and insert
    /// `fragments` in the same atomic write.
    ///
    /// The batch is checked against the generation's dimension before
    /// anything is removed; on any error the old fragments stay. Returns the
    /// stored fragments with `sequence` assigned.
    async fn replace_document(
        &self,
        source_document: &str,
        project_id: &str,
        fragments: Vec<Fragment>,
    ) -> Result<Vec<Fragment>>;

    /// Replace `notable_snippets` and touch `updated_at`.
    ///
    /// Returns `false` if no such fragment exists.
    async fn update_snippets(&self, id: &str, snippets: Vec<String>) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    async fn count_by_module(&self) -> Result<BTreeMap<String, usize>>;

    async fn count_by_project(&self) -> Result<BTreeMap<String, usize>>;

    /// Describe the live generation.
    async fn generation(&self) -> Result<GenerationInfo>;

    /// Replace the live generation with `fragments`.
    ///
    /// Succeeds only if the live generation still matches `based_on`
    /// (same number and revision); otherwise nothing changes and `false` is
    /// returned so the caller can rebuild from a fresh snapshot.
    async fn publish_generation(
        &self,
        based_on: &GenerationInfo,
        fragments: Vec<Fragment>,
    ) -> Result<bool>;
}

/// Check that every fragment carries a vector of the index dimension.
///
/// `expected` is the generation's current dimension (`None` while empty).
/// Returns the dimension the generation has after accepting the batch.
pub fn check_dimension(
    expected: Option<usize>,
    fragments: &[Fragment],
) -> std::result::Result<Option<usize>, IndexError> {
    let mut dim = expected;
    for f in fragments {
        let found = f.vector.len();
        match dim {
            Some(d) if d != found => {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    found,
                    fragment_id: f.id.clone(),
                })
            }
            None if found == 0 => {
                return Err(IndexError::DimensionMismatch {
                    expected: 0,
                    found,
                    fragment_id: f.id.clone(),
                })
            }
            None => dim = Some(found),
            _ => {}
        }
    }
    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fragment;

    #[test]
    fn test_check_dimension_sets_on_first_batch() {
        let batch = vec![
            fragment("p", "m", "a", vec![1.0, 0.0]),
            fragment("p", "m", "b", vec![0.0, 1.0]),
        ];
        assert_eq!(check_dimension(None, &batch).unwrap(), Some(2));
    }

    #[test]
    fn test_check_dimension_rejects_mixed() {
        let batch = vec![
            fragment("p", "m", "a", vec![1.0, 0.0]),
            fragment("p", "m", "b", vec![0.0, 1.0, 0.0]),
        ];
        assert!(matches!(
            check_dimension(None, &batch),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_check_dimension_rejects_against_index() {
        let batch = vec![fragment("p", "m", "a", vec![1.0])];
        assert!(check_dimension(Some(4), &batch).is_err());
        assert_eq!(check_dimension(Some(4), &[]).unwrap(), Some(4));
    }

    #[test]
    fn test_check_dimension_rejects_empty_vector() {
        let batch = vec![fragment("p", "m", "a", vec![])];
        assert!(check_dimension(None, &batch).is_err());
    }
}
