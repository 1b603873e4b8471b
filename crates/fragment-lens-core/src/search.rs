//! Ranked semantic retrieval over a [`FragmentStore`].
//!
//! Every query is an exhaustive linear scan: embed, scan with the filter,
//! score each fragment by cosine similarity, keep scores at or above the
//! threshold, rank, truncate. The `scan → score → rank` seam in [`rank`] is
//! where an approximate index could later be substituted.
//!
//! # Ranking
//!
//! 1. Score descending.
//! 2. `created_at` ascending.
//! 3. Store-assigned `sequence` ascending.
//!
//! Retrieval is advisory: embedding and storage failures produce an empty
//! [`SearchOutcome`] carrying the error text rather than an `Err`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::models::{Fragment, FragmentFilter, ScoredFragment, SearchOutcome};
use crate::similarity::cosine_similarity;
use crate::store::{FragmentScan, FragmentStore};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    /// Only return fragments owned by this project.
    pub project_id: Option<String>,
    /// Only return fragments whose module tag is in this set.
    pub module_tags: Option<BTreeSet<String>>,
    pub top_k: usize,
    /// Minimum cosine similarity (inclusive).
    pub similarity_threshold: f64,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            project_id: None,
            module_tags: None,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn filter(&self) -> FragmentFilter {
        FragmentFilter {
            project_id: self.project_id.clone(),
            module_tags: self.module_tags.clone(),
        }
    }
}

/// Embed `req.query` and rank the filtered index against it.
///
/// A blank query returns no results without calling the embedder.
pub async fn search<S, E>(store: &S, embedder: &E, req: &SearchRequest) -> SearchOutcome<ScoredFragment>
where
    S: FragmentStore + ?Sized,
    E: Embedder + ?Sized,
{
    if req.query.trim().is_empty() || req.top_k == 0 {
        return SearchOutcome::ok(Vec::new());
    }

    let query_vec = match embedder.embed(&req.query).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "query embedding failed");
            return SearchOutcome::failed(e);
        }
    };

    let scan = match store.scan(&req.filter()).await {
        Ok(scan) => scan,
        Err(e) => {
            warn!(error = %e, "fragment scan failed");
            return SearchOutcome::failed(format!("{:#}", e));
        }
    };

    let results = rank(&query_vec, scan, req.similarity_threshold, req.top_k, None);
    debug!(query = %req.query, hits = results.len(), "search complete");
    SearchOutcome::ok(results)
}

/// Rank the whole index against the stored vector of `fragment_id`.
///
/// The source fragment never appears in its own results. An unknown id
/// yields an empty outcome with a not-found message.
pub async fn find_similar_to<S>(
    store: &S,
    fragment_id: &str,
    top_k: usize,
    threshold: f64,
) -> SearchOutcome<ScoredFragment>
where
    S: FragmentStore + ?Sized,
{
    let source = match store.get(fragment_id).await {
        Ok(Some(f)) => f,
        Ok(None) => return SearchOutcome::failed(IndexError::NotFound(fragment_id.to_string())),
        Err(e) => {
            warn!(fragment_id, error = %e, "cannot load source fragment");
            return SearchOutcome::failed(format!("{:#}", e));
        }
    };

    similar_to_fragment(store, &source, top_k, threshold).await
}

pub(crate) async fn similar_to_fragment<S>(
    store: &S,
    source: &Fragment,
    top_k: usize,
    threshold: f64,
) -> SearchOutcome<ScoredFragment>
where
    S: FragmentStore + ?Sized,
{
    if top_k == 0 {
        return SearchOutcome::ok(Vec::new());
    }

    match store.scan(&FragmentFilter::default()).await {
        Ok(scan) => SearchOutcome::ok(rank(&source.vector, scan, threshold, top_k, Some(&source.id))),
        Err(e) => {
            warn!(fragment_id = %source.id, error = %e, "fragment scan failed");
            SearchOutcome::failed(format!("{:#}", e))
        }
    }
}

/// Score every scanned fragment against `query`, keep those at or above
/// `threshold`, sort and truncate to `top_k`.
///
/// Fragments that cannot be decoded or whose dimension differs from the
/// query are logged and skipped.
pub fn rank(
    query: &[f32],
    scan: FragmentScan,
    threshold: f64,
    top_k: usize,
    exclude_id: Option<&str>,
) -> Vec<ScoredFragment> {
    let mut scored: Vec<ScoredFragment> = Vec::new();

    for item in scan {
        let fragment: Arc<Fragment> = match item {
            Ok(f) => f,
            Err(e) => {
                warn!(fragment_id = %e.fragment_id, error = %e, "skipping undecodable fragment");
                continue;
            }
        };
        if exclude_id == Some(fragment.id.as_str()) {
            continue;
        }

        let score = match cosine_similarity(query, &fragment.vector) {
            Ok(s) => s,
            Err(e) => {
                warn!(fragment_id = %fragment.id, error = %e, "skipping fragment");
                continue;
            }
        };
        if score >= threshold {
            scored.push(ScoredFragment { fragment, score });
        }
    }

    sort_ranked(&mut scored);
    scored.truncate(top_k);
    scored
}

/// Sort by score (desc), `created_at` (asc), `sequence` (asc).
pub fn sort_ranked(results: &mut [ScoredFragment]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.fragment.created_at.cmp(&b.fragment.created_at))
            .then(a.fragment.sequence.cmp(&b.fragment.sequence))
    });
}
