//! Context augmentation for analysis requests.
//!
//! Appends the most relevant same-project fragments to a free-text request
//! so a downstream model sees the uploaded material alongside it.

use std::collections::BTreeSet;

use crate::embedding::Embedder;
use crate::models::{ScoredFragment, RESULT_TEXT_LIMIT, truncate_text};
use crate::search::{search, SearchRequest};
use crate::store::FragmentStore;

pub const CONTEXT_HEADER: &str = "=== RELEVANT CONTEXT FROM UPLOADED DOCUMENTS ===";
pub const MAX_CONTEXT_DOCUMENTS: usize = 3;
pub const MAX_CONTEXT_SNIPPETS: usize = 3;

/// An augmented request plus the fragments that went into it.
#[derive(Debug, Clone)]
pub struct Augmentation {
    pub text: String,
    pub context: Vec<ScoredFragment>,
    /// Set when the lookup failed; `text` is then the unchanged request.
    pub error: Option<String>,
}

/// Search `project_id`/`module_tag` for fragments relevant to `request`
/// (top 5, threshold 0.7) and append them as a context block.
pub async fn augment_request<S, E>(
    store: &S,
    embedder: &E,
    request: &str,
    project_id: &str,
    module_tag: &str,
) -> Augmentation
where
    S: FragmentStore + ?Sized,
    E: Embedder + ?Sized,
{
    let req = SearchRequest {
        project_id: Some(project_id.to_string()),
        module_tags: Some(BTreeSet::from([module_tag.to_string()])),
        ..SearchRequest::new(request)
    };
    let outcome = search(store, embedder, &req).await;

    Augmentation {
        text: render_context(request, &outcome.items),
        context: outcome.items,
        error: outcome.error,
    }
}

/// Append up to three results to `request`. Returns `request` unchanged
/// when there are none.
pub fn render_context(request: &str, results: &[ScoredFragment]) -> String {
    let mut out = request.to_string();
    if results.is_empty() {
        return out;
    }

    out.push_str("\n\n");
    out.push_str(CONTEXT_HEADER);
    out.push('\n');

    for r in results.iter().take(MAX_CONTEXT_DOCUMENTS) {
        let f = &r.fragment;
        out.push_str(&format!(
            "\n--- From {} (Similarity: {:.1}%) ---\n",
            f.source_document,
            r.score * 100.0
        ));
        out.push_str(&truncate_text(&f.text, RESULT_TEXT_LIMIT));
        out.push('\n');

        if !f.notable_snippets.is_empty() {
            out.push_str("\nKey Findings:\n");
            for snippet in f.notable_snippets.iter().take(MAX_CONTEXT_SNIPPETS) {
                out.push_str(&format!("• {}\n", snippet));
            }
        }
    }

    out
}
