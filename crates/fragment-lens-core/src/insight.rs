//! Cross-project insight mining.
//!
//! For a project's fragments in one module, look for close matches owned
//! by *other* projects and summarise each seed's matches as an [`Insight`].
//!
//! # Algorithm
//!
//! 1. Seeds: up to `seed_limit` fragments of `(project_id, module_tag)`,
//!    oldest first.
//! 2. For each seed, rank the whole index against its vector with the
//!    stricter insight threshold and `top_k`.
//! 3. Drop matches owned by the seed's own project.
//! 4. One insight per seed with matches left; confidence is their mean
//!    score.
//! 5. Sort by confidence (desc) and truncate to `max_insights`.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{FragmentFilter, ScoredFragment, SearchOutcome};
use crate::search::similar_to_fragment;
use crate::store::FragmentStore;

pub const DEFAULT_SEED_LIMIT: usize = 3;
pub const DEFAULT_INSIGHT_TOP_K: usize = 5;
pub const DEFAULT_INSIGHT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_INSIGHTS: usize = 3;

/// Tuning for [`find_insights`].
#[derive(Debug, Clone, PartialEq)]
pub struct InsightParams {
    pub seed_limit: usize,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub max_insights: usize,
}

impl Default for InsightParams {
    fn default() -> Self {
        Self {
            seed_limit: DEFAULT_SEED_LIMIT,
            top_k: DEFAULT_INSIGHT_TOP_K,
            similarity_threshold: DEFAULT_INSIGHT_THRESHOLD,
            max_insights: DEFAULT_MAX_INSIGHTS,
        }
    }
}

/// A cross-project pattern found for one seed fragment.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub pattern: String,
    pub related_fragments: Vec<ScoredFragment>,
    pub recommendation: String,
    /// Mean score of `related_fragments`.
    pub confidence: f64,
    pub related_project_ids: BTreeSet<String>,
    pub seed_fragment_id: String,
}

/// Mine insights for `project_id`'s fragments tagged `module_tag`.
pub async fn find_insights<S>(
    store: &S,
    project_id: &str,
    module_tag: &str,
    params: &InsightParams,
) -> SearchOutcome<Insight>
where
    S: FragmentStore + ?Sized,
{
    if params.max_insights == 0 || params.seed_limit == 0 {
        return SearchOutcome::ok(Vec::new());
    }

    let filter = FragmentFilter::project(project_id).with_module(module_tag);
    let scan = match store.scan(&filter).await {
        Ok(scan) => scan,
        Err(e) => {
            warn!(project_id, module_tag, error = %e, "seed scan failed");
            return SearchOutcome::failed(format!("{:#}", e));
        }
    };

    let mut seeds = Vec::new();
    for item in scan {
        match item {
            Ok(f) => seeds.push(f),
            Err(e) => warn!(fragment_id = %e.fragment_id, error = %e, "skipping undecodable seed"),
        }
    }
    seeds.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.sequence.cmp(&b.sequence))
    });
    seeds.truncate(params.seed_limit);

    let mut insights = Vec::new();
    for seed in &seeds {
        let outcome = similar_to_fragment(store, seed, params.top_k, params.similarity_threshold).await;
        if let Some(error) = outcome.error {
            return SearchOutcome::failed(error);
        }

        let matches: Vec<ScoredFragment> = outcome
            .items
            .into_iter()
            .filter(|m| m.fragment.project_id != seed.project_id)
            .collect();
        if let Some(insight) = synthesize(&seed.id, module_tag, matches) {
            insights.push(insight);
        }
    }

    insights.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    insights.truncate(params.max_insights);
    debug!(project_id, module_tag, seeds = seeds.len(), insights = insights.len(), "insight mining complete");
    SearchOutcome::ok(insights)
}

/// Build an insight from ranked cross-project matches; `None` when empty.
fn synthesize(seed_id: &str, module_tag: &str, matches: Vec<ScoredFragment>) -> Option<Insight> {
    let best = matches.first()?;

    let related_project_ids: BTreeSet<String> = matches
        .iter()
        .map(|m| m.fragment.project_id.clone())
        .collect();
    let confidence = matches.iter().map(|m| m.score).sum::<f64>() / matches.len() as f64;

    let n = related_project_ids.len();
    let pattern = format!(
        "Similar {} patterns found across {} other {}",
        module_tag,
        n,
        if n == 1 { "project" } else { "projects" }
    );
    let recommendation = format!(
        "Consider applying insights from project '{}' which had similar {} characteristics (similarity: {:.1}%)",
        best.fragment.project_id,
        module_tag,
        best.score * 100.0
    );

    Some(Insight {
        pattern,
        recommendation,
        confidence,
        related_project_ids,
        seed_fragment_id: seed_id.to_string(),
        related_fragments: matches,
    })
}
