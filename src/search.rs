//! Semantic search and similar-fragment lookup.
//!
//! `flens search` embeds the query with the configured provider and ranks
//! the live generation by cosine similarity. `flens similar` ranks the
//! whole index against a stored fragment's own vector, so it needs no
//! embedder.

use anyhow::{bail, Result};
use fragment_lens_core::models::{ScoredFragment, SearchOutcome, SearchResultItem};
use fragment_lens_core::search::{self, SearchRequest};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Filters and limits for `flens search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub project_id: Option<String>,
    pub module_tags: Vec<String>,
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    pub json: bool,
}

/// JSON shape printed with `--json`.
#[derive(Debug, Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run_search(config: &Config, query: &str, opts: &SearchOptions) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let request = SearchRequest {
        project_id: opts.project_id.clone(),
        module_tags: if opts.module_tags.is_empty() {
            None
        } else {
            Some(opts.module_tags.iter().cloned().collect::<BTreeSet<_>>())
        },
        top_k: opts.top_k.unwrap_or(config.retrieval.top_k),
        similarity_threshold: opts
            .threshold
            .unwrap_or(config.retrieval.similarity_threshold),
        ..SearchRequest::new(query)
    };

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = SqliteStore::open(config).await?;
    let outcome = search::search(&store, embedder.as_ref(), &request).await;
    store.close().await;

    print_outcome(outcome, opts.json)
}

pub async fn run_similar(
    config: &Config,
    fragment_id: &str,
    top_k: Option<usize>,
    threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let outcome = search::find_similar_to(
        &store,
        fragment_id,
        top_k.unwrap_or(config.retrieval.top_k),
        threshold.unwrap_or(config.retrieval.similarity_threshold),
    )
    .await;
    store.close().await;

    print_outcome(outcome, json)
}

fn print_outcome(outcome: SearchOutcome<ScoredFragment>, json: bool) -> Result<()> {
    if json {
        let response = SearchResponse {
            results: outcome.items.iter().map(|r| r.to_result_item()).collect(),
            error: outcome.error,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(error) = &outcome.error {
        eprintln!("Warning: {}", error);
    }

    if outcome.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in outcome.items.iter().enumerate() {
        print_result(i + 1, &result.to_result_item());
    }
    Ok(())
}

fn print_result(rank: usize, item: &SearchResultItem) {
    println!(
        "{}. [{:.2}] {} / {}",
        rank, item.score, item.project_id, item.source_document
    );
    println!("    module: {}", item.module_tag);
    println!("    created: {}", item.created_at.format("%Y-%m-%d"));
    println!("    excerpt: \"{}\"", item.text.replace('\n', " ").trim());
    for snippet in &item.notable_snippets {
        println!("    finding: {}", snippet);
    }
    println!("    id: {}", item.fragment_id);
    println!();
}
