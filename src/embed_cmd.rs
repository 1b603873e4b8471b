//! Embedding maintenance commands.
//!
//! - `flens embed rebuild` re-embeds every stored fragment with the
//!   configured provider into a new generation and publishes it atomically.
//!   Searches keep reading the old generation until the swap.
//! - `flens embed test <text>` embeds one text and reports the dimension,
//!   an estimated token count and the elapsed time.

use anyhow::{bail, Result};
use fragment_lens_core::embedding::estimate_tokens;
use fragment_lens_core::maintenance;
use std::time::Instant;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Re-embed the whole index into a fresh generation.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = SqliteStore::open(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let report = maintenance::rebuild(&store, embedder.as_ref(), batch_size).await;
    store.close().await;
    let report = report?;

    println!("embed rebuild");
    println!("  model: {}", embedder.model_name());
    println!("  fragments: {}", report.fragments);
    println!("  embedded: {}", report.embedded);
    println!(
        "  dimension: {}",
        report
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unset".to_string())
    );
    println!("  generation: {}", report.generation);
    if report.attempts > 1 {
        println!("  attempts: {}", report.attempts);
    }
    println!("ok");
    Ok(())
}

/// Embed one text and report what the provider returned.
pub async fn run_embed_test(config: &Config, text: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let started = Instant::now();
    let vector = embedder.embed(text).await?;
    let elapsed = started.elapsed();

    println!("embed test");
    println!("  provider: {}", config.embedding.provider);
    println!("  model: {}", embedder.model_name());
    println!("  dimension: {}", vector.len());
    println!("  estimated tokens: {}", estimate_tokens(text));
    println!("  elapsed: {} ms", elapsed.as_millis());
    if embedder.dims() > 0 && vector.len() != embedder.dims() {
        println!(
            "  warning: configured dims {} but provider returned {}",
            embedder.dims(),
            vector.len()
        );
    }
    Ok(())
}
