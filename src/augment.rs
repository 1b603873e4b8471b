//! `flens augment`: append relevant same-project context to an analysis
//! request and print the result.

use anyhow::{bail, Result};
use fragment_lens_core::context::augment_request;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

pub async fn run_augment(
    config: &Config,
    request: &str,
    project_id: &str,
    module_tag: &str,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Augmentation requires embeddings. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = SqliteStore::open(config).await?;
    let augmented = augment_request(&store, embedder.as_ref(), request, project_id, module_tag).await;
    store.close().await;

    if let Some(error) = &augmented.error {
        eprintln!("Warning: {}", error);
    }
    println!("{}", augmented.text);
    Ok(())
}
