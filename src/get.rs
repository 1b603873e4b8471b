//! Fragment lookup and document deletion.
//!
//! `flens get` prints one fragment of the live generation; `flens delete`
//! removes every fragment of a (document, project) pair.

use anyhow::{bail, Result};
use fragment_lens_core::store::FragmentStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// CLI entry point for `flens get`.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let fragment = store.get(id).await;
    store.close().await;

    let Some(fragment) = fragment? else {
        bail!("fragment not found: {}", id);
    };

    println!("--- Fragment ---");
    println!("id:           {}", fragment.id);
    println!("document:     {}", fragment.source_document);
    println!("media_type:   {}", fragment.source_media_type);
    println!("project:      {}", fragment.project_id);
    println!("module:       {}", fragment.module_tag);
    println!(
        "chunk:        {} of {}",
        fragment.chunk_index + 1,
        fragment.chunk_count
    );
    println!("dimension:    {}", fragment.dimension());
    println!("content_hash: {}", fragment.content_hash);
    println!("created_at:   {}", fragment.created_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!("updated_at:   {}", fragment.updated_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!();

    println!("--- Text ---");
    println!("{}", fragment.text);
    println!();

    println!("--- Findings ({}) ---", fragment.notable_snippets.len());
    for snippet in &fragment.notable_snippets {
        println!("• {}", snippet);
    }

    Ok(())
}

/// CLI entry point for `flens delete`.
pub async fn run_delete(config: &Config, source_document: &str, project_id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let removed = store.delete_by_document(source_document, project_id).await;
    store.close().await;

    if removed? {
        println!("deleted {} from project {}", source_document, project_id);
    } else {
        println!("nothing to delete for {} in project {}", source_document, project_id);
    }
    Ok(())
}
