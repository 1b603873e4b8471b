//! `flens snippets refresh`: re-run the finding extractor over stored
//! fragments and persist any changed snippets.

use anyhow::Result;
use fragment_lens_core::maintenance::refresh_snippets;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_snippets_refresh(config: &Config, project_id: Option<&str>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let changed = refresh_snippets(&store, project_id).await;
    store.close().await;

    println!("snippets refresh");
    println!("  fragments updated: {}", changed?);
    println!("ok");
    Ok(())
}
