use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One row per fragment per generation; readers only see the current one.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fragments (
            id TEXT NOT NULL,
            generation INTEGER NOT NULL,
            sequence INTEGER NOT NULL,
            source_document TEXT NOT NULL,
            source_media_type TEXT NOT NULL DEFAULT 'text/plain',
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            project_id TEXT NOT NULL,
            module_tag TEXT NOT NULL,
            notable_snippets TEXT NOT NULL DEFAULT '[]',
            chunk_index INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (generation, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-row bookkeeping for the live generation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            generation INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            dims INTEGER,
            next_sequence INTEGER NOT NULL,
            last_rebuild_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO index_state (id, generation, revision, dims, next_sequence, last_rebuild_at)
         VALUES (1, 1, 0, NULL, 1, NULL)",
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fragments_scope ON fragments(generation, project_id, module_tag)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fragments_document ON fragments(generation, project_id, source_document)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
