//! SQLite implementation of [`FragmentStore`].
//!
//! Fragments of every generation share one `fragments` table; the
//! single-row `index_state` table names the live generation. Reads filter
//! on it inside one statement, so a reader sees either the old generation
//! or the new one, never a mix.
//!
//! Every write transaction starts by bumping `index_state.revision`. That
//! takes SQLite's write lock up front and gives rebuilds a cheap way to
//! notice concurrent writes.
//!
//! Vectors are stored as little-endian `f32` BLOBs; timestamps as Unix
//! milliseconds; `notable_snippets` as a JSON array.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fragment_lens_core::embedding::{blob_to_vec, vec_to_blob};
use fragment_lens_core::error::{DecodeError, IndexError};
use fragment_lens_core::models::{Fragment, FragmentFilter};
use fragment_lens_core::store::{
    check_dimension, FragmentScan, FragmentStore, GenerationInfo, ScanItem,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;

const FRAGMENT_COLUMNS: &str = "id, sequence, source_document, source_media_type, text, embedding, \
     project_id, module_tag, notable_snippets, chunk_index, chunk_count, content_hash, \
     created_at, updated_at";

const LIVE_GENERATION: &str = "(SELECT generation FROM index_state WHERE id = 1)";

/// Fragment store backed by a SQLite connection pool.
pub struct SqliteStore {
    pool: SqlitePool,
}

struct IndexState {
    generation: i64,
    revision: i64,
    dims: Option<i64>,
    next_sequence: i64,
    last_rebuild_at: Option<i64>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool)
            .await
            .context("Failed to apply database schema")?;
        Ok(Self::new(pool))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn count_grouped(&self, column: &'static str) -> Result<BTreeMap<String, usize>> {
        let sql = format!(
            "SELECT {col} AS key, COUNT(*) AS n FROM fragments WHERE generation = {live} GROUP BY {col}",
            col = column,
            live = LIVE_GENERATION
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let key: String = row.get("key");
            let n: i64 = row.get("n");
            counts.insert(key, n as usize);
        }
        Ok(counts)
    }
}

#[async_trait]
impl FragmentStore for SqliteStore {
    async fn insert_batch(&self, fragments: Vec<Fragment>) -> Result<Vec<Fragment>> {
        if fragments.is_empty() {
            return Ok(fragments);
        }

        let mut tx = self.pool.begin().await?;
        bump_revision(&mut tx).await?;
        let state = read_state(&mut *tx).await?;
        let dims = check_dimension(state.dims.map(|d| d as usize), &fragments)?;

        let mut next_sequence = state.next_sequence;
        let mut stored = Vec::with_capacity(fragments.len());
        for mut f in fragments {
            f.sequence = next_sequence as u64;
            next_sequence += 1;
            insert_row(&mut tx, state.generation, &f).await?;
            stored.push(f);
        }

        sqlx::query("UPDATE index_state SET next_sequence = ?, dims = ? WHERE id = 1")
            .bind(next_sequence)
            .bind(dims.map(|d| d as i64))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(stored)
    }

    async fn scan(&self, filter: &FragmentFilter) -> Result<FragmentScan> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM fragments WHERE generation = {}",
            FRAGMENT_COLUMNS, LIVE_GENERATION
        ));

        if let Some(ref project) = filter.project_id {
            qb.push(" AND project_id = ").push_bind(project.clone());
        }
        if let Some(ref tags) = filter.module_tags {
            if tags.is_empty() {
                return Ok(FragmentScan::empty());
            }
            qb.push(" AND module_tag IN (");
            let mut separated = qb.separated(", ");
            for tag in tags {
                separated.push_bind(tag.clone());
            }
            separated.push_unseparated(")");
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(FragmentScan::new(rows.into_iter().map(|row| row_to_fragment(&row))))
    }

    async fn get(&self, id: &str) -> Result<Option<Arc<Fragment>>> {
        let sql = format!(
            "SELECT {} FROM fragments WHERE generation = {} AND id = ?",
            FRAGMENT_COLUMNS, LIVE_GENERATION
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_fragment(&row).map_err(IndexError::from)?)),
            None => Ok(None),
        }
    }

    async fn delete_by_document(&self, source_document: &str, project_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        bump_revision(&mut tx).await?;

        let sql = format!(
            "DELETE FROM fragments WHERE generation = {} AND source_document = ? AND project_id = ?",
            LIVE_GENERATION
        );
        let removed = sqlx::query(&sql)
            .bind(source_document)
            .bind(project_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn replace_document(
        &self,
        source_document: &str,
        project_id: &str,
        fragments: Vec<Fragment>,
    ) -> Result<Vec<Fragment>> {
        let mut tx = self.pool.begin().await?;
        bump_revision(&mut tx).await?;
        let state = read_state(&mut *tx).await?;
        // Dropping the transaction rolls back the revision bump.
        let dims = check_dimension(state.dims.map(|d| d as usize), &fragments)?;

        sqlx::query(
            "DELETE FROM fragments WHERE generation = ? AND source_document = ? AND project_id = ?",
        )
        .bind(state.generation)
        .bind(source_document)
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        let mut next_sequence = state.next_sequence;
        let mut stored = Vec::with_capacity(fragments.len());
        for mut f in fragments {
            f.sequence = next_sequence as u64;
            next_sequence += 1;
            insert_row(&mut tx, state.generation, &f).await?;
            stored.push(f);
        }

        sqlx::query("UPDATE index_state SET next_sequence = ?, dims = ? WHERE id = 1")
            .bind(next_sequence)
            .bind(dims.map(|d| d as i64))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(stored)
    }

    async fn update_snippets(&self, id: &str, snippets: Vec<String>) -> Result<bool> {
        let snippets_json = serde_json::to_string(&snippets)?;

        let mut tx = self.pool.begin().await?;
        bump_revision(&mut tx).await?;

        let sql = format!(
            "UPDATE fragments SET notable_snippets = ?, updated_at = ? WHERE generation = {} AND id = ?",
            LIVE_GENERATION
        );
        let updated = sqlx::query(&sql)
            .bind(snippets_json)
            .bind(Utc::now().timestamp_millis())
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM fragments WHERE generation = {}",
            LIVE_GENERATION
        );
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n as usize)
    }

    async fn count_by_module(&self) -> Result<BTreeMap<String, usize>> {
        self.count_grouped("module_tag").await
    }

    async fn count_by_project(&self) -> Result<BTreeMap<String, usize>> {
        self.count_grouped("project_id").await
    }

    async fn generation(&self) -> Result<GenerationInfo> {
        let state = read_state(&self.pool).await?;
        Ok(GenerationInfo {
            number: state.generation as u64,
            revision: state.revision as u64,
            dimension: state.dims.map(|d| d as usize),
            last_rebuild_at: state.last_rebuild_at.and_then(from_millis),
        })
    }

    async fn publish_generation(
        &self,
        based_on: &GenerationInfo,
        fragments: Vec<Fragment>,
    ) -> Result<bool> {
        let dims = check_dimension(None, &fragments)?;

        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "UPDATE index_state SET revision = revision + 1 WHERE id = 1 AND generation = ? AND revision = ?",
        )
        .bind(based_on.number as i64)
        .bind(based_on.revision as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let state = read_state(&mut *tx).await?;
        let next_generation = state.generation + 1;
        let mut next_sequence = state.next_sequence;
        for f in &fragments {
            insert_row(&mut tx, next_generation, f).await?;
            next_sequence = next_sequence.max(f.sequence as i64 + 1);
        }

        sqlx::query("DELETE FROM fragments WHERE generation <> ?")
            .bind(next_generation)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE index_state SET generation = ?, dims = ?, next_sequence = ?, last_rebuild_at = ? WHERE id = 1",
        )
        .bind(next_generation)
        .bind(dims.map(|d| d as i64))
        .bind(next_sequence)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

async fn bump_revision(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("UPDATE index_state SET revision = revision + 1 WHERE id = 1")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn read_state<'e, E>(executor: E) -> Result<IndexState>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT generation, revision, dims, next_sequence, last_rebuild_at FROM index_state WHERE id = 1",
    )
    .fetch_optional(executor)
    .await?
    .context("index_state row missing; run `flens init`")?;

    Ok(IndexState {
        generation: row.get("generation"),
        revision: row.get("revision"),
        dims: row.get("dims"),
        next_sequence: row.get("next_sequence"),
        last_rebuild_at: row.get("last_rebuild_at"),
    })
}

async fn insert_row(conn: &mut SqliteConnection, generation: i64, f: &Fragment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO fragments (id, generation, sequence, source_document, source_media_type, text,
                               embedding, project_id, module_tag, notable_snippets, chunk_index,
                               chunk_count, content_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&f.id)
    .bind(generation)
    .bind(f.sequence as i64)
    .bind(&f.source_document)
    .bind(&f.source_media_type)
    .bind(&f.text)
    .bind(vec_to_blob(&f.vector))
    .bind(&f.project_id)
    .bind(&f.module_tag)
    .bind(serde_json::to_string(&f.notable_snippets)?)
    .bind(f.chunk_index as i64)
    .bind(f.chunk_count as i64)
    .bind(&f.content_hash)
    .bind(f.created_at.timestamp_millis())
    .bind(f.updated_at.timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ms.div_euclid(1000), (ms.rem_euclid(1000) * 1_000_000) as u32)
}

fn row_to_fragment(row: &SqliteRow) -> ScanItem {
    let id: String = row.try_get("id").map_err(|e| DecodeError {
        fragment_id: "<unknown>".to_string(),
        reason: e.to_string(),
    })?;
    let fail = |reason: String| DecodeError {
        fragment_id: id.clone(),
        reason,
    };

    let blob: Vec<u8> = row.try_get("embedding").map_err(|e| fail(e.to_string()))?;
    let vector = blob_to_vec(&blob)
        .ok_or_else(|| fail(format!("invalid vector blob of {} bytes", blob.len())))?;

    let snippets_json: String = row
        .try_get("notable_snippets")
        .map_err(|e| fail(e.to_string()))?;
    let notable_snippets: Vec<String> = serde_json::from_str(&snippets_json)
        .map_err(|e| fail(format!("invalid notable_snippets: {}", e)))?;

    let created_ms: i64 = row.try_get("created_at").map_err(|e| fail(e.to_string()))?;
    let updated_ms: i64 = row.try_get("updated_at").map_err(|e| fail(e.to_string()))?;
    let created_at = from_millis(created_ms).ok_or_else(|| fail("created_at out of range".into()))?;
    let updated_at = from_millis(updated_ms).ok_or_else(|| fail("updated_at out of range".into()))?;

    let text_column = |name: &str| -> Result<String, DecodeError> {
        row.try_get(name).map_err(|e| fail(e.to_string()))
    };
    let int_column = |name: &str| -> Result<i64, DecodeError> {
        row.try_get(name).map_err(|e| fail(e.to_string()))
    };

    Ok(Arc::new(Fragment {
        source_document: text_column("source_document")?,
        source_media_type: text_column("source_media_type")?,
        text: text_column("text")?,
        vector,
        project_id: text_column("project_id")?,
        module_tag: text_column("module_tag")?,
        notable_snippets,
        chunk_index: int_column("chunk_index")? as usize,
        chunk_count: int_column("chunk_count")? as usize,
        content_hash: text_column("content_hash")?,
        created_at,
        updated_at,
        sequence: int_column("sequence")? as u64,
        id,
    }))
}
