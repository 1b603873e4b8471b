//! Document write path: chunk → embed → extract findings → insert (or replace).
//!
//! Embedding failures are isolated per chunk: the chunk is logged and
//! skipped, the rest of the document is still indexed. The surviving
//! fragments are inserted as one atomic batch.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::{chunk_text, ChunkingParams};
use crate::embedding::Embedder;
use crate::findings::extract_findings;
use crate::models::Fragment;
use crate::store::FragmentStore;

/// Raw text plus identifying metadata from the document source.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub text: String,
    pub source_document: String,
    pub source_media_type: String,
    pub project_id: String,
    pub module_tag: String,
}

/// Outcome of [`process_document`] and [`replace_document`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Fragments stored, with `sequence` assigned.
    pub fragments: Vec<Fragment>,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks skipped because embedding failed.
    pub failed: usize,
}

/// SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Chunked and embedded form of one document, not yet stored.
struct PreparedDocument {
    fragments: Vec<Fragment>,
    chunks: usize,
    failed: usize,
}

/// Index one document.
///
/// Every stored fragment records `chunk_count` as the number of chunks
/// produced, so skipped chunks leave gaps in `chunk_index`. Fails only if
/// the input is malformed or the store rejects the batch.
pub async fn process_document<S, E>(
    store: &S,
    embedder: &E,
    input: &DocumentInput,
    params: &ChunkingParams,
) -> Result<IngestReport>
where
    S: FragmentStore + ?Sized,
    E: Embedder + ?Sized,
{
    let prepared = prepare_document(embedder, input, params).await?;
    if prepared.chunks == 0 {
        return Ok(IngestReport {
            fragments: Vec::new(),
            chunks: 0,
            failed: 0,
        });
    }

    let fragments = store.insert_batch(prepared.fragments).await?;
    info!(
        document = %input.source_document,
        project = %input.project_id,
        chunks = prepared.chunks,
        stored = fragments.len(),
        failed = prepared.failed,
        "document indexed"
    );

    Ok(IngestReport {
        fragments,
        chunks: prepared.chunks,
        failed: prepared.failed,
    })
}

/// Re-index one document, swapping out its previous fragments.
///
/// The new fragments are built first and handed to
/// [`FragmentStore::replace_document`], so a store rejection leaves the
/// old fragments in place. If the document produced chunks but every one
/// of them failed to embed, the old fragments are kept as well.
pub async fn replace_document<S, E>(
    store: &S,
    embedder: &E,
    input: &DocumentInput,
    params: &ChunkingParams,
) -> Result<IngestReport>
where
    S: FragmentStore + ?Sized,
    E: Embedder + ?Sized,
{
    let prepared = prepare_document(embedder, input, params).await?;
    if prepared.chunks > 0 && prepared.fragments.is_empty() {
        warn!(
            document = %input.source_document,
            project = %input.project_id,
            failed = prepared.failed,
            "no chunk could be embedded; keeping previous fragments"
        );
        return Ok(IngestReport {
            fragments: Vec::new(),
            chunks: prepared.chunks,
            failed: prepared.failed,
        });
    }

    let fragments = store
        .replace_document(&input.source_document, &input.project_id, prepared.fragments)
        .await?;
    info!(
        document = %input.source_document,
        project = %input.project_id,
        chunks = prepared.chunks,
        stored = fragments.len(),
        failed = prepared.failed,
        "document re-indexed"
    );

    Ok(IngestReport {
        fragments,
        chunks: prepared.chunks,
        failed: prepared.failed,
    })
}

/// Chunk, embed and extract findings for `input`.
async fn prepare_document<E>(
    embedder: &E,
    input: &DocumentInput,
    params: &ChunkingParams,
) -> Result<PreparedDocument>
where
    E: Embedder + ?Sized,
{
    if input.project_id.trim().is_empty() {
        bail!("project id must not be empty");
    }
    if input.module_tag.trim().is_empty() {
        bail!("module tag must not be empty");
    }

    let chunks = chunk_text(&input.text, params.max_chunk_size, params.overlap_size);
    if chunks.is_empty() {
        return Ok(PreparedDocument {
            fragments: Vec::new(),
            chunks: 0,
            failed: 0,
        });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = embedder.embed_batch(&texts).await.into_iter();
    let expected_dims = embedder.dims();

    let chunk_count = chunks.len();
    let now = Utc::now();
    let mut fragments = Vec::with_capacity(chunk_count);
    let mut failed = 0;

    for chunk in chunks {
        let vector = match vectors.next() {
            Some(Ok(v)) if expected_dims == 0 || v.len() == expected_dims => v,
            Some(Ok(v)) => {
                warn!(
                    document = %input.source_document,
                    chunk = chunk.index,
                    expected = expected_dims,
                    found = v.len(),
                    "embedder returned wrong dimension; skipping chunk"
                );
                failed += 1;
                continue;
            }
            Some(Err(e)) => {
                warn!(
                    document = %input.source_document,
                    chunk = chunk.index,
                    error = %e,
                    "skipping chunk"
                );
                failed += 1;
                continue;
            }
            None => {
                warn!(
                    document = %input.source_document,
                    chunk = chunk.index,
                    "embedder returned no result; skipping chunk"
                );
                failed += 1;
                continue;
            }
        };

        fragments.push(Fragment {
            id: Uuid::new_v4().to_string(),
            source_document: input.source_document.clone(),
            source_media_type: input.source_media_type.clone(),
            notable_snippets: extract_findings(&chunk.text),
            content_hash: content_hash(&chunk.text),
            text: chunk.text,
            vector,
            project_id: input.project_id.clone(),
            module_tag: input.module_tag.clone(),
            chunk_index: chunk.index,
            chunk_count,
            created_at: now,
            updated_at: now,
            sequence: 0,
        });
    }

    Ok(PreparedDocument {
        fragments,
        chunks: chunk_count,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentFilter;
    use crate::store::memory::InMemoryStore;
    use crate::testing::{ConceptEmbedder, FailingEmbedder};

    fn input(text: &str) -> DocumentInput {
        DocumentInput {
            text: text.to_string(),
            source_document: "report.txt".to_string(),
            source_media_type: "text/plain".to_string(),
            project_id: "A".to_string(),
            module_tag: "security".to_string(),
        }
    }

    fn small_chunks() -> ChunkingParams {
        ChunkingParams {
            max_chunk_size: 40,
            overlap_size: 0,
        }
    }

    #[tokio::test]
    async fn test_process_document_stores_fragments() {
        let store = InMemoryStore::new();
        let embedder = ConceptEmbedder::new();
        let text = "Key finding: passwords are stored in plain text. Encryption is missing.";

        let report = process_document(&store, &embedder, &input(text), &ChunkingParams::default())
            .await
            .unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.fragments.len(), 1);

        let f = &report.fragments[0];
        assert_eq!(f.chunk_index, 0);
        assert_eq!(f.chunk_count, 1);
        assert_eq!(f.project_id, "A");
        assert_eq!(f.notable_snippets, vec!["passwords are stored in plain text"]);
        assert_eq!(f.content_hash, content_hash(&f.text));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_skipped() {
        let store = InMemoryStore::new();
        let embedder = ConceptEmbedder::failing_on("poison");
        let text = "Database indexing is good. The poison sentence is here. Security access matters.";

        let report = process_document(&store, &embedder, &input(text), &small_chunks())
            .await
            .unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.failed, 1);
        let indexes: Vec<_> = report.fragments.iter().map(|f| f.chunk_index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert!(report.fragments.iter().all(|f| f.chunk_count == 3));
    }

    #[tokio::test]
    async fn test_all_chunks_failing_stores_nothing() {
        let store = InMemoryStore::new();
        let report = process_document(&store, &FailingEmbedder, &input("One. Two."), &small_chunks())
            .await
            .unwrap();
        assert_eq!(report.failed, report.chunks);
        assert!(report.fragments.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_document_produces_nothing() {
        let store = InMemoryStore::new();
        let report = process_document(&store, &ConceptEmbedder::new(), &input("  \n "), &small_chunks())
            .await
            .unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(store.scan(&FragmentFilter::default()).await.unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_missing_project() {
        let store = InMemoryStore::new();
        let mut doc = input("Some text.");
        doc.project_id = " ".to_string();
        assert!(process_document(&store, &ConceptEmbedder::new(), &doc, &small_chunks())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_replace_document_swaps_fragments() {
        let store = InMemoryStore::new();
        let embedder = ConceptEmbedder::new();
        let first = process_document(&store, &embedder, &input("Database indexing is slow."), &small_chunks())
            .await
            .unwrap();
        let old_id = first.fragments[0].id.clone();

        let report = replace_document(
            &store,
            &embedder,
            &input("Security access is missing. Database indexing is fixed."),
            &small_chunks(),
        )
        .await
        .unwrap();
        assert_eq!(report.fragments.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.get(&old_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_document_keeps_old_fragments_on_rejection() {
        let store = InMemoryStore::new();
        let mut wide = crate::testing::fragment("A", "security", "wide vector", vec![1.0; 8]);
        wide.source_document = "report.txt".to_string();
        store.insert_batch(vec![wide.clone()]).await.unwrap();

        // ConceptEmbedder emits 4-dim vectors; the index is fixed at 8.
        let err = replace_document(&store, &ConceptEmbedder::new(), &input("Database indexing."), &small_chunks())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::IndexError>(),
            Some(crate::error::IndexError::DimensionMismatch { expected: 8, found: 4, .. })
        ));
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get(&wide.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_document_keeps_old_fragments_when_embedding_fails() {
        let store = InMemoryStore::new();
        process_document(&store, &ConceptEmbedder::new(), &input("Database indexing is slow."), &small_chunks())
            .await
            .unwrap();

        let report = replace_document(&store, &FailingEmbedder, &input("One. Two."), &small_chunks())
            .await
            .unwrap();
        assert!(report.fragments.is_empty());
        assert_eq!(report.failed, report.chunks);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
