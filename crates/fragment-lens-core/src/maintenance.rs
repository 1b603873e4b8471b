//! Index maintenance: full re-embedding, snippet refresh and stats.
//!
//! [`rebuild`] never touches the live generation. It snapshots it, embeds
//! every fragment outside any lock and publishes the result as a new
//! generation. If a write lands in between, the publish is refused and the
//! rebuild starts over from a fresh snapshot, reusing embeddings already
//! computed for identical text.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::findings::extract_findings;
use crate::models::{Fragment, FragmentFilter, IndexStats};
use crate::store::FragmentStore;

/// Publish attempts before [`rebuild`] gives up on a busy index.
pub const MAX_REBUILD_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    /// Number of the generation that was published.
    pub generation: u64,
    pub fragments: usize,
    /// Distinct texts sent to the embedder.
    pub embedded: usize,
    pub dimension: Option<usize>,
    pub attempts: usize,
}

/// Re-embed every fragment into a new generation and swap it in.
///
/// Any embedding failure or undecodable fragment aborts the rebuild and
/// leaves the live generation as it was; a generation never mixes vectors
/// from two embedders.
pub async fn rebuild<S, E>(store: &S, embedder: &E, batch_size: usize) -> Result<RebuildReport>
where
    S: FragmentStore + ?Sized,
    E: Embedder + ?Sized,
{
    let batch_size = batch_size.max(1);
    let mut memo: HashMap<String, Vec<f32>> = HashMap::new();

    for attempt in 1..=MAX_REBUILD_ATTEMPTS {
        let based_on = store.generation().await?;

        let mut snapshot: Vec<Fragment> = Vec::new();
        for item in store.scan(&FragmentFilter::default()).await? {
            let f = item.map_err(IndexError::from)?;
            snapshot.push(Fragment::clone(&f));
        }

        let mut queued = HashSet::new();
        let mut pending: Vec<(String, String)> = Vec::new();
        for f in &snapshot {
            if !memo.contains_key(&f.content_hash) && queued.insert(f.content_hash.as_str()) {
                pending.push((f.content_hash.clone(), f.text.clone()));
            }
        }

        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let results = embedder.embed_batch(&texts).await;
            if results.len() != texts.len() {
                bail!(
                    "embedder returned {} results for {} texts",
                    results.len(),
                    texts.len()
                );
            }
            for ((hash, _), result) in batch.iter().zip(results) {
                let vector = result.map_err(IndexError::from)?;
                memo.insert(hash.clone(), vector);
            }
        }

        let mut rebuilt = Vec::with_capacity(snapshot.len());
        for mut f in snapshot {
            f.vector = memo
                .get(&f.content_hash)
                .cloned()
                .ok_or_else(|| anyhow!("no embedding computed for fragment {}", f.id))?;
            rebuilt.push(f);
        }

        let fragments = rebuilt.len();
        if store.publish_generation(&based_on, rebuilt).await? {
            let live = store.generation().await?;
            info!(
                generation = live.number,
                fragments,
                embedded = memo.len(),
                attempt,
                "index rebuilt"
            );
            return Ok(RebuildReport {
                generation: live.number,
                fragments,
                embedded: memo.len(),
                dimension: live.dimension,
                attempts: attempt,
            });
        }

        warn!(attempt, "index changed during rebuild; retrying from a fresh snapshot");
    }

    bail!(
        "index kept changing during rebuild; gave up after {} attempts",
        MAX_REBUILD_ATTEMPTS
    )
}

/// Re-run the finding extractor over stored fragments.
///
/// Returns how many fragments had their snippets changed.
pub async fn refresh_snippets<S>(store: &S, project_id: Option<&str>) -> Result<usize>
where
    S: FragmentStore + ?Sized,
{
    let filter = FragmentFilter {
        project_id: project_id.map(str::to_string),
        module_tags: None,
    };

    let mut updates = Vec::new();
    for item in store.scan(&filter).await? {
        match item {
            Ok(f) => {
                let snippets = extract_findings(&f.text);
                if snippets != f.notable_snippets {
                    updates.push((f.id.clone(), snippets));
                }
            }
            Err(e) => warn!(fragment_id = %e.fragment_id, error = %e, "skipping undecodable fragment"),
        }
    }

    let mut changed = 0;
    for (id, snippets) in updates {
        if store.update_snippets(&id, snippets).await? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Observability snapshot of the live generation.
pub async fn stats<S>(store: &S) -> Result<IndexStats>
where
    S: FragmentStore + ?Sized,
{
    let generation = store.generation().await?;
    Ok(IndexStats {
        total_fragments: store.count().await?,
        fragments_by_module: store.count_by_module().await?,
        fragments_by_project: store.count_by_project().await?,
        embedding_dimension: generation.dimension,
        last_rebuild_at: generation.last_rebuild_at,
        generation: generation.number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::embedding::HashingEmbedder;
    use crate::error::EmbeddingError;
    use crate::ingest::content_hash;
    use crate::store::memory::InMemoryStore;
    use crate::testing::{fragment, ConceptEmbedder, FailingEmbedder};

    /// Concept embedder that also writes a fresh fragment to the store on
    /// each of its first `writes` batch calls, racing the rebuild.
    struct WritingEmbedder {
        inner: ConceptEmbedder,
        store: Arc<InMemoryStore>,
        writes_left: AtomicUsize,
        written: Mutex<Vec<String>>,
    }

    impl WritingEmbedder {
        fn new(store: Arc<InMemoryStore>, writes: usize) -> Self {
            Self {
                inner: ConceptEmbedder::default(),
                store,
                writes_left: AtomicUsize::new(writes),
                written: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Embedder for WritingEmbedder {
        fn model_name(&self) -> &str {
            "writing"
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbeddingError>> {
            let claimed = self
                .writes_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if claimed {
                let n = self.written.lock().len();
                let text = format!("Database index backlog entry {n}");
                let vector = self.inner.embed(&text).await.unwrap();
                let stored = self
                    .store
                    .insert_batch(vec![fragment("C", "database", &text, vector)])
                    .await
                    .unwrap();
                self.written.lock().push(stored[0].id.clone());
            }
            self.inner.embed_batch(texts).await
        }
    }

    async fn seeded_store(embedder: &ConceptEmbedder) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (project, module, text) in [
            ("A", "security", "Key finding: passwords are stored in plain text"),
            ("A", "security", "Key finding: passwords are stored in plain text"),
            ("B", "architecture", "Layered service architecture"),
        ] {
            let f = fragment(project, module, text, embedder.embed(text).await.unwrap());
            store.insert_batch(vec![f]).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_rebuild_switches_embedder() {
        let store = seeded_store(&ConceptEmbedder::new()).await;
        let before = store.generation().await.unwrap();
        assert_eq!(before.dimension, Some(4));

        let report = rebuild(&store, &HashingEmbedder::new(16), 2).await.unwrap();
        assert_eq!(report.fragments, 3);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.generation, before.number + 1);
        assert_eq!(report.dimension, Some(16));

        let after = stats(&store).await.unwrap();
        assert_eq!(after.total_fragments, 3);
        assert_eq!(after.embedding_dimension, Some(16));
        assert!(after.last_rebuild_at.is_some());
    }

    #[tokio::test]
    async fn test_rebuild_failure_keeps_live_generation() {
        let store = seeded_store(&ConceptEmbedder::new()).await;
        let before = store.generation().await.unwrap();

        assert!(rebuild(&store, &FailingEmbedder, 8).await.is_err());
        assert_eq!(store.generation().await.unwrap(), before);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rebuild_empty_index() {
        let store = InMemoryStore::new();
        let report = rebuild(&store, &HashingEmbedder::new(8), 8).await.unwrap();
        assert_eq!(report.fragments, 0);
        assert_eq!(report.dimension, None);
    }

    #[tokio::test]
    async fn test_rebuild_keeps_identity() {
        let store = seeded_store(&ConceptEmbedder::new()).await;
        let mut before: Vec<_> = store
            .scan(&FragmentFilter::default())
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect();
        before.sort_by_key(|f| f.sequence);

        rebuild(&store, &HashingEmbedder::new(8), 8).await.unwrap();
        for f in before {
            let after = store.get(&f.id).await.unwrap().unwrap();
            assert_eq!(after.sequence, f.sequence);
            assert_eq!(after.created_at, f.created_at);
            assert_eq!(after.content_hash, content_hash(&after.text));
            assert_eq!(after.vector.len(), 8);
        }
    }

    #[tokio::test]
    async fn test_refresh_snippets() {
        let store = seeded_store(&ConceptEmbedder::new()).await;

        assert_eq!(refresh_snippets(&store, Some("B")).await.unwrap(), 0);
        assert_eq!(refresh_snippets(&store, None).await.unwrap(), 2);
        assert_eq!(refresh_snippets(&store, None).await.unwrap(), 0);

        let a: Vec<_> = store
            .scan(&FragmentFilter::project("A"))
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect();
        assert!(a
            .iter()
            .all(|f| f.notable_snippets == vec!["passwords are stored in plain text"]));
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let store = seeded_store(&ConceptEmbedder::new()).await;
        let s = stats(&store).await.unwrap();
        assert_eq!(s.total_fragments, 3);
        assert_eq!(s.fragments_by_module.get("security"), Some(&2));
        assert_eq!(s.fragments_by_project.get("B"), Some(&1));
        assert_eq!(s.generation, 1);
        assert!(s.last_rebuild_at.is_none());
    }

    #[tokio::test]
    async fn test_rebuild_retries_after_concurrent_write() {
        let store = Arc::new(seeded_store(&ConceptEmbedder::new()).await);
        let before = store.generation().await.unwrap();
        let embedder = WritingEmbedder::new(store.clone(), 1);

        let report = rebuild(store.as_ref(), &embedder, 8).await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.fragments, 4);
        assert_eq!(report.generation, before.number + 1);

        let written = embedder.written.lock().clone();
        assert_eq!(written.len(), 1);
        let landed = store.get(&written[0]).await.unwrap().unwrap();
        assert_eq!(landed.project_id, "C");
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_rebuild_gives_up_on_busy_index() {
        let store = Arc::new(seeded_store(&ConceptEmbedder::new()).await);
        let before = store.generation().await.unwrap();
        let embedder = WritingEmbedder::new(store.clone(), usize::MAX);

        let err = rebuild(store.as_ref(), &embedder, 8).await.unwrap_err();
        assert!(err
            .to_string()
            .contains(&format!("gave up after {} attempts", MAX_REBUILD_ATTEMPTS)));

        // Every attempt was refused, so no generation was published.
        let after = store.generation().await.unwrap();
        assert_eq!(after.number, before.number);
        assert!(after.last_rebuild_at.is_none());
        assert_eq!(embedder.written.lock().len(), MAX_REBUILD_ATTEMPTS);
        assert_eq!(store.count().await.unwrap(), 3 + MAX_REBUILD_ATTEMPTS);
    }
}
