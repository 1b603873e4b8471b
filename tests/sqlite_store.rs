use chrono::Utc;
use fragment_lens::migrate;
use fragment_lens::sqlite_store::SqliteStore;
use fragment_lens_core::embedding::HashingEmbedder;
use fragment_lens_core::error::IndexError;
use fragment_lens_core::ingest::{content_hash, process_document, DocumentInput};
use fragment_lens_core::maintenance;
use fragment_lens_core::models::{Fragment, FragmentFilter};
use fragment_lens_core::search::{self, SearchRequest};
use fragment_lens_core::store::FragmentStore;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn memory_pool() -> SqlitePool {
    // One connection: every handle must see the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    pool
}

async fn memory_store() -> SqliteStore {
    SqliteStore::new(memory_pool().await)
}

fn fragment(project: &str, module: &str, document: &str, text: &str, vector: Vec<f32>) -> Fragment {
    let now = Utc::now();
    Fragment {
        id: uuid_like(text, project, document),
        source_document: document.to_string(),
        source_media_type: "text/plain".to_string(),
        text: text.to_string(),
        vector,
        project_id: project.to_string(),
        module_tag: module.to_string(),
        notable_snippets: vec!["a finding".to_string()],
        chunk_index: 0,
        chunk_count: 1,
        content_hash: content_hash(text),
        created_at: now,
        updated_at: now,
        sequence: 0,
    }
}

fn uuid_like(text: &str, project: &str, document: &str) -> String {
    content_hash(&format!("{}|{}|{}", project, document, text))[..32].to_string()
}

#[tokio::test]
async fn test_insert_and_get_round_trip() {
    let store = memory_store().await;
    let f = fragment("p1", "database", "a.txt", "index tuning", vec![0.5, -0.25, 1.0]);

    let stored = store.insert_batch(vec![f.clone()]).await.unwrap();
    assert_eq!(stored[0].sequence, 1);

    let loaded = store.get(&f.id).await.unwrap().unwrap();
    assert_eq!(loaded.text, "index tuning");
    assert_eq!(loaded.vector, vec![0.5, -0.25, 1.0]);
    assert_eq!(loaded.notable_snippets, vec!["a finding".to_string()]);
    assert_eq!(loaded.sequence, 1);
    assert_eq!(
        loaded.created_at.timestamp_millis(),
        f.created_at.timestamp_millis()
    );

    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dimension_is_enforced_atomically() {
    let store = memory_store().await;
    store
        .insert_batch(vec![fragment("p1", "m", "a.txt", "one", vec![1.0, 0.0])])
        .await
        .unwrap();

    let err = store
        .insert_batch(vec![
            fragment("p1", "m", "b.txt", "two", vec![1.0, 0.0]),
            fragment("p1", "m", "c.txt", "three", vec![1.0, 0.0, 0.0]),
        ])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::DimensionMismatch { expected: 2, found: 3, .. })
    ));
    // Nothing from the rejected batch was stored.
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.generation().await.unwrap().dimension, Some(2));
}

#[tokio::test]
async fn test_scan_filters_by_project_and_module() {
    let store = memory_store().await;
    store
        .insert_batch(vec![
            fragment("p1", "database", "a.txt", "one", vec![1.0, 0.0]),
            fragment("p1", "marketing", "b.txt", "two", vec![0.0, 1.0]),
            fragment("p2", "database", "c.txt", "three", vec![1.0, 1.0]),
        ])
        .await
        .unwrap();

    let all: Vec<_> = store
        .scan(&FragmentFilter::default())
        .await
        .unwrap()
        .collect();
    assert_eq!(all.len(), 3);

    let filtered: Vec<_> = store
        .scan(&FragmentFilter::project("p1").with_module("database"))
        .await
        .unwrap()
        .map(|item| item.unwrap().text.clone())
        .collect();
    assert_eq!(filtered, vec!["one".to_string()]);

    let empty_tags = FragmentFilter {
        project_id: None,
        module_tags: Some(Default::default()),
    };
    assert_eq!(store.scan(&empty_tags).await.unwrap().count(), 0);

    assert_eq!(store.count_by_project().await.unwrap()["p1"], 2);
    assert_eq!(store.count_by_module().await.unwrap()["database"], 2);
}

#[tokio::test]
async fn test_delete_only_removes_document_in_project() {
    let store = memory_store().await;
    store
        .insert_batch(vec![
            fragment("p1", "m", "shared.txt", "one", vec![1.0, 0.0]),
            fragment("p1", "m", "shared.txt", "two", vec![1.0, 0.0]),
            fragment("p2", "m", "shared.txt", "three", vec![1.0, 0.0]),
            fragment("p1", "m", "other.txt", "four", vec![1.0, 0.0]),
        ])
        .await
        .unwrap();

    assert!(store.delete_by_document("shared.txt", "p1").await.unwrap());
    assert!(!store.delete_by_document("shared.txt", "p1").await.unwrap());
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(store.count_by_project().await.unwrap()["p2"], 1);
}

#[tokio::test]
async fn test_replace_document_is_atomic() {
    let store = memory_store().await;
    let old = fragment("p1", "m", "a.txt", "old", vec![1.0, 0.0]);
    let other = fragment("p2", "m", "a.txt", "other", vec![0.0, 1.0]);
    store
        .insert_batch(vec![old.clone(), other.clone()])
        .await
        .unwrap();

    let err = store
        .replace_document("a.txt", "p1", vec![fragment("p1", "m", "a.txt", "wide", vec![1.0, 0.0, 0.0])])
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::DimensionMismatch { expected: 2, found: 3, .. })
    ));
    assert!(store.get(&old.id).await.unwrap().is_some());
    assert_eq!(store.count().await.unwrap(), 2);

    let stored = store
        .replace_document("a.txt", "p1", vec![fragment("p1", "m", "a.txt", "new", vec![0.5, 0.5])])
        .await
        .unwrap();
    assert_eq!(stored[0].sequence, 3);
    assert!(store.get(&old.id).await.unwrap().is_none());
    assert!(store.get(&other.id).await.unwrap().is_some());
    assert_eq!(store.get(&stored[0].id).await.unwrap().unwrap().text, "new");
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_snippets() {
    let store = memory_store().await;
    let f = fragment("p1", "m", "a.txt", "one", vec![1.0]);
    store.insert_batch(vec![f.clone()]).await.unwrap();

    assert!(store
        .update_snippets(&f.id, vec!["new".to_string()])
        .await
        .unwrap());
    assert!(!store.update_snippets("missing", vec![]).await.unwrap());

    let loaded = store.get(&f.id).await.unwrap().unwrap();
    assert_eq!(loaded.notable_snippets, vec!["new".to_string()]);
    assert!(loaded.updated_at >= f.updated_at);
}

#[tokio::test]
async fn test_publish_rejects_stale_snapshot() {
    let store = memory_store().await;
    store
        .insert_batch(vec![fragment("p1", "m", "a.txt", "one", vec![1.0, 0.0])])
        .await
        .unwrap();

    let snapshot = store.generation().await.unwrap();
    store
        .insert_batch(vec![fragment("p1", "m", "b.txt", "two", vec![0.0, 1.0])])
        .await
        .unwrap();

    let replacement = vec![fragment("p1", "m", "a.txt", "one", vec![1.0, 0.0, 0.0])];
    assert!(!store.publish_generation(&snapshot, replacement).await.unwrap());
    assert_eq!(store.generation().await.unwrap().number, snapshot.number);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_publish_swaps_generation_and_dimension() {
    let store = memory_store().await;
    let f = fragment("p1", "m", "a.txt", "one", vec![1.0, 0.0]);
    store.insert_batch(vec![f.clone()]).await.unwrap();

    let snapshot = store.generation().await.unwrap();
    assert!(snapshot.last_rebuild_at.is_none());

    let mut rebuilt = f.clone();
    rebuilt.vector = vec![0.0, 0.0, 1.0];
    assert!(store.publish_generation(&snapshot, vec![rebuilt]).await.unwrap());

    let info = store.generation().await.unwrap();
    assert_eq!(info.number, snapshot.number + 1);
    assert_eq!(info.dimension, Some(3));
    assert!(info.last_rebuild_at.is_some());
    assert_eq!(store.get(&f.id).await.unwrap().unwrap().vector, vec![0.0, 0.0, 1.0]);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_corrupt_vector_surfaces_decode_error() {
    let pool = memory_pool().await;
    let store = SqliteStore::new(pool.clone());
    let good = fragment("p1", "m", "a.txt", "good", vec![1.0, 0.0]);
    let bad = fragment("p1", "m", "b.txt", "bad", vec![0.0, 1.0]);
    store
        .insert_batch(vec![good.clone(), bad.clone()])
        .await
        .unwrap();

    sqlx::query("UPDATE fragments SET embedding = X'010203' WHERE id = ?")
        .bind(&bad.id)
        .execute(&pool)
        .await
        .unwrap();

    let items: Vec<_> = store.scan(&FragmentFilter::default()).await.unwrap().collect();
    let errors: Vec<_> = items.iter().filter_map(|i| i.as_ref().err()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].fragment_id, bad.id);

    let err = store.get(&bad.id).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Decode(_))));

    // Ranking skips the corrupt fragment instead of failing.
    let outcome = search::find_similar_to(&store, &good.id, 5, -1.0).await;
    assert!(outcome.error.is_none());
    assert!(outcome.items.is_empty());
}

#[tokio::test]
async fn test_ingest_search_and_rebuild_end_to_end() {
    let store = memory_store().await;
    let embedder = HashingEmbedder::new(64);
    let input = DocumentInput {
        text: "Key findings: the orders table lacks an index. Query latency doubled under load."
            .to_string(),
        source_document: "audit.txt".to_string(),
        source_media_type: "text/plain".to_string(),
        project_id: "acme".to_string(),
        module_tag: "database".to_string(),
    };

    let report = process_document(&store, &embedder, &input, &Default::default())
        .await
        .unwrap();
    assert_eq!(report.failed, 0);
    assert!(!report.fragments.is_empty());

    let request = SearchRequest {
        project_id: Some("acme".to_string()),
        similarity_threshold: 0.1,
        ..SearchRequest::new("orders table index query latency")
    };
    let outcome = search::search(&store, &embedder, &request).await;
    assert!(outcome.error.is_none());
    assert_eq!(outcome.items[0].fragment.source_document, "audit.txt");

    let rebuild = maintenance::rebuild(&store, &HashingEmbedder::new(32), 16)
        .await
        .unwrap();
    assert_eq!(rebuild.fragments, report.fragments.len());
    assert_eq!(rebuild.dimension, Some(32));

    let stats = maintenance::stats(&store).await.unwrap();
    assert_eq!(stats.embedding_dimension, Some(32));
    assert_eq!(stats.generation, rebuild.generation);
    assert!(stats.last_rebuild_at.is_some());
}
