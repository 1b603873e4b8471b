//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::embedding::Embedder;
use crate::error::EmbeddingError;
use crate::models::Fragment;

pub fn fragment(project: &str, module: &str, text: &str, vector: Vec<f32>) -> Fragment {
    let now = Utc::now();
    Fragment {
        id: uuid::Uuid::new_v4().to_string(),
        source_document: "doc.txt".to_string(),
        source_media_type: "text/plain".to_string(),
        text: text.to_string(),
        vector,
        project_id: project.to_string(),
        module_tag: module.to_string(),
        notable_snippets: Vec::new(),
        chunk_index: 0,
        chunk_count: 1,
        content_hash: format!("{:x}", Sha256::digest(text.as_bytes())),
        created_at: now,
        updated_at: now,
        sequence: 0,
    }
}

const CONCEPTS: [&[&str]; 4] = [
    &["database", "indexing", "index", "query", "performance", "storage"],
    &["marketing", "branding", "brand", "copy", "campaign"],
    &["security", "password", "encryption", "access"],
    &["architecture", "layered", "service", "module"],
];

/// Embedder that counts concept words per axis, so texts about the same
/// topic point the same way. Unknown words are ignored.
pub struct ConceptEmbedder {
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl ConceptEmbedder {
    pub fn new() -> Self {
        Self {
            fail_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every text containing `marker`.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ConceptEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for ConceptEmbedder {
    fn model_name(&self) -> &str {
        "concepts"
    }

    fn dims(&self) -> usize {
        CONCEPTS.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref marker) = self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::new(format!("refused text containing {marker}")));
            }
        }

        let mut vector = vec![0.0f32; CONCEPTS.len()];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            for (axis, words) in CONCEPTS.iter().enumerate() {
                if words.contains(&word.as_str()) {
                    vector[axis] += 1.0;
                }
            }
        }
        Ok(vector)
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        CONCEPTS.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::new("provider unavailable"))
    }
}
