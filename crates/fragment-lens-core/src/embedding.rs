//! Embedder trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! the deterministic [`HashingEmbedder`], and the BLOB codec used to persist
//! vectors.
//!
//! Network-backed providers (OpenAI, Ollama, local fastembed) live in the
//! `fragment-lens` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::EmbeddingError;

/// Trait for embedding providers.
///
/// An implementation must return vectors of one fixed dimension ([`dims`])
/// and must be deterministic for identical input while one index generation
/// is live. Retry policy, if any, belongs to the implementation.
///
/// [`dims`]: Embedder::dims
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts, one result per input, in input order.
    ///
    /// The default calls [`embed`](Embedder::embed) sequentially. Providers
    /// with a batch endpoint override this but must keep failures per item.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbeddingError>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        out
    }
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed (SHA-256) into `dims` signed
/// buckets and the result is L2-normalised. Texts sharing vocabulary land
/// close together, which is enough for offline use and tests. Text without
/// any token maps to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            model: format!("hashing-{}", dims),
        }
    }

    /// Compute the vector synchronously.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return vec;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dims;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vec.iter_mut() {
                *x /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.dims == 0 {
            return Err(EmbeddingError::new("hashing embedder configured with 0 dims"));
        }
        Ok(self.vectorize(text))
    }
}

/// Rough token estimate: 4 chars ≈ 1 token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use fragment_lens_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), Some(v));
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Returns `None` for an empty BLOB, a length that is not a multiple of 4,
/// or any non-finite component.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }
    let vec: Vec<f32> = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if vec.iter().all(|v| v.is_finite()) {
        Some(vec)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn test_blob_decode_rejects_truncated() {
        let mut blob = vec_to_blob(&[1.0, 2.0]);
        blob.pop();
        assert_eq!(blob_to_vec(&blob), None);
        assert_eq!(blob_to_vec(&[]), None);
    }

    #[test]
    fn test_blob_decode_rejects_nan() {
        let blob = vec_to_blob(&[1.0, f32::NAN]);
        assert_eq!(blob_to_vec(&blob), None);
    }

    #[test]
    fn test_hashing_deterministic() {
        let e = HashingEmbedder::new(64);
        assert_eq!(e.vectorize("Database indexing"), e.vectorize("database  INDEXING!"));
    }

    #[test]
    fn test_hashing_normalized() {
        let e = HashingEmbedder::new(128);
        let v = e.vectorize("query performance tuning for large tables");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_empty_is_zero() {
        let e = HashingEmbedder::new(16);
        assert!(e.vectorize("  ... ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_shared_vocabulary_is_closer() {
        let e = HashingEmbedder::new(512);
        let q = e.vectorize("indexing performance");
        let near = e.vectorize("Our database uses heavy indexing for performance");
        let far = e.vectorize("Unrelated marketing copy about branding");
        let s_near = cosine_similarity(&q, &near).unwrap();
        let s_far = cosine_similarity(&q, &far).unwrap();
        assert!(s_near > s_far, "near={} far={}", s_near, s_far);
    }

    #[tokio::test]
    async fn test_zero_dims_fails() {
        let e = HashingEmbedder::new(0);
        assert!(e.embed("text").await.is_err());
    }

    #[tokio::test]
    async fn test_default_batch_keeps_order() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let out = e.embed_batch(&texts).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &e.vectorize("alpha"));
        assert_eq!(out[1].as_ref().unwrap(), &e.vectorize("beta"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
