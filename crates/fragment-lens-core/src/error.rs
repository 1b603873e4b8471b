//! Error taxonomy for the indexing and retrieval engine.
//!
//! Store and application plumbing uses `anyhow`; the typed errors below
//! are wrapped into `anyhow::Error` at the store boundary and can be
//! recovered with `downcast_ref` when a caller needs to branch on them.

use thiserror::Error;

/// The upstream embedding call failed.
///
/// Indexing skips the offending fragment; retrieval returns no results and
/// hands the message back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("embedding failed: {message}")]
pub struct EmbeddingError {
    pub message: String,
}

impl EmbeddingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Two vectors of unequal length were compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimilarityError {
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// A stored vector could not be reconstituted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode stored vector for fragment {fragment_id}: {reason}")]
pub struct DecodeError {
    pub fragment_id: String,
    pub reason: String,
}

/// Errors raised by fragment index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A batch tried to mix embedding dimensions within one index generation.
    #[error("index dimension is {expected}, fragment {fragment_id} has {found}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
        fragment_id: String,
    },
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("fragment not found: {0}")]
    NotFound(String),
}
