//! # fragment-lens core
//!
//! Shared, runtime-agnostic logic for fragment-lens: sentence-aligned
//! chunking, the embedder trait, cosine similarity, the fragment store
//! abstraction, ranked retrieval and cross-project insight mining.
//!
//! This crate contains no tokio, sqlx, network or filesystem code. Storage
//! and embedding backends are injected through the [`store::FragmentStore`]
//! and [`embedding::Embedder`] traits.
//!
//! ## Data flow
//!
//! ```text
//! raw text ─▶ chunk ─▶ Embedder ─▶ FragmentStore      (write path, ingest)
//! query    ─▶ Embedder ─▶ scan ─▶ score ─▶ rank       (read path, search)
//! project fragments ─▶ find_similar_to ─▶ Insight     (insight)
//! ```

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod findings;
pub mod ingest;
pub mod insight;
pub mod maintenance;
pub mod models;
pub mod search;
pub mod similarity;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
