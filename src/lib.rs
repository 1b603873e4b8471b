//! # Fragment Lens
//!
//! A local-first semantic indexing and retrieval engine for assessment
//! documents.
//!
//! Uploaded text documents are split into overlapping sentence-aligned
//! chunks, embedded, and stored as fragments tagged with a project and a
//! module. Fragments can then be searched by meaning, compared with each
//! other, and mined for patterns shared across projects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Documents  │──▶│   Pipeline   │──▶│    SQLite     │
//! │ .txt / .md  │   │ Chunk+Embed  │   │ generations   │
//! └─────────────┘   │ +Findings    │   └──────┬───────┘
//!                   └──────────────┘          │
//!                    ┌────────────────────────┤
//!                    ▼                        ▼
//!             ┌─────────────┐          ┌─────────────┐
//!             │   Search    │          │  Insights   │
//!             │  (flens)    │          │  (flens)    │
//!             └─────────────┘          └─────────────┘
//! ```
//!
//! The algorithms live in `fragment_lens_core`; this crate supplies the
//! SQLite store, the embedding providers, configuration and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! flens init
//! flens ingest ./reports --project acme --module database
//! flens search "index tuning" --project acme
//! flens insights --project acme --module database
//! flens embed rebuild
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | `FragmentStore` over SQLite |
//! | [`embedding`] | Embedding providers |
//! | [`ingest`] | File and directory ingestion |
//! | [`search`] | Semantic search and similar fragments |
//! | [`insights`] | Cross-project insights |
//! | [`augment`] | Context augmentation |
//! | [`get`] | Fragment lookup and document deletion |
//! | [`stats`] | Index statistics |
//! | [`embed_cmd`] | Rebuild and provider smoke test |
//! | [`snippets`] | Finding re-extraction |

pub mod augment;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod insights;
pub mod migrate;
pub mod search;
pub mod snippets;
pub mod sqlite_store;
pub mod stats;
