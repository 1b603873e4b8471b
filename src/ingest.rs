//! Document ingestion.
//!
//! Reads a UTF-8 file, or every text file under a directory, and runs each
//! one through [`process_document`]: chunk, embed, extract findings, store.
//! With `--replace` each file goes through [`replace_document`] instead,
//! which swaps out the document's previous fragments in one write.
//!
//! Directory walks pick up files with a known text extension
//! ([`TEXT_EXTENSIONS`]); a file named explicitly is always read. Non-UTF-8
//! files are skipped with a warning.

use anyhow::{bail, Context, Result};
use fragment_lens_core::chunk::ChunkingParams;
use fragment_lens_core::embedding::Embedder;
use fragment_lens_core::ingest::{process_document, replace_document, DocumentInput};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Extensions picked up when ingesting a directory.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "text", "csv", "log"];

/// Options for `flens ingest`.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub project_id: String,
    pub module_tag: String,
    /// Overrides the media type guessed from the extension.
    pub media_type: Option<String>,
    /// Swap out existing fragments of the same document.
    pub replace: bool,
}

pub async fn run_ingest(config: &Config, path: &Path, opts: &IngestOptions) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let files = collect_files(path)?;
    if files.is_empty() {
        println!("ingest {}", path.display());
        println!("  no text files found");
        return Ok(());
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = SqliteStore::open(config).await?;
    let params = config.chunking.params();

    let result = ingest_files(&store, embedder.as_ref(), &files, opts, &params).await;
    store.close().await;
    let totals = result?;

    println!("ingest {}", path.display());
    println!("  documents: {}", totals.documents);
    println!("  chunks: {}", totals.chunks);
    println!("  fragments stored: {}", totals.stored);
    if totals.failed > 0 {
        println!("  embeddings failed: {}", totals.failed);
    }
    if totals.skipped > 0 {
        println!("  files skipped: {}", totals.skipped);
    }
    println!("ok");
    Ok(())
}

#[derive(Debug, Default)]
struct IngestTotals {
    documents: usize,
    chunks: usize,
    stored: usize,
    failed: usize,
    skipped: usize,
}

async fn ingest_files(
    store: &SqliteStore,
    embedder: &dyn Embedder,
    files: &[(PathBuf, String)],
    opts: &IngestOptions,
    params: &ChunkingParams,
) -> Result<IngestTotals> {
    let mut totals = IngestTotals::default();

    for (file, name) in files {
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!(path = %file.display(), "skipping non-UTF-8 file");
                totals.skipped += 1;
                continue;
            }
        };

        let input = DocumentInput {
            text,
            source_document: name.clone(),
            source_media_type: opts
                .media_type
                .clone()
                .unwrap_or_else(|| guess_media_type(file).to_string()),
            project_id: opts.project_id.clone(),
            module_tag: opts.module_tag.clone(),
        };

        let report = if opts.replace {
            replace_document(store, embedder, &input, params).await
        } else {
            process_document(store, embedder, &input, params).await
        }
        .with_context(|| format!("Failed to ingest {}", name))?;
        info!(
            document = %name,
            chunks = report.chunks,
            stored = report.fragments.len(),
            failed = report.failed,
            "document ingested"
        );

        totals.documents += 1;
        totals.chunks += report.chunks;
        totals.stored += report.fragments.len();
        totals.failed += report.failed;
    }

    Ok(totals)
}

/// Resolve `path` into `(file, document name)` pairs.
///
/// A single file is named by its file name; files under a directory by
/// their path relative to it, with `/` separators.
fn collect_files(path: &Path) -> Result<Vec<(PathBuf, String)>> {
    if path.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        return Ok(vec![(path.to_path_buf(), name)]);
    }
    if !path.is_dir() {
        bail!("No such file or directory: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_text_extension(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(path)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.path().to_path_buf(), relative));
    }
    Ok(files)
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn has_text_extension(path: &Path) -> bool {
    extension(path).is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.as_str()))
}

fn guess_media_type(path: &Path) -> &'static str {
    match extension(path).as_deref() {
        Some("md") | Some("markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("rst") => "text/x-rst",
        _ => "text/plain",
    }
}
