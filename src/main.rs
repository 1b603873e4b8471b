//! # Fragment Lens CLI (`flens`)
//!
//! Commands for initializing the index, ingesting documents, semantic
//! search, cross-project insights, context augmentation and embedding
//! maintenance.
//!
//! ## Usage
//!
//! ```bash
//! flens --config ./config/flens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `flens init` | Create the SQLite database and schema |
//! | `flens ingest <path>` | Chunk, embed and store a file or directory |
//! | `flens search "<query>"` | Rank fragments by similarity to a query |
//! | `flens similar <id>` | Rank fragments by similarity to a stored fragment |
//! | `flens insights` | Find related fragments in other projects |
//! | `flens augment "<request>"` | Append relevant context to a request |
//! | `flens get <id>` | Print one fragment |
//! | `flens delete <document>` | Remove a document's fragments |
//! | `flens stats` | Index statistics |
//! | `flens embed rebuild` | Re-embed everything into a new generation |
//! | `flens embed test "<text>"` | Provider smoke test |
//! | `flens snippets refresh` | Re-extract notable findings |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fragment_lens::ingest::IngestOptions;
use fragment_lens::search::SearchOptions;
use fragment_lens::{
    augment, config, embed_cmd, get, ingest, insights, migrate, search, snippets, stats,
};

/// Fragment Lens — semantic indexing and retrieval for assessment documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/flens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "flens",
    about = "Fragment Lens — semantic indexing and retrieval for assessment documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/flens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Ingest a text file, or every text file under a directory.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Project that owns the document.
        #[arg(long)]
        project: String,

        /// Module tag for the document's fragments.
        #[arg(long)]
        module: String,

        /// Media type to record instead of guessing from the extension.
        #[arg(long)]
        media_type: Option<String>,

        /// Delete the document's existing fragments first.
        #[arg(long)]
        replace: bool,
    },

    /// Search fragments by meaning.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to one project.
        #[arg(long)]
        project: Option<String>,

        /// Restrict to these module tags (repeatable).
        #[arg(long = "module")]
        modules: Vec<String>,

        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity.
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Find fragments similar to a stored fragment.
    Similar {
        /// Fragment UUID.
        id: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Find related fragments in other projects.
    Insights {
        #[arg(long)]
        project: String,

        #[arg(long)]
        module: String,

        /// Maximum number of insights.
        #[arg(long)]
        max: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Append relevant same-project context to an analysis request.
    Augment {
        request: String,

        #[arg(long)]
        project: String,

        #[arg(long)]
        module: String,
    },

    /// Print one fragment by UUID.
    Get { id: String },

    /// Delete every fragment of a document within a project.
    Delete {
        /// Document name as recorded at ingest.
        document: String,

        #[arg(long)]
        project: String,
    },

    /// Show index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Manage notable findings.
    Snippets {
        #[command(subcommand)]
        action: SnippetsAction,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Re-embed every fragment into a new generation.
    ///
    /// Useful when switching embedding models or dimensions. Searches keep
    /// using the old vectors until the new generation is published.
    Rebuild {
        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Embed one text and report dimension, token estimate and latency.
    Test { text: String },
}

#[derive(Subcommand)]
enum SnippetsAction {
    /// Re-run the finding extractor over stored fragments.
    Refresh {
        /// Only refresh this project.
        #[arg(long)]
        project: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            project,
            module,
            media_type,
            replace,
        } => {
            let opts = IngestOptions {
                project_id: project,
                module_tag: module,
                media_type,
                replace,
            };
            ingest::run_ingest(&cfg, &path, &opts).await?;
        }
        Commands::Search {
            query,
            project,
            modules,
            top_k,
            threshold,
            json,
        } => {
            let opts = SearchOptions {
                project_id: project,
                module_tags: modules,
                top_k,
                threshold,
                json,
            };
            search::run_search(&cfg, &query, &opts).await?;
        }
        Commands::Similar {
            id,
            top_k,
            threshold,
            json,
        } => {
            search::run_similar(&cfg, &id, top_k, threshold, json).await?;
        }
        Commands::Insights {
            project,
            module,
            max,
            json,
        } => {
            insights::run_insights(&cfg, &project, &module, max, json).await?;
        }
        Commands::Augment {
            request,
            project,
            module,
        } => {
            augment::run_augment(&cfg, &request, &project, &module).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Delete { document, project } => {
            get::run_delete(&cfg, &document, &project).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
            EmbedAction::Test { text } => {
                embed_cmd::run_embed_test(&cfg, &text).await?;
            }
        },
        Commands::Snippets { action } => match action {
            SnippetsAction::Refresh { project } => {
                snippets::run_snippets_refresh(&cfg, project.as_deref()).await?;
            }
        },
    }

    Ok(())
}
