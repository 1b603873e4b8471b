//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the engine
//! defaults. [`load_config`] parses and validates in one step.
//!
//! ```toml
//! [db]
//! path = "./data/flens.sqlite"
//!
//! [chunking]
//! max_chunk_size = 2000
//! overlap_size = 200
//!
//! [retrieval]
//! top_k = 5
//! similarity_threshold = 0.7
//!
//! [insights]
//! seed_limit = 3
//! top_k = 5
//! similarity_threshold = 0.8
//! max_insights = 3
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use fragment_lens_core::chunk::{ChunkingParams, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_OVERLAP_SIZE};
use fragment_lens_core::insight::{
    InsightParams, DEFAULT_INSIGHT_THRESHOLD, DEFAULT_INSIGHT_TOP_K, DEFAULT_MAX_INSIGHTS,
    DEFAULT_SEED_LIMIT,
};
use fragment_lens_core::search::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub insights: InsightsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            max_chunk_size: self.max_chunk_size,
            overlap_size: self.overlap_size,
        }
    }
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}
fn default_overlap_size() -> usize {
    DEFAULT_OVERLAP_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct InsightsConfig {
    #[serde(default = "default_seed_limit")]
    pub seed_limit: usize,
    #[serde(default = "default_insight_top_k")]
    pub top_k: usize,
    #[serde(default = "default_insight_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            seed_limit: DEFAULT_SEED_LIMIT,
            top_k: DEFAULT_INSIGHT_TOP_K,
            similarity_threshold: DEFAULT_INSIGHT_THRESHOLD,
            max_insights: DEFAULT_MAX_INSIGHTS,
        }
    }
}

impl InsightsConfig {
    pub fn params(&self) -> InsightParams {
        InsightParams {
            seed_limit: self.seed_limit,
            top_k: self.top_k,
            similarity_threshold: self.similarity_threshold,
            max_insights: self.max_insights,
        }
    }
}

fn default_seed_limit() -> usize {
    DEFAULT_SEED_LIMIT
}
fn default_insight_top_k() -> usize {
    DEFAULT_INSIGHT_TOP_K
}
fn default_insight_threshold() -> f64 {
    DEFAULT_INSIGHT_THRESHOLD
}
fn default_max_insights() -> usize {
    DEFAULT_MAX_INSIGHTS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.max_chunk_size == 0 {
        bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap_size >= config.chunking.max_chunk_size {
        bail!("chunking.overlap_size must be < chunking.max_chunk_size");
    }

    // Retrieval and insights
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        bail!("retrieval.similarity_threshold must be in [-1.0, 1.0]");
    }
    if config.insights.top_k < 1 {
        bail!("insights.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.insights.similarity_threshold) {
        bail!("insights.similarity_threshold must be in [-1.0, 1.0]");
    }

    // Embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }

    if embedding.is_enabled() && embedding.provider != "local" && embedding.dims.unwrap_or(0) == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            embedding.provider
        );
    }
    if matches!(embedding.provider.as_str(), "openai" | "ollama") && embedding.model.is_none() {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            embedding.provider
        );
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}
