//! TOML configuration.
//!
//! Every section except `[knowledge]` is optional and defaults to the
//! pipeline's reference constants (0.6 similarity threshold, 250/1500
//! chunk bounds, dense k=5 / sparse k=10, 0.7/0.3 fusion weights, top 4
//! reranked chunks into the answer context).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sitesage_core::category::{CategoryRule, CategoryRules};
use sitesage_core::chunk::{ChunkingParams, MAX_CHARS, MIN_CHUNK_CHARS, SIMILARITY_THRESHOLD};
use sitesage_core::retrieve::{
    RetrievalParams, DENSE_K, DENSE_WEIGHT, RANK_CONSTANT, SPARSE_K, SPARSE_WEIGHT,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub assistant: AssistantConfig,
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub rerank: ModelConfig,
    #[serde(default)]
    pub generation: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Replaces the built-in URL category table when non-empty.
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

impl Config {
    pub fn category_rules(&self) -> CategoryRules {
        if self.categories.is_empty() {
            CategoryRules::default()
        } else {
            CategoryRules::new(self.categories.clone())
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_company_name")]
    pub company_name: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            company_name: default_company_name(),
        }
    }
}

fn default_company_name() -> String {
    "our company".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Knowledge file: written by `sage build`, loaded at startup.
    pub path: PathBuf,
    /// Extracted pages consumed by `sage build`.
    #[serde(default)]
    pub pages_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_chunk_chars: default_min_chunk_chars(),
            max_chars: default_max_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            similarity_threshold: self.similarity_threshold,
            min_chunk_chars: self.min_chunk_chars,
            max_chars: self.max_chars,
        }
    }
}

fn default_similarity_threshold() -> f32 {
    SIMILARITY_THRESHOLD
}
fn default_min_chunk_chars() -> usize {
    MIN_CHUNK_CHARS
}
fn default_max_chars() -> usize {
    MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_dense_k")]
    pub dense_k: usize,
    #[serde(default = "default_sparse_k")]
    pub sparse_k: usize,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
    #[serde(default = "default_rank_constant")]
    pub rank_constant: f64,
    /// Reranked candidates passed into the answer context.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_k: default_dense_k(),
            sparse_k: default_sparse_k(),
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            rank_constant: default_rank_constant(),
            context_limit: default_context_limit(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            dense_k: self.dense_k,
            sparse_k: self.sparse_k,
            dense_weight: self.dense_weight,
            sparse_weight: self.sparse_weight,
            rank_constant: self.rank_constant,
        }
    }
}

fn default_dense_k() -> usize {
    DENSE_K
}
fn default_sparse_k() -> usize {
    SPARSE_K
}
fn default_dense_weight() -> f64 {
    DENSE_WEIGHT
}
fn default_sparse_weight() -> f64 {
    SPARSE_WEIGHT
}
fn default_rank_constant() -> f64 {
    RANK_CONSTANT
}
fn default_context_limit() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Per-call timeout for `[rerank]` when the section leaves it unset.
pub const RERANK_TIMEOUT_SECS: u64 = 20;
/// Per-call timeout for `[generation]` when the section leaves it unset.
pub const GENERATION_TIMEOUT_SECS: u64 = 45;

/// A chat model used for reranking or answer generation.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `openai` (any OpenAI-compatible endpoint) or `ollama`.
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Base URL. Defaults to `https://api.openai.com/v1` for `openai`
    /// and `http://localhost:11434` for `ollama`.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    /// Filled with the stage default by [`parse_config`] when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retries for 429/5xx/network errors, within `timeout_secs`.
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
}

fn default_chat_provider() -> String {
    "openai".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_retries() -> u32 {
    2
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            model: default_chat_model(),
            url: None,
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            timeout_secs: None,
            max_retries: default_chat_retries(),
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(GENERATION_TIMEOUT_SECS))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.rerank.timeout_secs.get_or_insert(RERANK_TIMEOUT_SECS);
    config.generation.timeout_secs.get_or_insert(GENERATION_TIMEOUT_SECS);

    // Validate chunking
    let chunking = &config.chunking;
    if chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if chunking.min_chunk_chars > chunking.max_chars {
        bail!("chunking.min_chunk_chars must be <= chunking.max_chars");
    }
    if !(-1.0..=1.0).contains(&chunking.similarity_threshold) {
        bail!("chunking.similarity_threshold must be in [-1.0, 1.0]");
    }

    // Validate retrieval
    let retrieval = &config.retrieval;
    if retrieval.dense_k == 0 || retrieval.sparse_k == 0 {
        bail!("retrieval.dense_k and retrieval.sparse_k must be >= 1");
    }
    if retrieval.context_limit == 0 {
        bail!("retrieval.context_limit must be >= 1");
    }
    if retrieval.dense_weight < 0.0 || retrieval.sparse_weight < 0.0 {
        bail!("retrieval weights must be non-negative");
    }
    if retrieval.dense_weight + retrieval.sparse_weight <= 0.0 {
        bail!("retrieval.dense_weight and retrieval.sparse_weight cannot both be 0");
    }
    if retrieval.rank_constant < 0.0 {
        bail!("retrieval.rank_constant must be >= 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.timeout_secs == 0 {
        bail!("embedding.timeout_secs must be > 0");
    }

    // Validate chat models
    for (section, model) in [("rerank", &config.rerank), ("generation", &config.generation)] {
        match model.provider.as_str() {
            "openai" | "ollama" => {}
            other => bail!(
                "Unknown {} provider: '{}'. Must be openai or ollama.",
                section,
                other
            ),
        }
        if model.model.trim().is_empty() {
            bail!("{}.model must not be empty", section);
        }
        if model.timeout_secs == Some(0) {
            bail!("{}.timeout_secs must be > 0", section);
        }
    }

    Ok(config)
}
