//! Configuration for the evaluation pipeline.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{RagBenchError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// URL of the embedding endpoint (e.g., "https://embed.example.com/embed")
    pub api_url: String,

    /// API key for authentication
    pub api_key: String,

    /// How many texts to send per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Task hint forwarded with every request; empty string omits it
    #[serde(default = "default_task_description")]
    pub task_description: String,

    /// Ask the service for unit-length vectors
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_batch_size() -> usize {
    32
}

fn default_task_description() -> String {
    "檢索技術文件".to_string()
}

fn default_normalize() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            batch_size: default_batch_size(),
            task_description: default_task_description(),
            normalize: default_normalize(),
        }
    }
}

/// Qdrant connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// gRPC URL of the Qdrant instance
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Prefix for the collections the benchmark creates
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection_prefix() -> String {
    "rag_bench".to_string()
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection_prefix: default_collection_prefix(),
        }
    }
}

/// Remote scoring service configuration. Scoring is optional: with an
/// empty URL the evaluation runs retrieval-only and leaves the score
/// column blank.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoringConfig {
    /// URL of the scoring endpoint
    #[serde(default)]
    pub api_url: String,

    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
}

impl ScoringConfig {
    /// Whether answers should be submitted for scoring.
    pub fn enabled(&self) -> bool {
        !self.api_url.is_empty()
    }
}

/// LLM configuration, used by the chat command for query rewriting and
/// answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: default_temperature(),
        }
    }
}

/// Chunking parameters shared by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Span length for the fixed-size policy, in characters
    #[serde(default = "default_fixed_size")]
    pub fixed_size: usize,

    /// Window length for the sliding-window policy, in characters
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Overlap between consecutive windows, in characters
    #[serde(default = "default_window_overlap")]
    pub window_overlap: usize,

    /// Upper bound for semantic chunks, in characters
    #[serde(default = "default_semantic_max_len")]
    pub semantic_max_len: usize,
}

fn default_fixed_size() -> usize {
    500
}

fn default_window_size() -> usize {
    400
}

fn default_window_overlap() -> usize {
    100
}

fn default_semantic_max_len() -> usize {
    550
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            fixed_size: default_fixed_size(),
            window_size: default_window_size(),
            window_overlap: default_window_overlap(),
            semantic_max_len: default_semantic_max_len(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding service settings
    pub embedding: EmbeddingConfig,

    /// Qdrant settings
    pub qdrant: QdrantConfig,

    /// Scoring service settings
    pub scoring: ScoringConfig,

    /// LLM settings
    pub llm: LlmConfig,

    /// Chunking parameters
    pub chunking: ChunkingConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    embedding: Option<EmbeddingFileSection>,
    qdrant: Option<QdrantFileSection>,
    scoring: Option<ScoringFileSection>,
    llm: Option<LlmFileSection>,
    chunking: Option<ChunkingFileSection>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    api_url: Option<String>,
    api_key: Option<String>,
    batch_size: Option<usize>,
    task_description: Option<String>,
    normalize: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct QdrantFileSection {
    url: Option<String>,
    collection_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScoringFileSection {
    api_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChunkingFileSection {
    fixed_size: Option<usize>,
    window_size: Option<usize>,
    window_overlap: Option<usize>,
    semantic_max_len: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (RAG_BENCH_*)
    /// 2. Config file (~/.config/rag-bench/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file first
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        // Override with environment variables
        if let Ok(api_url) = env::var("RAG_BENCH_EMBEDDING_URL") {
            config.embedding.api_url = api_url;
        }

        if let Ok(api_key) = env::var("RAG_BENCH_EMBEDDING_API_KEY") {
            config.embedding.api_key = api_key;
        }

        if let Ok(batch_size) = env::var("RAG_BENCH_EMBEDDING_BATCH_SIZE") {
            if let Ok(size) = batch_size.parse() {
                config.embedding.batch_size = size;
            }
        }

        if let Ok(url) = env::var("RAG_BENCH_QDRANT_URL") {
            config.qdrant.url = url;
        }

        if let Ok(prefix) = env::var("RAG_BENCH_COLLECTION_PREFIX") {
            config.qdrant.collection_prefix = prefix;
        }

        if let Ok(api_url) = env::var("RAG_BENCH_SCORING_URL") {
            config.scoring.api_url = api_url;
        }

        if let Ok(api_key) = env::var("RAG_BENCH_SCORING_API_KEY") {
            config.scoring.api_key = api_key;
        }

        if let Ok(api_base) = env::var("RAG_BENCH_LLM_API_BASE") {
            config.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("RAG_BENCH_LLM_API_KEY") {
            config.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("RAG_BENCH_LLM_MODEL") {
            config.llm.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagBenchError::io(path, e))?;

        let file_config: ConfigFile = serde_yaml::from_str(&content)
            .map_err(|e| RagBenchError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(embedding) = file_config.embedding {
            if let Some(api_url) = embedding.api_url {
                config.embedding.api_url = api_url;
            }
            if let Some(api_key) = embedding.api_key {
                config.embedding.api_key = api_key;
            }
            if let Some(batch_size) = embedding.batch_size {
                config.embedding.batch_size = batch_size;
            }
            if let Some(task_description) = embedding.task_description {
                config.embedding.task_description = task_description;
            }
            if let Some(normalize) = embedding.normalize {
                config.embedding.normalize = normalize;
            }
        }

        if let Some(qdrant) = file_config.qdrant {
            if let Some(url) = qdrant.url {
                config.qdrant.url = url;
            }
            if let Some(prefix) = qdrant.collection_prefix {
                config.qdrant.collection_prefix = prefix;
            }
        }

        if let Some(scoring) = file_config.scoring {
            if let Some(api_url) = scoring.api_url {
                config.scoring.api_url = api_url;
            }
            if let Some(api_key) = scoring.api_key {
                config.scoring.api_key = api_key;
            }
        }

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
        }

        if let Some(chunking) = file_config.chunking {
            if let Some(fixed_size) = chunking.fixed_size {
                config.chunking.fixed_size = fixed_size;
            }
            if let Some(window_size) = chunking.window_size {
                config.chunking.window_size = window_size;
            }
            if let Some(window_overlap) = chunking.window_overlap {
                config.chunking.window_overlap = window_overlap;
            }
            if let Some(semantic_max_len) = chunking.semantic_max_len {
                config.chunking.semantic_max_len = semantic_max_len;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that configuration needed by the evaluation pipeline is
    /// present and consistent.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.api_url.is_empty() {
            return Err(RagBenchError::Config(
                "Embedding service URL is required. Set RAG_BENCH_EMBEDDING_URL environment variable or add to config file.".to_string()
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(RagBenchError::Config(
                "Embedding batch size must be at least 1.".to_string(),
            ));
        }

        if self.qdrant.url.is_empty() {
            return Err(RagBenchError::Config(
                "Qdrant URL is required. Set RAG_BENCH_QDRANT_URL environment variable or add to config file.".to_string()
            ));
        }

        if self.chunking.fixed_size == 0 || self.chunking.window_size == 0 {
            return Err(RagBenchError::Config(
                "Chunk sizes must be at least 1 character.".to_string(),
            ));
        }

        if self.chunking.window_overlap >= self.chunking.window_size {
            return Err(RagBenchError::Config(format!(
                "Sliding window overlap ({}) must be smaller than the window size ({}).",
                self.chunking.window_overlap, self.chunking.window_size
            )));
        }

        if self.chunking.semantic_max_len == 0 {
            return Err(RagBenchError::Config(
                "Semantic chunk limit must be at least 1 character.".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate the LLM settings needed by the chat command.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagBenchError::Config(
                "LLM API base URL is required. Set RAG_BENCH_LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(RagBenchError::Config(
                "LLM API key is required. Set RAG_BENCH_LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(RagBenchError::Config(
                "LLM model is required. Set RAG_BENCH_LLM_MODEL environment variable or add to config file.".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit embedding endpoint values (useful
    /// for testing).
    pub fn with_embedding(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            embedding: EmbeddingConfig {
                api_url: api_url.into(),
                api_key: api_key.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
