// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for ragsift
//!
//! Loads configuration from .ragsiftrc.toml in current directory or ~/.config/ragsift/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::generation::DEFAULT_PROMPT_TEMPLATE;
use crate::selection::{DEFAULT_MAX_RESULTS, DEFAULT_SIMILARITY_THRESHOLD};

/// Default number of candidates fetched from the index
pub const DEFAULT_TOP_K: usize = 10;

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Builtin,
    Command,
    Dummy,
}

/// Generator type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorType {
    #[default]
    Command,
    Echo,
}

/// Retrieval and selection configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Number of candidates to fetch from the index
    pub top_k: Option<usize>,
    /// Cosine similarity at or above which passages count as duplicates (0.0-1.0)
    pub similarity_threshold: Option<f32>,
    /// Maximum number of passages passed to the generator
    pub max_results: Option<usize>,
    /// Embed all candidates in one batch before selection
    pub prefetch: Option<bool>,
}

impl RagConfig {
    /// Get top k (defaults to 10)
    pub fn top_k(&self) -> usize {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    /// Get similarity threshold (defaults to 0.8)
    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD)
    }

    /// Get max results (defaults to 3)
    pub fn max_results(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    /// Get prefetch setting (defaults to false)
    pub fn prefetch(&self) -> bool {
        self.prefetch.unwrap_or(false)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, dummy)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Vector dimension for the dummy provider
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "local-model-id")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("local-model-id")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get dummy dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(384)
    }
}

/// Generation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Generator type (command, echo)
    pub provider: Option<GeneratorType>,
    /// Command to execute for command generator
    pub command: Option<String>,
    /// Model identifier passed to the command
    pub model: Option<String>,
    /// Maximum generated length passed to the command
    pub max_length: Option<usize>,
    /// Prompt template with {query} and {context} placeholders
    pub prompt_template: Option<String>,
}

impl GenerationConfig {
    /// Get generator type (defaults to Command)
    pub fn provider(&self) -> GeneratorType {
        self.provider.unwrap_or_default()
    }

    /// Get command (defaults to "generator")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("generator")
    }

    /// Get model identifier (defaults to "local-model-id")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("local-model-id")
    }

    /// Get max length (defaults to 1024)
    pub fn max_length(&self) -> usize {
        self.max_length.unwrap_or(1024)
    }

    /// Get prompt template
    pub fn prompt_template(&self) -> &str {
        self.prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_TEMPLATE)
    }
}

/// Index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Explicit path to the index database
    pub path: Option<PathBuf>,
}

impl IndexConfig {
    /// Get the configured index path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Configuration loaded from .ragsiftrc.toml or ~/.config/ragsift/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<ConfigOutputFormat>,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

impl Config {
    /// Load configuration for the index rooted at `dir`
    ///
    /// Precedence (highest to lowest):
    /// 1. .ragsiftrc.toml in `dir`
    /// 2. ~/.config/ragsift/config.toml
    pub fn load_from_dir(dir: &Path) -> Self {
        if let Some(config) = Self::load_from_path(&dir.join(".ragsiftrc.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("ragsift").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge CLI options with config (CLI wins)
    pub fn merge_top_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.rag.top_k())
    }

    /// Merge CLI options with config (CLI wins)
    pub fn merge_similarity_threshold(&self, cli_value: Option<f32>) -> f32 {
        cli_value.unwrap_or_else(|| self.rag.similarity_threshold())
    }

    /// Merge CLI options with config (CLI wins)
    pub fn merge_max_results(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.rag.max_results())
    }

    /// Resolve the index database path relative to `root`
    pub fn index_path(&self, root: &Path) -> PathBuf {
        match self.index.path() {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => root.join(path),
            None => root
                .join(crate::utils::INDEX_DIR)
                .join(crate::utils::INDEX_FILE),
        }
    }
}
