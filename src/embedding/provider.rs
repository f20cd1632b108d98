// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Passages and queries are embedded through the [`EmbeddingProvider`] trait.
//! The bundled providers are an in-process fastembed model, an external
//! command speaking JSON over stdin/stdout, and a zero-vector dummy.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts, one vector per text, in order.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        if result.len() != 1 {
            bail!("Embedder returned {} vectors for one text", result.len());
        }
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Builds the provider selected by the `[embeddings]` configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    debug!(provider = ?config.provider(), model = config.model(), "creating embedding provider");
    match config.provider() {
        EmbeddingProviderType::Command => Ok(Box::new(CommandProvider::new(
            config.command().to_string(),
            config.model().to_string(),
        ))),
        EmbeddingProviderType::Dummy => Ok(Box::new(DummyProvider::new(config.dimension()))),
        #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
        EmbeddingProviderType::Builtin => Ok(Box::new(FastEmbedder::from_env()?)),
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        EmbeddingProviderType::Builtin => {
            bail!("The builtin embedding provider is not available on this platform; use provider = \"command\"")
        }
    }
}

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use fast::{FastEmbedConfig, FastEmbedder};

#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
mod fast {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::borrow::Cow;

    /// Configuration for the in-process fastembed provider.
    #[derive(Debug, Clone)]
    pub struct FastEmbedConfig {
        pub model: EmbeddingModel,
        pub batch_size: usize,
        pub max_chars: usize,
        pub normalize: bool,
    }

    impl FastEmbedConfig {
        /// Reads `FASTEMBED_MODEL`, `FASTEMBED_BATCH_SIZE`, `FASTEMBED_MAX_CHARS`
        /// and `FASTEMBED_NORMALIZE`.
        pub fn from_env() -> Result<Self> {
            let model = parse_model_env()?;
            let mut batch_size =
                parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
            if batch_size == 0 {
                batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
            }
            if batch_size > MAX_FASTEMBED_BATCH_SIZE {
                warn!(
                    batch_size,
                    max = MAX_FASTEMBED_BATCH_SIZE,
                    "FASTEMBED_BATCH_SIZE exceeds maximum; clamping"
                );
                batch_size = MAX_FASTEMBED_BATCH_SIZE;
            }

            let mut max_chars =
                parse_usize_env("FASTEMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
            if max_chars == 0 {
                max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
            }

            let normalize = parse_bool_env("FASTEMBED_NORMALIZE", true)?;

            Ok(Self {
                model,
                batch_size,
                max_chars,
                normalize,
            })
        }
    }

    impl Default for FastEmbedConfig {
        fn default() -> Self {
            Self {
                model: EmbeddingModel::AllMiniLML6V2,
                batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
                max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
                normalize: true,
            }
        }
    }

    /// In-process provider backed by fastembed.
    pub struct FastEmbedder {
        embedder: TextEmbedding,
        config: FastEmbedConfig,
        model_id: String,
    }

    impl FastEmbedder {
        pub fn new(config: FastEmbedConfig) -> Result<Self> {
            let model = config.model.clone();
            let model_id = model.to_string();
            let embedder = TextEmbedding::try_new(InitOptions::new(model))
                .context("Failed to initialize fastembed model")?;

            Ok(Self {
                embedder,
                config,
                model_id,
            })
        }

        pub fn from_env() -> Result<Self> {
            Self::new(FastEmbedConfig::from_env()?)
        }
    }

    impl EmbeddingProvider for FastEmbedder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn batch_size(&self) -> usize {
            self.config.batch_size
        }

        fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let prepared: Vec<Cow<'_, str>> = texts
                .iter()
                .map(|text| truncate_to_chars(text, self.config.max_chars))
                .collect();
            let mut embeddings = self
                .embedder
                .embed(&prepared, Some(self.config.batch_size))?;

            if self.config.normalize {
                for embedding in embeddings.iter_mut() {
                    l2_normalize(embedding);
                }
            }

            Ok(embeddings)
        }
    }

    fn parse_model_env() -> Result<EmbeddingModel> {
        let raw = env::var("FASTEMBED_MODEL").unwrap_or_default();
        match raw.trim().to_lowercase().as_str() {
            "" | "minilm" | "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            "bge-small" | "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
                Ok(EmbeddingModel::BGESmallENV15)
            }
            other => bail!(
                "Unsupported FASTEMBED_MODEL '{}'. Supported values: minilm, bge-small",
                other
            ),
        }
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print either a JSON array of vectors or an object holding one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });
        let stdout = run_json_command(&self.command, &payload)
            .with_context(|| format!("Embedding command failed: {}", self.command))?;
        let parsed: Value = serde_json::from_str(stdout.trim())
            .context("Failed to parse embeddings command output as JSON")?;

        let vectors = parse_vectors(parsed)?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding command returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

/// Dummy provider that returns zero vectors (for testing/fallback).
pub struct DummyProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl DummyProvider {
    /// Creates a new dummy provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }
}

impl EmbeddingProvider for DummyProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }
}

/// Spawns `sh -c command`, writes `payload` to stdin and returns stdout.
pub(crate) fn run_json_command(command: &str, payload: &Value) -> Result<String> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", command))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(payload.to_string().as_bytes())
            .context("Failed to write payload to stdin")?;
    }

    let output = child
        .wait_with_output()
        .context("Failed to read command output")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("exit status {}: {}", output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_vectors(parsed: Value) -> Result<Vec<Vec<f32>>> {
    let rows = match parsed {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => match ["embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.remove(*key))
        {
            Some(Value::Array(arr)) => arr,
            Some(_) => bail!("Embeddings output must be a JSON array"),
            None => bail!("Embeddings command output missing 'embeddings' field"),
        },
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    rows.iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect()
}

#[cfg_attr(all(target_os = "macos", target_arch = "x86_64"), allow(dead_code))]
fn truncate_to_chars(input: &str, max_chars: usize) -> std::borrow::Cow<'_, str> {
    use std::borrow::Cow;

    if max_chars == 0 {
        return Cow::Borrowed("");
    }
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

#[cfg_attr(all(target_os = "macos", target_arch = "x86_64"), allow(dead_code))]
fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg_attr(all(target_os = "macos", target_arch = "x86_64"), allow(dead_code))]
fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg_attr(all(target_os = "macos", target_arch = "x86_64"), allow(dead_code))]
fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("Invalid {} value: {}", name, other),
        },
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_dummy_provider() {
        let mut provider = DummyProvider::new(384);
        assert_eq!(provider.model_id(), "dummy");

        let result = provider
            .embed_texts(&["hello".to_string(), "world".to_string()])
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 384);
        assert!(result[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_embed_one() {
        let mut provider = DummyProvider::new(128);
        let vector = provider.embed_one("test").unwrap();
        assert_eq!(vector.len(), 128);
    }

    #[test]
    fn test_parse_vectors_shapes() {
        let bare = parse_vectors(serde_json::json!([[1.0, 2.0], [3.0, 4.0]])).unwrap();
        assert_eq!(bare, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let wrapped = parse_vectors(serde_json::json!({"vectors": [[0.5]]})).unwrap();
        assert_eq!(wrapped, vec![vec![0.5]]);

        assert!(parse_vectors(serde_json::json!({"other": []})).is_err());
        assert!(parse_vectors(serde_json::json!([["x"]])).is_err());
        assert!(parse_vectors(serde_json::json!("nope")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_round_trip() {
        let mut provider = CommandProvider::new(
            r#"cat > /dev/null; echo '{"embeddings": [[1, 0], [0, 1]]}'"#.to_string(),
            "test-model".to_string(),
        );
        let vectors = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_count_mismatch() {
        let mut provider = CommandProvider::new(
            "cat > /dev/null; echo '[[1, 0]]'".to_string(),
            "test-model".to_string(),
        );
        let err = provider
            .embed_texts(&["a".to_string(), "b".to_string()])
            .unwrap_err();
        assert!(format!("{:#}", err).contains("1 vectors for 2 texts"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_provider_failure_reports_stderr() {
        let mut provider = CommandProvider::new(
            "cat > /dev/null; echo 'model missing' >&2; exit 3".to_string(),
            "test-model".to_string(),
        );
        let err = provider.embed_one("a").unwrap_err();
        assert!(format!("{:#}", err).contains("model missing"));
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "hello";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("he".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
        assert_eq!(truncate_to_chars("法律问题", 2), Cow::<str>::Owned("法律".to_string()));
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
