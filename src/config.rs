//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! usable configuration with embeddings and generation disabled.
//!
//! ```toml
//! [chunking]
//! max_size = 10000
//! overlap = 1000
//!
//! [retrieval]
//! top_k = 4
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "groq"
//! model = "llama-3.3-70b-versatile"
//! ```

use anyhow::{bail, Context, Result};
use docqa_core::chunk::ChunkConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn to_chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            max_size: self.max_size,
            overlap: self.overlap,
        }
    }
}

fn default_max_size() -> usize {
    10_000
}
fn default_overlap() -> usize {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_similarity: f32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: 0.0,
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    docqa_core::retrieve::DEFAULT_TOP_K
}
fn default_max_context_chars() -> usize {
    40_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_embed_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    4
}
fn default_embed_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_temperature() -> f32 {
    0.3
}
fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_retry_backoff_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Live sessions kept in memory; creating one more evicts the least
    /// recently used.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Request body limit in bytes (applies to document uploads).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_max_sessions() -> usize {
    256
}
fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

/// Load and validate a configuration file.
///
/// A missing file yields [`Config::default`]; a file that exists but fails
/// to parse or validate is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found; using defaults");
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

/// Parse configuration from a TOML string without validating it.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Check cross-field constraints.
pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    config
        .chunking
        .to_chunk_config()
        .validate()
        .context("invalid [chunking] section")?;

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_similarity) {
        bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
    }
    if config.retrieval.max_context_chars == 0 {
        bail!("retrieval.max_context_chars must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "groq" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, groq, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    // Validate server
    if config.server.max_sessions == 0 {
        bail!("server.max_sessions must be >= 1");
    }
    if config.server.max_body_bytes == 0 {
        bail!("server.max_body_bytes must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.max_size, 10_000);
        assert_eq!(config.chunking.overlap, 1_000);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(!config.embedding.is_enabled());
        assert!(!config.generation.is_enabled());
        assert!((config.generation.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse_config(
            r#"
[chunking]
max_size = 500
overlap = 50

[retrieval]
top_k = 6
min_similarity = 0.2

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[generation]
provider = "groq"
model = "llama-3.3-70b-versatile"
max_retries = 1

[index]
path = "/tmp/idx"

[server]
bind = "0.0.0.0:9000"
max_sessions = 8
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.to_chunk_config().stride(), 450);
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.generation.max_retries, 1);
        assert_eq!(config.index.path, PathBuf::from("/tmp/idx"));
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.max_sessions, 8);
        assert_eq!(config.server.max_body_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_zero_max_sessions_rejected() {
        let config = parse_config("[server]
max_sessions = 0
").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("server.max_sessions"));
    }

    #[test]
    fn test_overlap_not_less_than_size_rejected() {
        let config = parse_config("[chunking]\nmax_size = 10\noverlap = 10\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_openai_requires_dims() {
        let config =
            parse_config("[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n")
                .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_generation_provider_rejected() {
        let config = parse_config("[generation]\nprovider = \"carrier-pigeon\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }
}
