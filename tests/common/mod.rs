//! Deterministic in-process providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa::app::DocQa;
use docqa::config::Config;
use docqa_core::answer::Generator;
use docqa_core::embedding::Embedder;
use docqa_core::{RagError, Result};

/// Vocabulary for [`KeywordEmbedder`]; one dimension per word.
pub const VOCAB: &[&str] = &[
    "mitochondria", "atp", "cell", "energy", "paris", "france", "capital", "river",
];

/// Embeds text as counts of each [`VOCAB`] word. Texts containing
/// `poison` fail with `EmbeddingUnavailable`.
pub struct KeywordEmbedder {
    model: String,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    VOCAB
        .iter()
        .map(|v| words.iter().filter(|w| *w == v).count() as f32)
        .collect()
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        VOCAB.len()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(RagError::EmbeddingUnavailable("provider choked".to_string()));
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// What a [`FakeGenerator`] does when called.
#[derive(Clone)]
pub enum Reply {
    /// Return this text.
    Text(String),
    /// Return the first line of the prompt's context section.
    EchoContext,
    /// Fail transiently.
    Unavailable,
}

/// Records every prompt and answers according to its [`Reply`].
pub struct FakeGenerator {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    fn model_name(&self) -> &str {
        "fake-llm"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Reply::Text(t) => Ok(t.clone()),
            Reply::EchoContext => Ok(prompt
                .split("Context:\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default()
                .to_string()),
            Reply::Unavailable => Err(RagError::GenerationUnavailable("429 Too Many Requests".to_string())),
        }
    }
}

/// Config with small chunks and fast retries.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.max_size = 200;
    config.chunking.overlap = 20;
    config.generation.retry_backoff_ms = 10;
    config
}

pub fn app_with(embedder: Arc<KeywordEmbedder>, generator: Arc<FakeGenerator>) -> DocQa {
    DocQa::with_providers(&test_config(), embedder, generator)
}

pub const BIOLOGY: &str = "Mitochondria are the powerhouse of the cell. Mitochondria produce ATP, \
                           the energy currency of the cell.";
pub const GEOGRAPHY: &str = "Paris is the capital of France. The Seine river runs through Paris.";
