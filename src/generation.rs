//! Text-generation providers.
//!
//! Concrete implementations of [`docqa_core::answer::Generator`]. Each
//! provider makes exactly one request per `generate` call; timeouts and
//! retries are applied by [`crate::synthesize::AnswerSynthesizer`].
//!
//! | Config Value | Generator | Default endpoint |
//! |-------------|-----------|------------------|
//! | `"groq"` | [`ChatCompletionsGenerator`] | `https://api.groq.com/openai/v1/chat/completions` |
//! | `"openai"` | [`ChatCompletionsGenerator`] | `https://api.openai.com/v1/chat/completions` |
//! | `"ollama"` | [`OllamaGenerator`] | `http://localhost:11434/api/chat` |
//! | `"disabled"` | [`DisabledGenerator`] | none |
//!
//! HTTP 429, 5xx, and network errors map to
//! [`RagError::GenerationUnavailable`]; any other non-success status maps to
//! [`RagError::GenerationRejected`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use docqa_core::answer::Generator;
use docqa_core::{RagError, Result};
use reqwest::StatusCode;

use crate::config::GenerationConfig;

pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Map a non-success HTTP status to the matching generation error.
fn classify_status(provider: &str, status: StatusCode, body: &str) -> RagError {
    let message = format!("{provider} API error {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RagError::GenerationUnavailable(message)
    } else {
        RagError::GenerationRejected(message)
    }
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    provider: &str,
) -> Result<serde_json::Value> {
    let mut request = client.post(url).json(body);
    if let Some(key) = bearer {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| {
        RagError::GenerationUnavailable(format!("{provider} connection error ({url}): {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, status, &body_text));
    }

    response.json().await.map_err(|e| {
        RagError::GenerationUnavailable(format!("{provider} returned invalid JSON: {e}"))
    })
}

fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

// ============ Disabled ============

/// A generator that always refuses. Used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::GenerationRejected(
            "generation provider is disabled; set [generation].provider in the config".to_string(),
        ))
    }
}

// ============ OpenAI-compatible chat completions ============

/// Client for any OpenAI-compatible `/chat/completions` endpoint (Groq, OpenAI).
///
/// Sends the prompt as a single user message and returns
/// `choices[0].message.content`.
pub struct ChatCompletionsGenerator {
    provider: String,
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    /// Build a Groq client. Reads `GROQ_API_KEY`.
    pub fn groq(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| anyhow::anyhow!("GROQ_API_KEY environment variable not set"))?;
        Self::new(
            "Groq",
            config
                .model
                .clone()
                .unwrap_or_else(|| GROQ_DEFAULT_MODEL.to_string()),
            config.url.clone().unwrap_or_else(|| GROQ_CHAT_URL.to_string()),
            api_key,
            config,
        )
    }

    /// Build an OpenAI client. Reads `OPENAI_API_KEY`.
    pub fn openai(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::new(
            "OpenAI",
            model,
            config.url.clone().unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key,
            config,
        )
    }

    fn new(
        provider: &str,
        model: String,
        url: String,
        api_key: String,
        config: &GenerationConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            provider: provider.to_string(),
            model,
            url,
            api_key,
            temperature: config.temperature,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = post_json(&self.client, &self.url, Some(&self.api_key), &body, &self.provider).await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::GenerationUnavailable(
                "invalid chat completion response: missing choices[0].message.content".to_string(),
            )
        })
}

// ============ Ollama ============

/// Client for a local Ollama instance's `/api/chat` endpoint.
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        Ok(Self {
            model,
            url,
            temperature: config.temperature,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": [{ "role": "user", "content": prompt }],
        });
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let json = post_json(&self.client, &url, None, &body, "Ollama").await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                RagError::GenerationUnavailable(
                    "invalid Ollama response: missing message.content".to_string(),
                )
            })
    }
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "groq" => Ok(Arc::new(ChatCompletionsGenerator::groq(config)?)),
        "openai" => Ok(Arc::new(ChatCompletionsGenerator::openai(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_server_errors_are_unavailable() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = classify_status("Groq", status, "busy");
            assert!(matches!(err, RagError::GenerationUnavailable(_)), "{status}");
        }
    }

    #[test]
    fn test_client_errors_are_rejected() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND] {
            let err = classify_status("Groq", status, "nope");
            assert!(matches!(err, RagError::GenerationRejected(_)), "{status}");
        }
    }

    #[test]
    fn test_parse_chat_completion() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "ATP." } }]
        });
        assert_eq!(parse_chat_completion(&json).unwrap(), "ATP.");
        assert!(parse_chat_completion(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_rejects() {
        let generator = create_generator(&GenerationConfig::default()).unwrap();
        let err = generator.generate("hi").await.unwrap_err();
        assert!(matches!(err, RagError::GenerationRejected(_)));
    }
}
