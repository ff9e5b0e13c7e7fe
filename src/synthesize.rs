//! Answer synthesis: prompt → bounded, retried generator call → [`Answer`].
//!
//! Each attempt runs under a timeout. Timeouts, empty output, and
//! [`RagError::GenerationUnavailable`] are retried with exponential backoff;
//! [`RagError::GenerationRejected`] is returned immediately. When retrieval
//! produced no evidence the model is not called at all and the refusal
//! answer is returned.

use std::sync::Arc;
use std::time::Duration;

use docqa_core::answer::{build_prompt, Answer, Generator, PromptLimits};
use docqa_core::models::RetrievalResult;
use docqa_core::{RagError, Result};
use tracing::{debug, info, warn};

use crate::config::{GenerationConfig, RetrievalConfig};

pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    limits: PromptLimits,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            limits: PromptLimits::default(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }

    /// Build from the `[generation]` and `[retrieval]` config sections.
    pub fn from_config(
        generator: Arc<dyn Generator>,
        generation: &GenerationConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self::new(generator)
            .with_limits(PromptLimits {
                max_context_chars: retrieval.max_context_chars,
                min_similarity: retrieval.min_similarity,
            })
            .with_timeout(Duration::from_secs(generation.timeout_secs))
            .with_retries(
                generation.max_retries,
                Duration::from_millis(generation.retry_backoff_ms),
            )
    }

    pub fn with_limits(mut self, limits: PromptLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry transient failures up to `max_retries` times, waiting
    /// `backoff`, `2 × backoff`, `4 × backoff`, ... between attempts.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Answer `question` from `retrieved`.
    ///
    /// # Errors
    ///
    /// - [`RagError::GenerationUnavailable`] once every attempt has failed
    ///   transiently.
    /// - [`RagError::GenerationRejected`] on the first permanent refusal.
    pub async fn answer(&self, question: &str, retrieved: &RetrievalResult) -> Result<Answer> {
        let Some(prompt) = build_prompt(question, retrieved, &self.limits) else {
            info!(
                retrieved = retrieved.len(),
                best_score = ?retrieved.best_score(),
                "no chunk cleared the similarity threshold; answering not-present"
            );
            return Ok(Answer::not_present());
        };

        debug!(
            model = %self.generator.model_name(),
            sources = prompt.sources.len(),
            prompt_chars = prompt.text.len(),
            "calling generator"
        );

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_backoff * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let err = match tokio::time::timeout(self.timeout, self.generator.generate(&prompt.text)).await {
                Ok(Ok(text)) if text.trim().is_empty() => {
                    RagError::GenerationUnavailable("generator returned empty output".to_string())
                }
                Ok(Ok(text)) => return Ok(Answer::from_generation(&text, prompt.sources)),
                Ok(Err(e @ RagError::GenerationUnavailable(_))) => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => RagError::GenerationUnavailable(format!(
                    "generator timed out after {:?}",
                    self.timeout
                )),
            };

            warn!(attempt, max_retries = self.max_retries, error = %err, "generation attempt failed");
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| {
            RagError::GenerationUnavailable("generation failed after retries".to_string())
        }))
    }
}
