//! Contract between retrieval and a text-generation capability.
//!
//! The generation model is opaque: anything that implements
//! [`Generator`] can answer. This module owns the parts of answering that
//! do not depend on the provider: the fixed instruction, the bounded
//! context assembled from retrieved chunks, the refusal string, and the
//! [`Answer`] shape.
//!
//! "Answer is not present" is a successful [`Answer`] with
//! [`AnswerOutcome::NotPresent`]. A provider failure is a
//! [`RagError::GenerationUnavailable`]. The two are never conflated.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{RetrievalResult, ScoredChunk};

/// The literal refusal the model must give when the context lacks the answer.
pub const NOT_PRESENT: &str = "Answer is not present in the given PDF.";

/// A prompt → text capability.
///
/// Implementations report rate limits, timeouts, and server errors as
/// [`RagError::GenerationUnavailable`](crate::RagError::GenerationUnavailable)
/// and permanent refusals (bad credentials, malformed request) as
/// [`RagError::GenerationRejected`](crate::RagError::GenerationRejected).
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// How an answer was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The model produced an answer from the context.
    Answered,
    /// The context does not contain the answer.
    NotPresent,
}

/// A chunk that was placed into the prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub document_id: String,
    pub chunk_index: usize,
    pub score: f32,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(sc: &ScoredChunk) -> Self {
        Self {
            document_id: sc.chunk.document_id.clone(),
            chunk_index: sc.chunk.chunk_index,
            score: sc.score,
        }
    }
}

/// Final answer text plus how it was reached and what it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    pub sources: Vec<SourceRef>,
}

impl Answer {
    /// The refusal answer, with no sources.
    pub fn not_present() -> Self {
        Self {
            text: NOT_PRESENT.to_string(),
            outcome: AnswerOutcome::NotPresent,
            sources: Vec::new(),
        }
    }

    /// Wrap raw generator output: trim surrounding whitespace and detect the
    /// refusal string.
    pub fn from_generation(raw: &str, sources: Vec<SourceRef>) -> Self {
        let text = raw.trim().to_string();
        let outcome = if text.contains(NOT_PRESENT) {
            AnswerOutcome::NotPresent
        } else {
            AnswerOutcome::Answered
        };
        Self {
            text,
            outcome,
            sources,
        }
    }

    pub fn is_not_present(&self) -> bool {
        self.outcome == AnswerOutcome::NotPresent
    }
}

/// Limits applied when turning a retrieval result into a prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptLimits {
    /// Maximum characters of chunk text placed in the context.
    pub max_context_chars: usize,
    /// Chunks scoring at or below this are not treated as evidence.
    pub min_similarity: f32,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_context_chars: 40_000,
            min_similarity: 0.0,
        }
    }
}

/// A prompt ready for the generator, with the chunks it cites.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Build the bounded prompt for `question` from `retrieved`.
///
/// Chunks are taken in ranked order, filtered by `min_similarity`, and
/// joined by a blank line until the next one would exceed
/// `max_context_chars`. If the best chunk alone exceeds the budget it is
/// truncated to fit. Returns `None` when no chunk qualifies as evidence;
/// the caller then answers [`NOT_PRESENT`] without calling the model.
pub fn build_prompt(question: &str, retrieved: &RetrievalResult, limits: &PromptLimits) -> Option<Prompt> {
    let mut context = String::new();
    let mut used_chars = 0usize;
    let mut sources = Vec::new();

    for sc in retrieved
        .chunks
        .iter()
        .filter(|sc| sc.score > limits.min_similarity)
    {
        let len = sc.chunk.char_len();
        let sep = if sources.is_empty() { 0 } else { 2 };

        if used_chars + sep + len > limits.max_context_chars {
            if sources.is_empty() && limits.max_context_chars > 0 {
                context.extend(sc.chunk.text.chars().take(limits.max_context_chars));
                sources.push(SourceRef::from(sc));
            }
            break;
        }

        if sep > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&sc.chunk.text);
        used_chars += sep + len;
        sources.push(SourceRef::from(sc));
    }

    if sources.is_empty() {
        return None;
    }

    Some(Prompt {
        text: render(&context, question.trim()),
        sources,
    })
}

fn render(context: &str, question: &str) -> String {
    format!(
        "Answer the question as detailed as possible from the provided context.\n\
         If the answer is not in the context, say:\n\
         \"{NOT_PRESENT}\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Answer:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(i: usize, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                document_id: "notes.pdf".to_string(),
                chunk_index: i,
                start: 0,
                text: text.to_string(),
            },
            score,
        }
    }

    #[test]
    fn test_prompt_contains_context_question_and_refusal() {
        let retrieved = RetrievalResult::new(vec![
            scored(0, "Mitochondria make ATP.", 0.9),
            scored(1, "Ribosomes make proteins.", 0.5),
        ]);
        let prompt = build_prompt("What makes ATP?", &retrieved, &PromptLimits::default()).unwrap();
        assert!(prompt
            .text
            .contains("Context:\nMitochondria make ATP.\n\nRibosomes make proteins.\n"));
        assert!(prompt.text.contains("Question:\nWhat makes ATP?\n"));
        assert!(prompt.text.contains(NOT_PRESENT));
        assert_eq!(prompt.sources.len(), 2);
        assert_eq!(prompt.sources[0].chunk_index, 0);
    }

    #[test]
    fn test_no_evidence_yields_none() {
        let retrieved = RetrievalResult::new(vec![scored(0, "unrelated", 0.0)]);
        assert!(build_prompt("q", &retrieved, &PromptLimits::default()).is_none());
        assert!(build_prompt("q", &RetrievalResult::default(), &PromptLimits::default()).is_none());
    }

    #[test]
    fn test_context_budget_stops_in_rank_order() {
        let retrieved = RetrievalResult::new(vec![
            scored(0, "aaaa", 0.9),
            scored(1, "bbbb", 0.8),
            scored(2, "cccc", 0.7),
        ]);
        let limits = PromptLimits {
            max_context_chars: 10,
            min_similarity: 0.0,
        };
        let prompt = build_prompt("q", &retrieved, &limits).unwrap();
        assert_eq!(prompt.sources.len(), 2);
        assert!(prompt.text.contains("aaaa\n\nbbbb"));
        assert!(!prompt.text.contains("cccc"));
    }

    #[test]
    fn test_oversized_first_chunk_is_truncated() {
        let retrieved = RetrievalResult::new(vec![scored(0, "abcdefghij", 0.9)]);
        let limits = PromptLimits {
            max_context_chars: 4,
            min_similarity: 0.0,
        };
        let prompt = build_prompt("q", &retrieved, &limits).unwrap();
        assert!(prompt.text.contains("Context:\nabcd\n"));
    }

    #[test]
    fn test_from_generation_trims_and_detects_refusal() {
        let a = Answer::from_generation("  ATP is made by mitochondria.\n", Vec::new());
        assert_eq!(a.text, "ATP is made by mitochondria.");
        assert_eq!(a.outcome, AnswerOutcome::Answered);

        let r = Answer::from_generation("\nAnswer is not present in the given PDF.\n", Vec::new());
        assert_eq!(r.text, NOT_PRESENT);
        assert!(r.is_not_present());
    }
}
