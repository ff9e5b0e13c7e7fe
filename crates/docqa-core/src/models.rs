//! Core data models shared by the indexing and query paths.

use serde::{Deserialize, Serialize};

/// Raw extracted text of one source, before chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Source identifier (filename or topic label).
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// An ordered slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning document identifier.
    pub document_id: String,
    /// Position within the document, contiguous from 0.
    pub chunk_index: usize,
    /// Character (not byte) offset of the chunk start within the document.
    pub start: usize,
    pub text: String,
}

impl Chunk {
    /// Number of characters in the chunk.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk paired with its similarity to a query vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`; higher is more relevant.
    pub score: f32,
}

/// Ranked chunks for one question, best first, at most `k` long.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(chunks: Vec<ScoredChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The highest score, if any chunk was retrieved.
    pub fn best_score(&self) -> Option<f32> {
        self.chunks.first().map(|c| c.score)
    }
}
