//! Fixed-window text chunker with overlap.
//!
//! Splits a document's text into [`Chunk`]s of at most `max_size`
//! characters. Consecutive windows start `max_size - overlap` characters
//! apart, so the tail of one chunk and the head of the next share exactly
//! `overlap` characters. Sizes are measured in chars, never bytes, so a
//! window never ends inside a multi-byte code point.
//!
//! # Algorithm
//!
//! 1. Validate `max_size > 0` and `overlap < max_size`.
//! 2. Emit the window `[start, min(start + max_size, len))`.
//! 3. Stop once a window reaches the end of the text.
//! 4. Otherwise advance `start` by `max_size - overlap` and repeat.
//!
//! The final window may be shorter than `max_size`. Any new content it
//! carries is emitted as its own chunk, even when shorter than `overlap`,
//! so every character of the input appears in at least one chunk.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_text, ChunkConfig};
//!
//! let text = "A".repeat(44);
//! let chunks = chunk_text("notes.pdf", &text, &ChunkConfig::new(10, 2).unwrap()).unwrap();
//! assert_eq!(chunks.len(), 6);
//! assert_eq!(chunks[1].start, 8);
//! assert_eq!(chunks[5].text.len(), 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            overlap: 1_000,
        }
    }
}

impl ChunkConfig {
    /// Create a validated chunk configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `max_size == 0` or
    /// `overlap >= max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { max_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk max_size must be > 0".to_string(),
            ));
        }
        if self.overlap >= self.max_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk overlap ({}) must be less than max_size ({})",
                self.overlap, self.max_size
            )));
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows.
    pub fn stride(&self) -> usize {
        self.max_size - self.overlap
    }
}

/// Split `text` into overlapping windows.
///
/// Returns chunks with contiguous indices starting at 0. Empty text yields
/// an empty vector.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`] if `config` violates its
/// preconditions.
pub fn chunk_text(document_id: &str, text: &str, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::with_capacity(total_chars / config.stride() + 1);
    let mut start = 0;

    loop {
        let end = (start + config.max_size).min(total_chars);
        chunks.push(Chunk {
            document_id: document_id.to_string(),
            chunk_index: chunks.len(),
            start,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        if end == total_chars {
            break;
        }
        start += config.stride();
    }

    Ok(chunks)
}
