//! Embedding capability boundary and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for vector serialization and cosine similarity.
//! Concrete providers (OpenAI, Ollama, local fastembed) live in the
//! `docqa` application package.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A text → vector capability.
///
/// Implementations must be deterministic for a given model version and
/// always produce vectors of [`dims`](Embedder::dims) length. Failures
/// surface as [`RagError::EmbeddingUnavailable`]; an implementation must
/// never substitute a zero vector for a failed embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier used to tag persisted indexes
    /// (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(RagError::EmbeddingUnavailable(
                "expected exactly one vector for a single text".to_string(),
            )),
        }
    }
}

/// Check that a batch response lines up with its request.
///
/// Rejects count mismatches, empty vectors, and vectors whose length differs
/// from `dims` (when `dims` is non-zero).
pub fn check_batch(expected_count: usize, dims: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(RagError::EmbeddingUnavailable(format!(
            "requested {} embeddings, received {}",
            expected_count,
            vectors.len()
        )));
    }
    for v in vectors {
        if v.is_empty() {
            return Err(RagError::EmbeddingUnavailable(
                "provider returned an empty embedding".to_string(),
            ));
        }
        if dims != 0 && v.len() != dims {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                found: v.len(),
            });
        }
    }
    Ok(())
}

/// Encode a float vector as little-endian f32 bytes.
///
/// # Example
///
/// ```rust
/// use docqa_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored; callers that
/// care about framing check the length first.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
