//! Exhaustive cosine-similarity vector index with directory persistence.
//!
//! A [`VectorIndex`] owns the chunks of one document set together with
//! their embeddings and the tag of the model that produced them. It is
//! built once, never mutated, and queried by brute-force scan:
//! `O(n · d)` per query, which is fine for a few hundred chunks. An
//! approximate nearest-neighbor structure is the first thing to reach for
//! if document sets grow by orders of magnitude.
//!
//! # Ranking
//!
//! Scores are cosine similarity. Results are ordered by descending score
//! with a stable sort, so equal scores keep insertion order and the
//! earlier chunk wins.
//!
//! # On-disk format
//!
//! ```text
//! <dir>/manifest.json   format_version, model, dims, created_at,
//!                       vectors_sha256, chunks[]
//! <dir>/vectors.bin     len(chunks) × dims little-endian f32
//! ```
//!
//! The SHA-256 of `vectors.bin` is recorded in the manifest so a truncated
//! or edited vector file is reported as [`RagError::IndexCorrupt`] instead
//! of producing garbage scores.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";

/// An immutable set of `(vector, chunk)` pairs tagged with a model id.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    model: String,
    dims: usize,
    created_at: DateTime<Utc>,
    vectors_sha256: String,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Build a fresh index from `(vector, chunk)` pairs, preserving their order.
    ///
    /// An empty input yields an empty index with `dims == 0`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if the first vector is empty.
    /// - [`RagError::DimensionMismatch`] if any vector's length differs
    ///   from the first vector's length.
    pub fn build(model: impl Into<String>, pairs: Vec<(Vec<f32>, Chunk)>) -> Result<Self> {
        let model = model.into();
        let dims = pairs.first().map(|(v, _)| v.len()).unwrap_or(0);
        if !pairs.is_empty() && dims == 0 {
            return Err(RagError::InvalidArgument(
                "cannot index a zero-length vector".to_string(),
            ));
        }

        let mut chunks = Vec::with_capacity(pairs.len());
        let mut vectors = Vec::with_capacity(pairs.len());
        for (vector, chunk) in pairs {
            if vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    found: vector.len(),
                });
            }
            vectors.push(vector);
            chunks.push(chunk);
        }

        Ok(Self {
            model,
            dims,
            chunks,
            vectors,
        })
    }

    /// Model identifier the vectors were produced with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vector dimensionality (`0` for an empty index).
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Return the `k` chunks most similar to `vector`, best first.
    ///
    /// An index holding fewer than `k` entries returns all of them.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if `k == 0`.
    /// - [`RagError::DimensionMismatch`] if `vector` does not match the
    ///   index dimensionality.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".to_string()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                found: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let sim = cosine_similarity(vector, v);
                (i, if sim.is_nan() { -1.0 } else { sim })
            })
            .collect();

        // Stable: ties keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        debug!(k, returned = scored.len(), entries = self.len(), "index query");

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }

    /// Persist the index into `dir`, creating it if needed.
    ///
    /// The vector file is written before the manifest, and each file is
    /// renamed into place only after it is fully written, so a crash
    /// mid-save never leaves a manifest pointing at a partial vector file.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut blob = Vec::with_capacity(self.len() * self.dims * 4);
        for v in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(v));
        }

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            created_at: Utc::now(),
            vectors_sha256: sha256_hex(&blob),
            chunks: self.chunks.clone(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RagError::IndexCorrupt(format!("failed to encode manifest: {e}")))?;

        write_replace(&dir.join(VECTORS_FILE), &blob)?;
        write_replace(&dir.join(MANIFEST_FILE), &manifest_json)?;

        info!(
            path = %dir.display(),
            model = %self.model,
            chunks = self.len(),
            dims = self.dims,
            "saved index"
        );
        Ok(())
    }

    /// Load an index previously written by [`save`](VectorIndex::save).
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if `dir` or its manifest does not exist.
    /// - [`RagError::IndexCorrupt`] if the manifest cannot be decoded, the
    ///   format version is unknown, or the vector file is missing, the
    ///   wrong size, or fails its checksum.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes = match std::fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound(format!(
                    "no index at {}",
                    dir.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| RagError::IndexCorrupt(format!("{}: {e}", manifest_path.display())))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(RagError::IndexCorrupt(format!(
                "unsupported index format version {} (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }
        if manifest.dims == 0 && !manifest.chunks.is_empty() {
            return Err(RagError::IndexCorrupt(
                "manifest lists chunks but declares zero dimensions".to_string(),
            ));
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let blob = match std::fs::read(&vectors_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RagError::IndexCorrupt(format!(
                    "{} is missing",
                    vectors_path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if manifest.dims > blob.len() / 4 {
            return Err(RagError::IndexCorrupt(format!(
                "manifest declares {} dimensions but vector file is {} bytes",
                manifest.dims,
                blob.len()
            )));
        }
        let expected_len = manifest
            .chunks
            .len()
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RagError::IndexCorrupt("manifest dimensions overflow".to_string()))?;
        if blob.len() != expected_len {
            return Err(RagError::IndexCorrupt(format!(
                "vector file is {} bytes, expected {}",
                blob.len(),
                expected_len
            )));
        }
        if sha256_hex(&blob) != manifest.vectors_sha256 {
            return Err(RagError::IndexCorrupt(
                "vector file checksum does not match manifest".to_string(),
            ));
        }

        let vectors: Vec<Vec<f32>> = if manifest.dims == 0 {
            Vec::new()
        } else {
            blob.chunks_exact(manifest.dims * 4).map(blob_to_vec).collect()
        };

        info!(
            path = %dir.display(),
            model = %manifest.model,
            chunks = manifest.chunks.len(),
            "loaded index"
        );

        Ok(Self {
            model: manifest.model,
            dims: manifest.dims,
            chunks: manifest.chunks,
            vectors,
        })
    }

    /// Load an index and require that it was built with `model`.
    ///
    /// # Errors
    ///
    /// Everything [`load`](VectorIndex::load) returns, plus
    /// [`RagError::ModelMismatch`] when the stored tag differs.
    pub fn load_for_model(dir: &Path, model: &str) -> Result<Self> {
        let index = Self::load(dir)?;
        if index.model != model {
            return Err(RagError::ModelMismatch {
                expected: index.model,
                found: model.to_string(),
            });
        }
        Ok(index)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
