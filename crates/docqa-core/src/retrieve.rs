//! Build-phase and query-phase orchestration.
//!
//! [`Retriever`] runs `chunk → embed → index` when a document set is
//! processed and `embed → query` when a question is asked. [`Session`] is
//! the caller-owned holder of the active index: there is no process-wide
//! store, and every upload scopes to its own session.
//!
//! # Session states
//!
//! ```text
//! Empty ──process──▶ Indexed ──process──▶ Indexed (previous index discarded)
//! ```
//!
//! A rebuild only replaces the active index after the new one is complete,
//! so a failed rebuild leaves the previous index usable. The index behind
//! the session is an `Arc` snapshot: queries clone the `Arc` and never
//! block each other.

use std::path::Path;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::chunk::{chunk_text, ChunkConfig};
use crate::embedding::{check_batch, Embedder};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{Document, RetrievalResult};

/// Default number of chunks returned per question.
pub const DEFAULT_TOP_K: usize = 4;

const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_CONCURRENCY: usize = 4;

/// Embeds document sets into indexes and questions into ranked chunks.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    concurrency: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Number of chunk texts sent per embedding call (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of embedding calls allowed in flight during a build (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Chunk, embed, and index a document set.
    ///
    /// Construction is all-or-nothing: the first failed or malformed
    /// embedding aborts the build and no index is returned.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidConfiguration`] for a bad `config`.
    /// - [`RagError::InvalidArgument`] if the documents contain no text.
    /// - [`RagError::EmbeddingUnavailable`] / [`RagError::DimensionMismatch`]
    ///   from the embedding step.
    pub async fn build_index(
        &self,
        documents: &[Document],
        config: &ChunkConfig,
    ) -> Result<VectorIndex> {
        config.validate()?;

        let mut chunks = Vec::new();
        for doc in documents {
            let doc_chunks = chunk_text(&doc.id, &doc.text, config)?;
            if doc_chunks.is_empty() {
                warn!(document = %doc.id, "document has no text; skipped");
            }
            chunks.extend(doc_chunks);
        }
        if chunks.is_empty() {
            return Err(RagError::InvalidArgument(
                "no text could be extracted from the document set".to_string(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let dims = self.embedder.dims();

        // `buffered` yields results in submission order, so batch i lines up
        // with chunks [i * batch_size ..].
        let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(texts.chunks(self.batch_size))
            .map(|batch| async move {
                let vectors = self.embedder.embed_batch(batch).await?;
                check_batch(batch.len(), dims, &vectors)?;
                Ok::<_, RagError>(vectors)
            })
            .buffered(self.concurrency)
            .boxed()
            .try_collect()
            .await?;

        let pairs: Vec<(Vec<f32>, _)> = batches.into_iter().flatten().zip(chunks).collect();
        let index = VectorIndex::build(self.embedder.model_name(), pairs)?;

        info!(
            documents = documents.len(),
            chunks = index.len(),
            model = %index.model(),
            "built index"
        );
        Ok(index)
    }

    /// Embed `question` once and return the `k` nearest chunks of `index`.
    ///
    /// # Errors
    ///
    /// - [`RagError::ModelMismatch`] if `index` was built by another model.
    /// - [`RagError::InvalidArgument`] for an empty question or `k == 0`.
    /// - [`RagError::EmbeddingUnavailable`] from the embedding step.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        question: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        if index.model() != self.embedder.model_name() {
            return Err(RagError::ModelMismatch {
                expected: index.model().to_string(),
                found: self.embedder.model_name().to_string(),
            });
        }
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".to_string()));
        }

        let vector = self.embedder.embed(question).await?;
        if vector.is_empty() {
            return Err(RagError::EmbeddingUnavailable(
                "provider returned an empty embedding for the question".to_string(),
            ));
        }

        Ok(RetrievalResult::new(index.query(&vector, k)?))
    }
}

/// Whether a session has an active index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Indexed,
}

/// Caller-owned holder of at most one active index.
#[derive(Debug, Default, Clone)]
pub struct Session {
    index: Option<Arc<VectorIndex>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match self.index {
            Some(_) => SessionState::Indexed,
            None => SessionState::Empty,
        }
    }

    /// Snapshot of the active index.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexNotFound`] while the session is `Empty`.
    pub fn index(&self) -> Result<Arc<VectorIndex>> {
        self.index
            .clone()
            .ok_or_else(|| RagError::IndexNotFound("no document set has been processed".to_string()))
    }

    /// Make `index` the active index, returning the one it replaced.
    pub fn install(&mut self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        self.index.replace(Arc::new(index))
    }

    /// Drop the active index, returning the session to `Empty`.
    pub fn clear(&mut self) {
        self.index = None;
    }

    /// Build an index for `documents` and swap it in on success.
    ///
    /// On failure the previous index (if any) stays active.
    pub async fn process(
        &mut self,
        retriever: &Retriever,
        documents: &[Document],
        config: &ChunkConfig,
    ) -> Result<Arc<VectorIndex>> {
        let index = Arc::new(retriever.build_index(documents, config).await?);
        self.index = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Retrieve against the active index.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexNotFound`] while `Empty`, plus anything
    /// [`Retriever::retrieve`] returns.
    pub async fn retrieve(
        &self,
        retriever: &Retriever,
        question: &str,
        k: usize,
    ) -> Result<RetrievalResult> {
        let index = self.index()?;
        retriever.retrieve(&index, question, k).await
    }

    /// Replace the active index with one loaded from `dir`, which must
    /// carry the `model` tag.
    pub fn restore(&mut self, dir: &Path, model: &str) -> Result<()> {
        let index = VectorIndex::load_for_model(dir, model)?;
        self.install(index);
        Ok(())
    }

    /// Save the active index to `dir`.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        self.index()?.save(dir)
    }
}
