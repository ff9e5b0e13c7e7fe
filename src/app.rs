//! Application service.
//!
//! [`DocQa`] wires a [`Config`] to an embedder, a [`Retriever`], and an
//! [`AnswerSynthesizer`]. It holds no index itself: the CLI and the HTTP
//! server each own their [`Session`]s and pass them in.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use docqa_core::answer::{Answer, Generator};
use docqa_core::chunk::ChunkConfig;
use docqa_core::embedding::Embedder;
use docqa_core::index::VectorIndex;
use docqa_core::models::{Document, RetrievalResult};
use docqa_core::retrieve::{Retriever, Session};
use docqa_core::Result;
use tracing::info;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::synthesize::AnswerSynthesizer;

pub struct DocQa {
    chunking: ChunkConfig,
    top_k: usize,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

impl DocQa {
    /// Build providers from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
        let generator =
            create_generator(&config.generation).context("Failed to create generator")?;
        Ok(Self::with_providers(config, embedder, generator))
    }

    /// Build around caller-supplied providers.
    pub fn with_providers(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let retriever = Retriever::new(embedder)
            .with_batch_size(config.embedding.batch_size)
            .with_concurrency(config.embedding.concurrency);
        let synthesizer =
            AnswerSynthesizer::from_config(generator, &config.generation, &config.retrieval);
        Self {
            chunking: config.chunking.to_chunk_config(),
            top_k: config.retrieval.top_k,
            retriever,
            synthesizer,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn model_name(&self) -> &str {
        self.retriever.embedder().model_name()
    }

    /// Chunk, embed, and index `documents` without touching any session.
    pub async fn build_index(&self, documents: &[Document]) -> Result<VectorIndex> {
        self.retriever.build_index(documents, &self.chunking).await
    }

    /// Build an index for `documents` and make it the session's active index.
    pub async fn process(
        &self,
        session: &mut Session,
        documents: &[Document],
    ) -> Result<Arc<VectorIndex>> {
        session.process(&self.retriever, documents, &self.chunking).await
    }

    /// Ranked chunks for `question`; `k` defaults to `[retrieval].top_k`.
    pub async fn search(
        &self,
        session: &Session,
        question: &str,
        k: Option<usize>,
    ) -> Result<RetrievalResult> {
        session
            .retrieve(&self.retriever, question, k.unwrap_or(self.top_k))
            .await
    }

    /// Retrieve, then synthesize an answer.
    pub async fn ask(&self, session: &Session, question: &str, k: Option<usize>) -> Result<Answer> {
        let retrieved = self.search(session, question, k).await?;
        let answer = self.synthesizer.answer(question, &retrieved).await?;
        info!(
            retrieved = retrieved.len(),
            sources = answer.sources.len(),
            outcome = ?answer.outcome,
            "answered"
        );
        Ok(answer)
    }

    /// Open a session on the index persisted at `dir`, checked against the
    /// configured embedding model.
    pub fn open_session(&self, dir: &Path) -> Result<Session> {
        let mut session = Session::new();
        session.restore(dir, self.model_name())?;
        Ok(session)
    }
}
