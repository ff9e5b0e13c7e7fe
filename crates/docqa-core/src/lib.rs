//! # docqa core
//!
//! Pure retrieval logic for docqa: data models, chunking, the embedding
//! boundary, the vector index, the retrieval session, and the contract
//! with a text-generation capability.
//!
//! This crate does no network I/O and holds no provider code. Concrete
//! embedders and generators live in the `docqa` application package and
//! are passed in through the [`embedding::Embedder`] and
//! [`answer::Generator`] traits.
//!
//! ```text
//! text ─▶ chunk ─▶ Embedder ─▶ VectorIndex ─▶ (persisted)
//! question ─▶ Embedder ─▶ VectorIndex::query ─▶ RetrievalResult ─▶ prompt ─▶ Generator
//! ```

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod retrieve;

pub use error::{RagError, Result};
