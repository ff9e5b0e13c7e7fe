//! # docqa
//!
//! Retrieval-augmented question answering over your own documents.
//!
//! A document set is chunked, embedded, and held in an in-memory vector
//! index; questions are embedded, matched against the index, and answered by
//! a text-generation model that is told to use only the retrieved context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────┐
//! │ Extract  │──▶│ Chunk + Embed │──▶│ VectorIndex │
//! │ txt/pdf  │   │  (Retriever)  │   │  (Session)  │
//! └──────────┘   └───────────────┘   └──────┬──────┘
//!                                           │ top-k
//!                                           ▼
//!                                  ┌─────────────────┐
//!                                  │AnswerSynthesizer│
//!                                  └────────┬────────┘
//!                              ┌────────────┴───────────┐
//!                              ▼                        ▼
//!                         ┌─────────┐              ┌─────────┐
//!                         │   CLI   │              │  HTTP   │
//!                         └─────────┘              └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa process ./papers            # build and save an index
//! docqa ask "What produces ATP?"    # answer from the saved index
//! docqa serve                       # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Text-generation providers |
//! | [`synthesize`] | Timeout and retry around generation |
//! | [`extract`] | Text extraction from files |
//! | [`app`] | Service wiring config to retriever and synthesizer |
//! | [`server`] | HTTP server |
//!
//! The algorithms themselves (chunking, indexing, retrieval, prompt
//! construction) live in the `docqa-core` crate.

pub mod app;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod server;
pub mod synthesize;
