//! # docqa-rag
//!
//! Retrieval-augmented question answering over document corpora.
//!
//! ## Overview
//!
//! Ingestion splits extracted document text into overlapping chunks, embeds
//! them, and rebuilds a persisted vector collection. Querying embeds the
//! question with the same model, retrieves the top-k most similar chunks,
//! asks a generative model to answer from that context only, and extracts a
//! JSON answer from the completion when one is present.
//!
//! | Component | Type |
//! |---|---|
//! | Chunker | [`RecursiveChunker`] |
//! | Embedding service | [`EmbeddingProvider`], [`ollama::OllamaEmbeddingProvider`] |
//! | Vector index | [`VectorStore`], [`FileVectorStore`], [`InMemoryVectorStore`] |
//! | Retriever | [`Retriever`] |
//! | Prompt builder | [`PromptTemplate`] |
//! | Answer service | [`AnswerService`], [`ollama::OllamaAnswerService`] |
//! | Response parser | [`parse_answer`], [`extract_json`] |
//! | Orchestrator | [`RagPipeline`] |
//!
//! ## Features
//!
//! - `ollama` (default) – embedding and generation through an Ollama server.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod generation;
pub mod inmemory;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod response;
pub mod retriever;
pub mod service;
pub mod vectorstore;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{Device, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::{EmbeddingProvider, l2_normalize};
pub use error::{RagError, Result};
pub use filestore::FileVectorStore;
pub use generation::AnswerService;
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{IngestReport, QueryOutcome, RagPipeline, RagPipelineBuilder};
pub use prompt::{PromptTemplate, format_context};
pub use response::{Answer, extract_json, parse_answer};
pub use retriever::Retriever;
pub use service::{CallPolicy, RetryPolicy, call_with_deadline};
pub use vectorstore::{CollectionInfo, CollectionSpec, VectorSpace, VectorStore};
