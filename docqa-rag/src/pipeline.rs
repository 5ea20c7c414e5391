//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] composes two flows that share nothing but the
//! persisted vector index:
//!
//! - ingestion: documents → [`Chunker`] → [`EmbeddingProvider`] → [`VectorStore::rebuild`]
//! - query: question → [`Retriever`] → [`PromptTemplate`] → [`AnswerService`] → [`parse_answer`]
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagPipeline, RagConfig, FileVectorStore, RecursiveChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(config.clone())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(FileVectorStore::new(&config.vector_db)))
//!     .chunker(Arc::new(RecursiveChunker::from_config(&config)?))
//!     .answer_service(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! let outcome = pipeline.answer("What is the invoice number?").await?;
//! println!("{}", outcome.answer);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::{EmbeddingProvider, is_unit_norm};
use crate::error::{RagError, Result};
use crate::generation::AnswerService;
use crate::prompt::PromptTemplate;
use crate::response::{Answer, parse_answer};
use crate::retriever::Retriever;
use crate::service::CallPolicy;
use crate::vectorstore::{CollectionSpec, VectorStore};

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// The rebuilt collection.
    pub collection: String,
    /// Number of documents ingested.
    pub document_count: usize,
    /// Number of chunks stored.
    pub chunk_count: usize,
    /// Identifier of the new collection generation.
    pub generation: String,
}

/// The result of answering one question.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// The structured or raw answer.
    pub answer: Answer,
    /// The chunks the answer was grounded in, best first.
    pub context: Vec<SearchResult>,
    /// Wall-clock time spent answering.
    pub elapsed: Duration,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`] or, with the `ollama`
/// feature, [`RagPipeline::from_config`]. Concurrent ingestion is left to
/// the vector store, which publishes one complete collection per rebuild.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    answer_service: Arc<dyn AnswerService>,
    prompt: PromptTemplate,
    retriever: Retriever,
    call_policy: CallPolicy,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Build a pipeline from configuration alone: Ollama models, a
    /// [`FileVectorStore`](crate::FileVectorStore) at `VECTOR_DB`, and a
    /// [`RecursiveChunker`](crate::RecursiveChunker).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for invalid configuration and
    /// [`RagError::ModelLoadError`] if either model is unavailable.
    #[cfg(feature = "ollama")]
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        use crate::chunking::RecursiveChunker;
        use crate::filestore::FileVectorStore;
        use crate::ollama::{OllamaAnswerService, OllamaEmbeddingProvider};

        config.validate()?;
        let policy = CallPolicy::from_config(&config);

        info!(model = %config.embeddings, "loading embedding model");
        let embedder = policy
            .call("embedding service", || OllamaEmbeddingProvider::connect(&config))
            .await?;

        info!(model = %config.llm, "loading generative model");
        let llm = policy.call("answer service", || OllamaAnswerService::connect(&config)).await?;

        Self::builder()
            .chunker(Arc::new(RecursiveChunker::from_config(&config)?))
            .vector_store(Arc::new(FileVectorStore::new(config.vector_db.clone())))
            .embedding_provider(Arc::new(embedder))
            .answer_service(Arc::new(llm))
            .config(config)
            .build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Return a reference to the prompt template.
    pub fn prompt_template(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// The [`CollectionSpec`] that an ingestion with this pipeline records.
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            name: self.config.collection_name.clone(),
            space: self.config.vector_space,
            dimensions: self.embedding_provider.dimensions(),
            embedding_model: self.embedding_provider.model_id().to_string(),
            normalized: self.embedding_provider.normalized(),
        }
    }

    /// Replace the configured collection with the chunks of `documents`.
    ///
    /// The run is all-or-nothing: every chunk is embedded before the store
    /// is touched.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexRebuildError`] if the documents contain no
    /// text or the store fails, and the embedding provider's error (after the
    /// call policy's deadline and retries) if embedding fails. The previous
    /// collection is left in place in all cases except a failed store write.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let collection = self.config.collection_name.clone();

        // 1. Chunk every document
        let mut chunks: Vec<Chunk> =
            documents.iter().flat_map(|document| self.chunker.chunk(document)).collect();
        info!(collection = %collection, documents = documents.len(), chunk_count = chunks.len(), "chunked documents");

        if chunks.is_empty() {
            return Err(RagError::IndexRebuildError {
                collection,
                message: "documents contain no text; the collection was not replaced".to_string(),
            });
        }

        // 2. Embed in one ordered batch
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self
            .call_policy
            .call("embedding service", || self.embedding_provider.embed_batch(&texts))
            .await
            .inspect_err(|e| error!(collection = %collection, error = %e, "embedding failed during ingestion"))?;
        self.check_embeddings(&chunks, &embeddings)?;

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        // 3. Replace the collection
        let spec = self.collection_spec();
        let info = self.vector_store.rebuild(&spec, &chunks).await.map_err(|e| {
            error!(collection = %collection, error = %e, "collection rebuild failed");
            match e {
                rebuild @ RagError::IndexRebuildError { .. } => rebuild,
                other => RagError::IndexRebuildError {
                    collection: collection.clone(),
                    message: other.to_string(),
                },
            }
        })?;

        info!(collection = %collection, chunk_count = info.count, generation = %info.generation, "ingestion complete");
        Ok(IngestReport {
            collection,
            document_count: documents.len(),
            chunk_count: info.count,
            generation: info.generation,
        })
    }

    /// Verify one vector per chunk, of the provider's dimension, unit-norm when normalized.
    fn check_embeddings(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        let provider = self.embedding_provider.model_id();
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: provider.to_string(),
                message: format!(
                    "requested {} embeddings, received {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        let dimensions = self.embedding_provider.dimensions();
        let normalized = self.embedding_provider.normalized();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            if embedding.len() != dimensions {
                return Err(RagError::EmbeddingError {
                    provider: provider.to_string(),
                    message: format!(
                        "chunk '{}' embedded to {} dimensions, expected {dimensions}",
                        chunk.id,
                        embedding.len()
                    ),
                });
            }
            if normalized && !is_unit_norm(embedding) {
                return Err(RagError::EmbeddingError {
                    provider: provider.to_string(),
                    message: format!("chunk '{}' embedding is not unit-normalized", chunk.id),
                });
            }
        }
        Ok(())
    }

    /// Return the chunks most relevant to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.retriever.retrieve(query).await
    }

    /// Answer `query` from the configured collection.
    ///
    /// # Errors
    ///
    /// Returns the retriever's or the answer service's error. A generated
    /// text that is not valid JSON is not an error; it is returned as
    /// [`Answer::Raw`].
    pub async fn answer(&self, query: &str) -> Result<QueryOutcome> {
        let start = Instant::now();

        // 1. Retrieve grounding context
        let context = self.retriever.retrieve(query).await.inspect_err(|e| {
            error!(error = %e, "retrieval failed");
        })?;

        // 2. Build the prompt and generate
        let prompt = self.prompt.build(&context, query);
        let raw = self
            .call_policy
            .call("answer service", || self.answer_service.generate(&prompt))
            .await
            .inspect_err(|e| error!(model = self.answer_service.model_id(), error = %e, "generation failed"))?;

        // 3. Extract a structured answer when present
        let answer = parse_answer(&raw);
        let elapsed = start.elapsed();

        info!(
            context_chunks = context.len(),
            structured = answer.as_structured().is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "query answered"
        );
        Ok(QueryOutcome { answer, context, elapsed })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// All fields except `prompt_template` and `call_policy` are required. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .chunker(Arc::new(chunker))
///     .answer_service(Arc::new(llm))
///     .prompt_template(template)  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    answer_service: Option<Arc<dyn AnswerService>>,
    prompt_template: Option<PromptTemplate>,
    call_policy: Option<CallPolicy>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the answer service.
    pub fn answer_service(mut self, service: Arc<dyn AnswerService>) -> Self {
        self.answer_service = Some(service);
        self
    }

    /// Override the default grounded prompt template.
    pub fn prompt_template(mut self, template: PromptTemplate) -> Self {
        self.prompt_template = Some(template);
        self
    }

    /// Override the deadline and retry policy derived from the configuration.
    pub fn call_policy(mut self, policy: CallPolicy) -> Self {
        self.call_policy = Some(policy);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;
        let answer_service = self
            .answer_service
            .ok_or_else(|| RagError::ConfigError("answer_service is required".to_string()))?;

        let call_policy = self.call_policy.unwrap_or_else(|| CallPolicy::from_config(&config));
        let retriever = Retriever::new(
            Arc::clone(&embedding_provider),
            Arc::clone(&vector_store),
            config.collection_name.clone(),
            config.num_results,
        )?
        .with_call_policy(call_policy);

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            answer_service,
            prompt: self.prompt_template.unwrap_or_default(),
            retriever,
            call_policy,
        })
    }
}
