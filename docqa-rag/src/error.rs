//! Error types for the `docqa-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in ingestion and query operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The embedding or generation model could not be loaded by its service.
    #[error("Model load error ({provider}, model '{model}'): {message}")]
    ModelLoadError {
        /// The service that was asked to load the model.
        provider: String,
        /// The model identifier that failed to load.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// An external call exceeded its caller-imposed deadline.
    #[error("{service} did not respond within {timeout:?}")]
    ServiceTimeout {
        /// The service that timed out.
        service: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Generated text contained JSON-like delimiters but invalid content.
    #[error("Malformed answer: {0}")]
    MalformedAnswer(String),

    /// A collection rebuild failed. The previous collection must not be assumed to survive.
    #[error("Index rebuild error (collection '{collection}'): {message}")]
    IndexRebuildError {
        /// The collection being rebuilt.
        collection: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during answer generation.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The answer service that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Text could not be extracted from a source document.
    #[error("Extraction error ({source_name}): {message}")]
    ExtractionError {
        /// The document that failed to extract.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// A filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::ServiceTimeout { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
