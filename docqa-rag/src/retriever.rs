//! Top-k retrieval over a collection.

use std::sync::Arc;

use tracing::{debug, error};

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::service::CallPolicy;
use crate::vectorstore::{CollectionSpec, VectorStore};

/// Embeds a query and returns the most similar chunks of one collection.
///
/// Every retrieval checks that the collection was built by the same
/// embedding model, with the same dimension and normalization, as this
/// retriever's provider, both before embedding the query and against the
/// collection the search actually ran on. A mismatch would rank chunks meaninglessly without
/// any other error, so it is reported as [`RagError::ConfigError`].
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    num_results: usize,
    call_policy: CallPolicy,
}

impl Retriever {
    /// Create a retriever returning `num_results` chunks per query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `num_results` is zero.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        num_results: usize,
    ) -> Result<Self> {
        if num_results == 0 {
            return Err(RagError::ConfigError("num_results must be greater than zero".to_string()));
        }
        Ok(Self {
            embedding_provider,
            vector_store,
            collection: collection.into(),
            num_results,
            call_policy: CallPolicy::default(),
        })
    }

    /// Apply a deadline and retry policy to query embedding.
    pub fn with_call_policy(mut self, policy: CallPolicy) -> Self {
        self.call_policy = policy;
        self
    }

    /// The collection searched by this retriever.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The number of chunks returned per query.
    pub fn num_results(&self) -> usize {
        self.num_results
    }

    /// Check that `spec` was built in this retriever's embedding space.
    pub fn check_compatible(&self, spec: &CollectionSpec) -> Result<()> {
        let provider = &self.embedding_provider;
        if spec.embedding_model != provider.model_id()
            || spec.dimensions != provider.dimensions()
            || spec.normalized != provider.normalized()
        {
            error!(
                collection = %spec.name,
                stored_model = %spec.embedding_model,
                query_model = provider.model_id(),
                "embedding configuration differs from the collection"
            );
            return Err(RagError::ConfigError(format!(
                "collection '{}' was built with model '{}' ({} dims, normalized={}) but queries \
                 use '{}' ({} dims, normalized={}); re-run ingestion",
                spec.name,
                spec.embedding_model,
                spec.dimensions,
                spec.normalized,
                provider.model_id(),
                provider.dimensions(),
                provider.normalized()
            )));
        }
        Ok(())
    }

    /// Return the chunks most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the collection has not been
    /// built, [`RagError::ConfigError`] if it was built in another embedding
    /// space, or the embedding provider's error.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let info = self.vector_store.info(&self.collection).await?.ok_or_else(|| {
            RagError::VectorStoreError {
                backend: "retriever".to_string(),
                message: format!(
                    "collection '{}' does not exist; ingest documents first",
                    self.collection
                ),
            }
        })?;
        self.check_compatible(&info.spec)?;

        let embedding = self
            .call_policy
            .call("embedding service", || self.embedding_provider.embed(query))
            .await?;

        // A rebuild may have replaced the collection since the check above.
        let (searched, results) =
            self.vector_store.search_with_info(&self.collection, &embedding, self.num_results).await?;
        self.check_compatible(&searched.spec)?;
        debug!(collection = %self.collection, result_count = results.len(), "retrieved context");
        Ok(results)
    }
}
