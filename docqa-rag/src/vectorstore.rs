//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, SearchResult};
use crate::embedding::l2_norm;
use crate::error::{RagError, Result};

/// The similarity space a collection is built and searched in.
///
/// A collection records its space when it is built and every search uses
/// that same [`similarity`](VectorSpace::similarity) definition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorSpace {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Squared Euclidean distance, negated so that higher is more similar.
    L2,
    /// Inner (dot) product.
    Ip,
}

impl VectorSpace {
    /// Score two vectors. Higher always means more similar.
    ///
    /// Cosine returns 0.0 if either vector has zero magnitude.
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            VectorSpace::Cosine => {
                let dot = dot(a, b);
                let norm_a = l2_norm(a);
                let norm_b = l2_norm(b);
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                dot / (norm_a * norm_b)
            }
            VectorSpace::L2 => -a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>(),
            VectorSpace::Ip => dot(a, b),
        }
    }

    /// The configuration identifier of this space.
    pub fn as_str(self) -> &'static str {
        match self {
            VectorSpace::Cosine => "cosine",
            VectorSpace::L2 => "l2",
            VectorSpace::Ip => "ip",
        }
    }
}

impl std::fmt::Display for VectorSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Everything a query needs to know to embed in the same space as the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Similarity space used for every search.
    pub space: VectorSpace,
    /// Dimension of every stored vector.
    pub dimensions: usize,
    /// Embedding model that produced the stored vectors.
    pub embedding_model: String,
    /// Whether the stored vectors are unit-normalized.
    pub normalized: bool,
}

/// A built collection as seen by readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionInfo {
    /// The configuration the collection was built with.
    pub spec: CollectionSpec,
    /// Number of stored chunks.
    pub count: usize,
    /// Identifier of the build that produced the collection.
    pub generation: String,
    /// When the collection was built.
    pub built_at: DateTime<Utc>,
}

/// A storage backend for vector embeddings with similarity search.
///
/// Collections are never updated in place: [`rebuild`](VectorStore::rebuild)
/// replaces a collection's entire contents.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.rebuild(&spec, &chunks).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the named collection with the given chunks.
    ///
    /// Chunks must have embeddings of `spec.dimensions` set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexRebuildError`] on failure.
    async fn rebuild(&self, spec: &CollectionSpec, chunks: &[Chunk]) -> Result<CollectionInfo>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Describe a collection, or `None` if it has never been built.
    async fn info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Search one snapshot of a collection and describe that same snapshot.
    ///
    /// The returned [`CollectionInfo`] is the one the results were ranked
    /// against, even if a rebuild publishes a new collection meanwhile.
    ///
    /// # Errors
    ///
    /// Same as [`VectorStore::search`].
    async fn search_with_info(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<(CollectionInfo, Vec<SearchResult>)>;

    /// Search for the `top_k` most similar chunks to the given embedding.
    ///
    /// Returns results ordered by descending similarity score. A collection
    /// with fewer than `top_k` entries returns all of them.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if `top_k == 0`, the collection
    /// does not exist, or the embedding has the wrong dimension.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        Ok(self.search_with_info(collection, embedding, top_k).await?.1)
    }
}

/// Reject chunks that cannot be stored under `spec`.
pub(crate) fn validate_chunks(spec: &CollectionSpec, chunks: &[Chunk]) -> Result<()> {
    if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != spec.dimensions) {
        return Err(RagError::IndexRebuildError {
            collection: spec.name.clone(),
            message: format!(
                "chunk '{}' has a {}-dimensional embedding, expected {}",
                bad.id,
                bad.embedding.len(),
                spec.dimensions
            ),
        });
    }
    Ok(())
}

/// Score every chunk against `query` and keep the `top_k` best.
pub(crate) fn rank<'a>(
    backend: &str,
    spec: &CollectionSpec,
    chunks: impl Iterator<Item = &'a Chunk>,
    query: &[f32],
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if top_k == 0 {
        return Err(RagError::VectorStoreError {
            backend: backend.to_string(),
            message: "top_k must be at least 1".to_string(),
        });
    }
    if query.len() != spec.dimensions {
        return Err(RagError::VectorStoreError {
            backend: backend.to_string(),
            message: format!(
                "query embedding has {} dimensions, collection '{}' stores {}",
                query.len(),
                spec.name,
                spec.dimensions
            ),
        });
    }

    let mut scored: Vec<SearchResult> = chunks
        .map(|chunk| SearchResult {
            score: spec.space.similarity(&chunk.embedding, query),
            chunk: chunk.clone(),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}
