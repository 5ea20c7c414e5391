//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a non-persistent vector
//! store backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for development, testing, and one-shot use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionInfo, CollectionSpec, VectorStore, rank, validate_chunks};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct StoredCollection {
    info: CollectionInfo,
    chunks: Vec<Chunk>,
}

/// An in-memory vector store searching by exhaustive scan.
///
/// A rebuild prepares the complete new collection before taking the write
/// lock, so readers observe either the old or the new contents.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.rebuild(&spec, &chunks).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Arc<StoredCollection>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn collection(&self, name: &str) -> Result<Arc<StoredCollection>> {
        let collections = self.collections.read().await;
        collections.get(name).cloned().ok_or_else(|| RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("collection '{name}' does not exist"),
        })
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn rebuild(&self, spec: &CollectionSpec, chunks: &[Chunk]) -> Result<CollectionInfo> {
        validate_chunks(spec, chunks)?;

        let info = CollectionInfo {
            spec: spec.clone(),
            count: chunks.len(),
            generation: uuid::Uuid::new_v4().to_string(),
            built_at: Utc::now(),
        };
        let stored = Arc::new(StoredCollection { info: info.clone(), chunks: chunks.to_vec() });

        self.collections.write().await.insert(spec.name.clone(), stored);
        debug!(collection = %spec.name, count = chunks.len(), "rebuilt in-memory collection");
        Ok(info)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.read().await.get(name).map(|c| c.info.clone()))
    }

    async fn search_with_info(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<(CollectionInfo, Vec<SearchResult>)> {
        let stored = self.collection(collection).await?;
        let results = rank(BACKEND, &stored.info.spec, stored.chunks.iter(), embedding, top_k)?;
        Ok((stored.info.clone(), results))
    }
}
