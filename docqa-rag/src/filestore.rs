//! File-persisted vector store.
//!
//! [`FileVectorStore`] keeps each collection in its own directory under a
//! root path:
//!
//! ```text
//! <root>/<collection>.lock                 held while a writer runs
//! <root>/<collection>/CURRENT              name of the live generation
//! <root>/<collection>/gen-<uuid>/index.json
//! ```
//!
//! A generation is written once and never modified. A rebuild writes a new
//! generation, then replaces `CURRENT` with a rename, then removes the
//! generations it superseded. Readers resolve `CURRENT` first, so they see
//! either the previous collection or the new one, never a partial or empty
//! one. A crash before the rename leaves the previous collection live.
//!
//! Writers of one collection exclude each other whichever store instance or
//! process they run in. Inside a process they queue on a mutex keyed by the
//! canonical collection path; across processes they take the lock file,
//! which is created with `create_new` and removed when the writer finishes.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionInfo, CollectionSpec, VectorStore, rank, validate_chunks};

const BACKEND: &str = "File";
const CURRENT_FILE: &str = "CURRENT";
const INDEX_FILE: &str = "index.json";
const GENERATION_PREFIX: &str = "gen-";
const LOCK_EXTENSION: &str = "lock";

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Attempts to resolve `CURRENT` when a concurrent rebuild removes the
/// generation a reader just resolved.
const MAX_LOAD_ATTEMPTS: usize = 3;

/// In-process writer locks, keyed by canonical collection directory.
static WRITERS: LazyLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(Default::default);

/// Exclusive write access to one collection. Dropping it removes the lock file.
#[derive(Debug)]
struct WriterLock {
    path: PathBuf,
    _local: OwnedMutexGuard<()>,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}

/// The on-disk contents of one generation.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    info: CollectionInfo,
    chunks: Vec<Chunk>,
}

/// A vector store persisted as JSON files under a root directory.
///
/// Loaded generations are cached in memory and reloaded when `CURRENT`
/// changes, including when another process rebuilt the collection. Rebuilds
/// and deletes of a collection are serialized across every store sharing its
/// root, in this process or another. A writer waits up to the lock timeout
/// for the others; a lock file left by a crashed process has to be removed by
/// hand.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::new("vectorstore/db");
/// store.rebuild(&spec, &chunks).await?;
/// let results = store.search("rag", &query_embedding, 2).await?;
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<IndexFile>>>,
    lock_timeout: Duration,
}

impl FileVectorStore {
    /// Create a store rooted at `root`. The directory is created on first rebuild.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long a writer waits for another writer of the same collection.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("invalid collection name '{name}'"),
            });
        }
        Ok(self.root.join(name))
    }

    /// Take the writer lock of collection `name`.
    async fn lock_collection(&self, name: &str) -> std::result::Result<WriterLock, String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| format!("cannot create {}: {e}", self.root.display()))?;
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| format!("cannot resolve {}: {e}", self.root.display()))?;

        let local = {
            let mut writers = WRITERS.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(writers.entry(root.join(name)).or_default())
        };
        let deadline = tokio::time::Instant::now() + self.lock_timeout;
        let local = tokio::time::timeout_at(deadline, local.lock_owned()).await.map_err(|_| {
            format!("timed out waiting for another writer of collection '{name}'")
        })?;

        let path = root.join(format!("{name}.{LOCK_EXTENSION}"));
        loop {
            let created =
                tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await;
            match created {
                Ok(mut file) => {
                    // Holder pid, for clearing a stale lock.
                    let _ = file.write_all(std::process::id().to_string().as_bytes()).await;
                    let _ = file.flush().await;
                    return Ok(WriterLock { path, _local: local });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(format!(
                            "collection '{name}' is locked by another process; remove {} if no \
                             rebuild is running",
                            path.display()
                        ));
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(format!("cannot create {}: {e}", path.display())),
            }
        }
    }

    /// Read the live generation name, or `None` if the collection was never built.
    async fn current_generation(dir: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(dir.join(CURRENT_FILE)).await {
            Ok(generation) => Ok(Some(generation.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_error(format!("cannot read {}: {e}", dir.display()))),
        }
    }

    /// Resolve and load the live generation of a collection.
    async fn load(&self, name: &str) -> Result<Option<Arc<IndexFile>>> {
        let dir = self.collection_dir(name)?;

        for _ in 0..MAX_LOAD_ATTEMPTS {
            let Some(generation) = Self::current_generation(&dir).await? else {
                return Ok(None);
            };

            if let Some(cached) = self.cache.read().await.get(name) {
                if cached.info.generation == generation {
                    return Ok(Some(Arc::clone(cached)));
                }
            }

            let path = dir.join(&generation).join(INDEX_FILE);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Superseded between reading CURRENT and opening the file.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(store_error(format!("cannot read {}: {e}", path.display())));
                }
            };
            let index: IndexFile = serde_json::from_slice(&bytes)
                .map_err(|e| store_error(format!("corrupt index {}: {e}", path.display())))?;

            debug!(collection = name, %generation, count = index.chunks.len(), "loaded collection");
            let index = Arc::new(index);
            self.cache.write().await.insert(name.to_string(), Arc::clone(&index));
            return Ok(Some(index));
        }

        Err(store_error(format!("collection '{name}' kept changing while being loaded")))
    }

    async fn write_generation(
        dir: &Path,
        generation: &str,
        index: &IndexFile,
    ) -> std::result::Result<(), String> {
        let generation_dir = dir.join(generation);
        tokio::fs::create_dir_all(&generation_dir)
            .await
            .map_err(|e| format!("cannot create {}: {e}", generation_dir.display()))?;

        let bytes = serde_json::to_vec(index).map_err(|e| format!("cannot serialize index: {e}"))?;
        write_synced(&generation_dir.join(INDEX_FILE), &bytes).await?;

        let staged = dir.join(format!("{CURRENT_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        let published = match write_synced(&staged, generation.as_bytes()).await {
            Ok(()) => tokio::fs::rename(&staged, dir.join(CURRENT_FILE))
                .await
                .map_err(|e| format!("cannot publish generation {generation}: {e}")),
            Err(message) => Err(message),
        };
        if published.is_err() {
            let _ = tokio::fs::remove_file(&staged).await;
        }
        published
    }

    /// Remove every generation except `own` and the one `CURRENT` names.
    /// Failures are logged only.
    async fn remove_stale_generations(dir: &Path, own: &str) {
        let current = match Self::current_generation(dir).await {
            Ok(current) => current,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping cleanup, CURRENT is unreadable");
                return;
            }
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list generations for cleanup");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let live = name == own || current.as_deref() == Some(name.as_str());
            if name.starts_with(GENERATION_PREFIX) && !live {
                if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
                    warn!(generation = %name, error = %e, "failed to remove superseded generation");
                }
            }
        }
    }
}

fn store_error(message: String) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::result::Result<(), String> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| format!("cannot create {}: {e}", path.display()))?;
    file.write_all(bytes).await.map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    file.sync_all().await.map_err(|e| format!("cannot sync {}: {e}", path.display()))
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn rebuild(&self, spec: &CollectionSpec, chunks: &[Chunk]) -> Result<CollectionInfo> {
        let dir = self.collection_dir(&spec.name).map_err(|e| RagError::IndexRebuildError {
            collection: spec.name.clone(),
            message: e.to_string(),
        })?;
        validate_chunks(spec, chunks)?;

        let _lock = self.lock_collection(&spec.name).await.map_err(|message| {
            RagError::IndexRebuildError { collection: spec.name.clone(), message }
        })?;

        let generation = format!("{GENERATION_PREFIX}{}", uuid::Uuid::new_v4());
        let info = CollectionInfo {
            spec: spec.clone(),
            count: chunks.len(),
            generation: generation.clone(),
            built_at: Utc::now(),
        };
        let index = IndexFile { info: info.clone(), chunks: chunks.to_vec() };

        if let Err(message) = Self::write_generation(&dir, &generation, &index).await {
            // The previous CURRENT is untouched; drop the half-written generation.
            let _ = tokio::fs::remove_dir_all(dir.join(&generation)).await;
            return Err(RagError::IndexRebuildError { collection: spec.name.clone(), message });
        }

        self.cache.write().await.insert(spec.name.clone(), Arc::new(index));
        Self::remove_stale_generations(&dir, &generation).await;

        info!(collection = %spec.name, %generation, count = chunks.len(), "published collection");
        Ok(info)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let dir = self.collection_dir(name)?;
        let _lock = self.lock_collection(name).await.map_err(store_error)?;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(store_error(format!("cannot delete {}: {e}", dir.display()))),
        }
        self.cache.write().await.remove(name);
        debug!(collection = name, "deleted collection");
        Ok(())
    }

    async fn info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.load(name).await?.map(|index| index.info.clone()))
    }

    async fn search_with_info(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<(CollectionInfo, Vec<SearchResult>)> {
        let index = self
            .load(collection)
            .await?
            .ok_or_else(|| store_error(format!("collection '{collection}' does not exist")))?;
        let results = rank(BACKEND, &index.info.spec, index.chunks.iter(), embedding, top_k)?;
        Ok((index.info.clone(), results))
    }
}
