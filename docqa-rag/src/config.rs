//! Configuration for the ingestion and query pipelines.
//!
//! Keys serialize in upper case so an existing `config.yml` such as
//!
//! ```yaml
//! CHUNK_SIZE: 500
//! CHUNK_OVERLAP: 50
//! EMBEDDINGS: nomic-embed-text
//! NORMALIZE_EMBEDDINGS: true
//! DEVICE: cpu
//! VECTOR_DB: vectorstore/db
//! COLLECTION_NAME: rag
//! VECTOR_SPACE: cosine
//! NUM_RESULTS: 2
//! LLM: llama3.2
//! TEMPERATURE: 0
//! ```
//!
//! loads without translation. Missing keys take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::vectorstore::VectorSpace;

/// Compute device hint for embedding inference.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Portable CPU-only inference.
    #[default]
    Cpu,
    /// NVIDIA accelerator.
    Cuda,
    /// Apple Metal accelerator.
    Mps,
}

impl Device {
    /// Whether inference must stay on the CPU.
    pub fn is_cpu(self) -> bool {
        matches!(self, Device::Cpu)
    }
}

/// Configuration parameters for ingestion and querying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Embedding model identifier.
    pub embeddings: String,
    /// Unit-normalize embedding vectors.
    pub normalize_embeddings: bool,
    /// Compute device hint for embedding inference.
    pub device: Device,
    /// Filesystem path of the persisted vector index.
    pub vector_db: PathBuf,
    /// Collection name within the index.
    pub collection_name: String,
    /// Similarity space the collection is built and searched in.
    pub vector_space: VectorSpace,
    /// Number of chunks to retrieve per query.
    pub num_results: usize,
    /// Generative model identifier.
    pub llm: String,
    /// Sampling temperature for generation.
    pub temperature: f32,
    /// Base URL of the Ollama server hosting both models.
    pub ollama_url: String,
    /// Deadline applied to each embedding and generation call.
    pub request_timeout_secs: u64,
    /// Retries after a timed-out service call.
    pub max_retries: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            embeddings: "nomic-embed-text".to_string(),
            normalize_embeddings: true,
            device: Device::Cpu,
            vector_db: PathBuf::from("vectorstore/db"),
            collection_name: "rag".to_string(),
            vector_space: VectorSpace::Cosine,
            num_results: 2,
            llm: "llama3.2".to_string(),
            temperature: 0.0,
            ollama_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
            max_retries: 0,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RagConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RagError::ConfigError(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("cannot read config file '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// The per-call deadline for external services.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `num_results == 0`
    /// - a model identifier or the collection name is empty
    /// - the collection name contains characters other than `[A-Za-z0-9_-]`
    /// - `temperature` is outside `[0, 2]`
    /// - `request_timeout_secs == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("CHUNK_SIZE must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "CHUNK_OVERLAP ({}) must be less than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.num_results == 0 {
            return Err(RagError::ConfigError("NUM_RESULTS must be greater than zero".to_string()));
        }
        if self.embeddings.trim().is_empty() {
            return Err(RagError::ConfigError("EMBEDDINGS must name a model".to_string()));
        }
        if self.llm.trim().is_empty() {
            return Err(RagError::ConfigError("LLM must name a model".to_string()));
        }
        if self.collection_name.is_empty()
            || !self.collection_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RagError::ConfigError(format!(
                "COLLECTION_NAME '{}' must be non-empty and contain only letters, digits, '_' or '-'",
                self.collection_name
            )));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "TEMPERATURE ({}) must be between 0 and 2",
                self.temperature
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the embedding model identifier.
    pub fn embeddings(mut self, model: impl Into<String>) -> Self {
        self.config.embeddings = model.into();
        self
    }

    /// Enable or disable unit normalization of embeddings.
    pub fn normalize_embeddings(mut self, normalize: bool) -> Self {
        self.config.normalize_embeddings = normalize;
        self
    }

    /// Set the compute device hint.
    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Set the persisted index location.
    pub fn vector_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vector_db = path.into();
        self
    }

    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the similarity space.
    pub fn vector_space(mut self, space: VectorSpace) -> Self {
        self.config.vector_space = space;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn num_results(mut self, k: usize) -> Self {
        self.config.num_results = k;
        self
    }

    /// Set the generative model identifier.
    pub fn llm(mut self, model: impl Into<String>) -> Self {
        self.config.llm = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the Ollama base URL.
    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_url = url.into();
        self
    }

    /// Set the per-call deadline in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set how many times a timed-out call is retried.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
