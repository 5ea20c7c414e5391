//! Documents as ingested, the chunks they are split into, and ranked hits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The extracted text of one source file.
///
/// Documents only live for the duration of an ingestion run; the index
/// keeps their chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier, unique within one ingestion run. Usually the file stem.
    pub id: String,
    /// All pages of the file, concatenated.
    pub text: String,
    /// Copied onto every chunk of the document.
    pub metadata: HashMap<String, String>,
    /// Where the text came from, recorded as the `source` chunk field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Attach a source URI.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

/// A contiguous span of a [`Document`]'s text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{document_id}_{chunk_index}`.
    pub id: String,
    /// The chunk's span of the document text, verbatim.
    pub text: String,
    /// Empty until ingestion embeds the chunk.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Document metadata plus `chunk_index`, `start_char` and `source`.
    pub metadata: HashMap<String, String>,
    /// Id of the document the chunk was cut from.
    pub document_id: String,
}

/// One hit of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matching chunk.
    pub chunk: Chunk,
    /// Similarity to the query in the collection's space; larger is closer.
    pub score: f32,
}
