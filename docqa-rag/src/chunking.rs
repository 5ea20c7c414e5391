//! Document chunking.
//!
//! [`RecursiveChunker`] splits text into windows of at most `chunk_size`
//! characters. Consecutive windows share exactly `chunk_overlap` characters,
//! so dropping the first `chunk_overlap` characters of every chunk after the
//! first and concatenating reconstructs the source text.
//!
//! Each window ends at the best natural boundary available: a paragraph break,
//! then a line break, then a sentence end, then a word break. Only when none
//! of these fall inside the window is the text cut at exactly `chunk_size`.

use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Boundaries tried in order of preference. A window ends after the separator.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text at paragraph, sentence, then word boundaries with a fixed overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `start_char` fields,
/// and `source` when the document has a source URI.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`, since no window could then make progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from the `CHUNK_SIZE` and `CHUNK_OVERLAP` settings.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into `(start_char, text)` windows.
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every character, plus the end of the text.
        let offsets: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let total = offsets.len() - 1;

        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            let limit = start + self.chunk_size;
            if limit >= total {
                windows.push((start, &text[offsets[start]..]));
                break;
            }

            // Ending past `start + overlap` guarantees the next window starts later.
            let min_end = start + self.chunk_overlap + 1;
            let end = natural_boundary(text, &offsets, start, min_end, limit).unwrap_or(limit);
            windows.push((start, &text[offsets[start]..offsets[end]]));
            start = end - self.chunk_overlap;
        }

        windows
    }
}

/// Find the last cut point in `min_end..=max_end` (character indices) that
/// follows the highest-priority separator present in the window.
fn natural_boundary(
    text: &str,
    offsets: &[usize],
    start: usize,
    min_end: usize,
    max_end: usize,
) -> Option<usize> {
    let base = offsets[start];
    let window = &text[base..offsets[max_end]];

    SEPARATORS.iter().find_map(|separator| {
        let (idx, _) = window.rmatch_indices(separator).next()?;
        let cut = offsets.binary_search(&(base + idx + separator.len())).ok()?;
        (cut >= min_end).then_some(cut)
    })
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, (start_char, text))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), i.to_string());
                metadata.insert("start_char".to_string(), start_char.to_string());
                if let Some(uri) = &document.source_uri {
                    metadata.insert("source".to_string(), uri.clone());
                }
                Chunk {
                    id: format!("{}_{i}", document.id),
                    text: text.to_string(),
                    embedding: Vec::new(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunker: &RecursiveChunker, text: &str) -> Vec<String> {
        chunker.split_text(text).into_iter().map(|(_, t)| t.to_string()).collect()
    }

    #[test]
    fn rejects_overlap_equal_to_size() {
        assert!(matches!(RecursiveChunker::new(10, 10), Err(RagError::ConfigError(_))));
        assert!(matches!(RecursiveChunker::new(10, 25), Err(RagError::ConfigError(_))));
        assert!(matches!(RecursiveChunker::new(0, 0), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = RecursiveChunker::new(10, 2).unwrap();
        assert!(chunker.chunk(&Document::new("empty", "")).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(100, 10).unwrap();
        assert_eq!(texts(&chunker, "Invoice INV-42."), vec!["Invoice INV-42."]);
    }

    #[test]
    fn prefers_paragraph_breaks_over_words() {
        let chunker = RecursiveChunker::new(30, 0).unwrap();
        let text = "First paragraph here.\n\nSecond one follows after.";
        let chunks = texts(&chunker, text);
        assert_eq!(chunks[0], "First paragraph here.\n\n");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn prefers_sentence_end_over_word_break() {
        let chunker = RecursiveChunker::new(24, 0).unwrap();
        let chunks = texts(&chunker, "One two. Three four five six");
        assert_eq!(chunks[0], "One two. ");
    }

    #[test]
    fn hard_cuts_when_no_boundary_exists() {
        let chunker = RecursiveChunker::new(4, 1).unwrap();
        assert_eq!(texts(&chunker, "abcdefghij"), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        let chunker = RecursiveChunker::new(20, 5).unwrap();
        let text = "The quick brown fox jumps over the lazy dog. It was not amused at all.";
        let chunks = texts(&chunker, text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let len = pair[0].chars().count();
            let tail: String = pair[0].chars().skip(len - 5).collect();
            let head: String = pair[1].chars().take(5).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunker = RecursiveChunker::new(3, 1).unwrap();
        let chunks = texts(&chunker, "äöüßéè");
        assert_eq!(chunks, vec!["äöü", "üßé", "éè"]);
    }

    #[test]
    fn chunk_metadata_records_position() {
        let mut document = Document::new("invoice.pdf", "abcdefghij");
        document.metadata.insert("source".to_string(), "invoice.pdf".to_string());
        let chunks = RecursiveChunker::new(4, 1).unwrap().chunk(&document);

        assert_eq!(chunks[1].id, "invoice.pdf_1");
        assert_eq!(chunks[1].document_id, "invoice.pdf");
        assert_eq!(chunks[1].metadata["chunk_index"], "1");
        assert_eq!(chunks[1].metadata["start_char"], "3");
        assert_eq!(chunks[1].metadata["source"], "invoice.pdf");
        assert!(chunks.iter().all(|c| c.embedding.is_empty()));
    }
}
