//! Text embedding seam and vector norm helpers.

use async_trait::async_trait;

use crate::error::Result;

/// Tolerance used when checking that a vector has unit L2 norm.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// Maps text to fixed-length vectors.
///
/// [`embed_batch`](EmbeddingProvider::embed_batch) returns one vector per
/// input, in input order. Its default embeds one text at a time.
///
/// The same provider configuration must be used at ingestion and query time:
/// [`model_id`](EmbeddingProvider::model_id), [`dimensions`](EmbeddingProvider::dimensions)
/// and [`normalized`](EmbeddingProvider::normalized) are recorded with every
/// collection and checked before each search.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::EmbeddingProvider;
///
/// let vector = embedder.embed("What is the invoice number?").await?;
/// assert_eq!(vector.len(), embedder.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every produced vector.
    fn dimensions(&self) -> usize;

    /// The embedding model identifier.
    fn model_id(&self) -> &str;

    /// Whether every produced vector has unit L2 norm.
    fn normalized(&self) -> bool {
        false
    }
}

/// Scale a vector in place to unit L2 norm. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// The L2 norm of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Whether a vector's L2 norm is within [`UNIT_NORM_TOLERANCE`] of 1.0.
pub fn is_unit_norm(vector: &[f32]) -> bool {
    (l2_norm(vector) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}
