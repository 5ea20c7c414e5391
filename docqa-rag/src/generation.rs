//! Answer service trait for text generation.

use async_trait::async_trait;

use crate::error::Result;

/// A generative model that completes a prompt.
///
/// Implementations perform one outbound call per [`generate`](AnswerService::generate)
/// and no retries; deadlines and retry policy are applied by the caller.
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Return the model's raw text completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Return the identifier of the underlying generative model.
    fn model_id(&self) -> &str;
}
