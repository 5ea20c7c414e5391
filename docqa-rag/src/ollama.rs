//! Embedding and answer services backed by an [Ollama](https://ollama.com) server.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{Device, RagConfig};
use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};
use crate::generation::AnswerService;

const PROVIDER: &str = "Ollama";

/// Inputs sent per `/api/embed` request.
const EMBED_BATCH_SIZE: usize = 32;

/// Text embedded once at load time to discover the model's output dimension.
const DIMENSION_SAMPLE: &str = "dimension sample";

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize, Default)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    options: Options,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Which side of the API a failure came from, for error classification.
#[derive(Clone, Copy)]
enum Api {
    Embed,
    Generate,
}

impl Api {
    fn failure(self, message: String) -> RagError {
        match self {
            Api::Embed => RagError::EmbeddingError { provider: PROVIDER.into(), message },
            Api::Generate => RagError::GenerationError { provider: PROVIDER.into(), message },
        }
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

/// POST `body` as JSON and decode the success response.
///
/// A 404 means the server does not know the model, which is reported as
/// [`RagError::ModelLoadError`].
async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    model: &str,
    api: Api,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let response = client.post(url).json(body).send().await.map_err(|e| {
        error!(provider = PROVIDER, url, error = %e, "request failed");
        api.failure(format!("request to {url} failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);

        error!(provider = PROVIDER, %status, model, "API error");
        if status == StatusCode::NOT_FOUND {
            return Err(RagError::ModelLoadError {
                provider: PROVIDER.into(),
                model: model.to_string(),
                message: detail,
            });
        }
        return Err(api.failure(format!("API returned {status}: {detail}")));
    }

    response.json::<R>().await.map_err(|e| {
        error!(provider = PROVIDER, error = %e, "failed to parse response");
        api.failure(format!("failed to parse response: {e}"))
    })
}

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// # Configuration
///
/// - `EMBEDDINGS` – the embedding model, which must already be pulled.
/// - `NORMALIZE_EMBEDDINGS` – scale every vector to unit length.
/// - `DEVICE` – `cpu` pins inference to the CPU (`num_gpu = 0`); other
///   values let the server choose.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::connect(&config).await?;
/// let embedding = provider.embed("hello world").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    normalize: bool,
    device: Device,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Load the configured embedding model and discover its output dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoadError`] if the server does not know the
    /// model, or [`RagError::EmbeddingError`] if the server is unreachable.
    pub async fn connect(config: &RagConfig) -> Result<Self> {
        Self::connect_with(
            reqwest::Client::new(),
            &config.ollama_url,
            &config.embeddings,
            config.normalize_embeddings,
            config.device,
        )
        .await
    }

    /// Load a model from an explicit server and client.
    pub async fn connect_with(
        client: reqwest::Client,
        base_url: &str,
        model: &str,
        normalize: bool,
        device: Device,
    ) -> Result<Self> {
        let mut provider = Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
            normalize,
            device,
            dimensions: 0,
        };

        let sample = provider.request(&[DIMENSION_SAMPLE]).await?;
        let dimensions = sample.first().map(Vec::len).unwrap_or_default();
        if dimensions == 0 {
            return Err(RagError::ModelLoadError {
                provider: PROVIDER.into(),
                model: model.to_string(),
                message: "model returned an empty embedding".into(),
            });
        }
        provider.dimensions = dimensions;

        info!(provider = PROVIDER, model, dimensions, normalize, ?device, "embedding model loaded");
        Ok(provider)
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
            options: Options { num_gpu: self.device.is_cpu().then_some(0), temperature: None },
        };
        let response: EmbedResponse = post_json(
            &self.client,
            &endpoint(&self.base_url, "api/embed"),
            &self.model,
            Api::Embed,
            &body,
        )
        .await?;

        if response.embeddings.len() != texts.len() {
            return Err(Api::Embed.failure(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Api::Embed.failure("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            debug!(provider = PROVIDER, batch_size = batch.len(), model = %self.model, "embedding batch");

            for mut embedding in self.request(batch).await? {
                if embedding.len() != self.dimensions {
                    return Err(Api::Embed.failure(format!(
                        "model returned {} dimensions, expected {}",
                        embedding.len(),
                        self.dimensions
                    )));
                }
                if self.normalize {
                    l2_normalize(&mut embedding);
                }
                results.push(embedding);
            }
        }

        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn normalized(&self) -> bool {
        self.normalize
    }
}

/// An [`AnswerService`] backed by Ollama's `/api/generate` endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::ollama::OllamaAnswerService;
///
/// let llm = OllamaAnswerService::connect(&config).await?;
/// let text = llm.generate("Why is the sky blue?").await?;
/// ```
#[derive(Debug, Clone)]
pub struct OllamaAnswerService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaAnswerService {
    /// Check that the configured generative model is available.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelLoadError`] if the server does not know the model.
    pub async fn connect(config: &RagConfig) -> Result<Self> {
        Self::connect_with(reqwest::Client::new(), &config.ollama_url, &config.llm, config.temperature)
            .await
    }

    /// Check a model on an explicit server and client.
    pub async fn connect_with(
        client: reqwest::Client,
        base_url: &str,
        model: &str,
        temperature: f32,
    ) -> Result<Self> {
        let _: serde_json::Value = post_json(
            &client,
            &endpoint(base_url, "api/show"),
            model,
            Api::Generate,
            &ShowRequest { model },
        )
        .await?;

        info!(provider = PROVIDER, model, temperature, "generative model available");
        Ok(Self { client, base_url: base_url.to_string(), model: model.to_string(), temperature })
    }
}

#[async_trait]
impl AnswerService for OllamaAnswerService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "generating");

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: Options { num_gpu: None, temperature: Some(self.temperature) },
        };
        let response: GenerateResponse = post_json(
            &self.client,
            &endpoint(&self.base_url, "api/generate"),
            &self.model,
            Api::Generate,
            &body,
        )
        .await?;

        Ok(response.response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
