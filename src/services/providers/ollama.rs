/// Ollama client for embeddings and text generation
///
/// One HTTP client serves both roles; the embedding and language models are
/// selected per request.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::Embedding,
    services::providers::{upstream_error, EmbeddingService, GenerationService},
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

impl EmbedResponse {
    fn into_embeddings(self, expected_len: usize) -> AppResult<Vec<Embedding>> {
        if self.embeddings.len() != expected_len {
            return Err(AppError::ExternalApi(format!(
                "Ollama returned {} embeddings for {} inputs",
                self.embeddings.len(),
                expected_len
            )));
        }
        Ok(self.embeddings)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Clone)]
pub struct OllamaClient {
    http_client: HttpClient,
    base_url: String,
    language_model: String,
    embedding_model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        language_model: &str,
        embedding_model: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        if language_model.trim().is_empty() || embedding_model.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Ollama language and embedding models are required".to_string(),
            ));
        }

        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            language_model: language_model.to_string(),
            embedding_model: embedding_model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingService for OllamaClient {
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("Ollama", response).await);
        }

        let parsed: EmbedResponse = response.json().await?;
        let embeddings = parsed.into_embeddings(texts.len())?;

        tracing::debug!(
            count = embeddings.len(),
            model = %self.embedding_model,
            "Embeddings created"
        );

        Ok(embeddings)
    }
}

#[async_trait::async_trait]
impl GenerationService for OllamaClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.language_model,
            prompt,
            stream: false,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("Ollama", response).await);
        }

        let parsed: GenerateResponse = response.json().await?;

        tracing::debug!(
            model = %self.language_model,
            prompt_chars = prompt.len(),
            response_chars = parsed.response.len(),
            "Generation completed"
        );

        Ok(parsed.response)
    }
}
