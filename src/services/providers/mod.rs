/// Collaborator abstractions for the recommendation pipeline
///
/// Each external system the pipeline talks to sits behind a trait so the
/// orchestrator can be built from substitute implementations. Clients are
/// long-lived, shared between requests and hold no per-request state.
use crate::{
    error::AppResult,
    models::{CatalogueEntry, Embedding, StoredRecord, VectorRecord},
};

pub mod ollama;
pub mod plex;
pub mod weaviate;

pub use ollama::OllamaClient;
pub use plex::PlexClient;
pub use weaviate::WeaviateBackend;

/// Source of library entries
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Most recently watched entries in a section, newest first, at most `limit`
    async fn recently_viewed(&self, section: &str, limit: usize)
        -> AppResult<Vec<CatalogueEntry>>;

    /// Every entry in a section
    async fn all_entries(&self, section: &str) -> AppResult<Vec<CatalogueEntry>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Turns text into vectors, one per input, in input order
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: &[String]) -> AppResult<Vec<Embedding>>;
}

/// Free-text generation from a single prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &str) -> AppResult<String>;
}

/// Storage and nearest-neighbour search for catalogue vectors
///
/// Ranking is entirely the backend's; callers never reorder results.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorBackend: Send + Sync {
    /// Creates the collection if it is absent
    async fn ensure_collection(&self) -> AppResult<()>;

    /// One page of stored records, starting after the record id `after`
    async fn list_page(&self, after: Option<String>, limit: usize)
        -> AppResult<Vec<StoredRecord>>;

    async fn insert_batch(&self, records: Vec<VectorRecord>) -> AppResult<()>;

    /// Up to `limit` entries nearest to the query vectors, combined into one search
    async fn near_vectors(
        &self,
        vectors: Vec<Embedding>,
        limit: usize,
    ) -> AppResult<Vec<CatalogueEntry>>;
}

/// Reads a non-success response into an `ExternalApi` error
pub(crate) async fn upstream_error(
    provider: &str,
    response: reqwest::Response,
) -> crate::error::AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        provider = provider,
        status = %status,
        body = %body,
        "External API request failed"
    );
    crate::error::AppError::ExternalApi(format!(
        "{} returned status {}: {}",
        provider, status, body
    ))
}
