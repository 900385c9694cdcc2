use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::{CacheBackend, Config, ResponseFormat},
    db::{
        create_pool, create_redis_client, CacheStore, MemoryCacheStore, PostgresCacheStore,
        RedisCacheStore,
    },
    services::{
        providers::{OllamaClient, PlexClient, WeaviateBackend},
        Orchestrator, PipelineSettings, VectorIndex,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub response_format: ResponseFormat,
    /// Deadline for one recommendation request
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        response_format: ResponseFormat,
        request_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            response_format,
            request_timeout,
        }
    }

    /// Connects every collaborator, prepares the vector collection and, when
    /// enabled, synchronizes the default library section before serving.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalogue = Arc::new(PlexClient::new(
            &config.plex_url,
            &config.plex_token,
            config.http_timeout(),
        )?);
        let ollama = Arc::new(OllamaClient::new(
            &config.ollama_url,
            &config.ollama_language_model,
            &config.ollama_embedding_model,
            config.generation_timeout(),
        )?);
        let backend = Arc::new(WeaviateBackend::new(
            &config.weaviate_url,
            &config.weaviate_class,
            config.http_timeout(),
        )?);

        let cache = create_cache_store(config).await?;

        let index = VectorIndex::new(backend, config.vector_sync_page_size);
        index.ensure_schema().await?;
        tracing::info!(class = %config.weaviate_class, "Vector collection ready");

        let orchestrator = Orchestrator::new(
            catalogue,
            ollama.clone(),
            ollama,
            cache,
            index,
            PipelineSettings::from_config(config),
        );

        if config.sync_on_startup {
            let report = orchestrator
                .synchronize(&config.plex_default_library_section)
                .await?;
            tracing::info!(
                section = %config.plex_default_library_section,
                catalogue = report.catalogue,
                inserted = report.inserted,
                "Startup synchronization complete"
            );
        }

        Ok(Self::new(
            Arc::new(orchestrator),
            config.response_format,
            config.request_timeout(),
        ))
    }
}

async fn create_cache_store(config: &Config) -> anyhow::Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Postgres => {
            let pool = create_pool(&config.database_url).await?;
            Arc::new(PostgresCacheStore::new(pool).await?)
        }
        CacheBackend::Redis => {
            let client = create_redis_client(&config.redis_url)?;
            Arc::new(RedisCacheStore::new(client).await?)
        }
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
    };

    tracing::info!(store = store.name(), "Cache store ready");
    Ok(store)
}
