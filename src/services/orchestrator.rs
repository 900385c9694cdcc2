//! The per-request recommendation pipeline.
//!
//! Recently viewed titles are fingerprinted and looked up in the cache. On a
//! miss they are embedded, the nearest catalogue entries are retrieved, the
//! full catalogue is fetched for grounding and the generation model is asked
//! for recommendations. Its output is normalized to JSON, grounded against the
//! catalogue and written back to the cache.
//!
//! A cache hit is returned as stored even if the catalogue has changed since.

use std::sync::Arc;

use tracing::instrument;

use crate::{
    config::{Config, NormalizationMode},
    db::{CacheFingerprint, CacheStore},
    error::{AppError, AppResult, PipelineStage, StageContext},
    models::{CatalogueEntry, RecommendationResult},
    services::{
        inflight::InFlight,
        normalize, prompts,
        providers::{CatalogueClient, EmbeddingService, GenerationService},
        validation,
        vector_index::{SyncReport, VectorIndex},
    },
};

/// Tunables for the pipeline, taken from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Recently viewed count used when a request gives no usable limit
    pub default_limit: usize,
    pub normalization_mode: NormalizationMode,
    pub max_repair_attempts: usize,
    pub coalesce_in_flight: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_limit: config.recent_movie_count.max(1),
            normalization_mode: config.normalization_mode,
            max_repair_attempts: config.max_repair_attempts,
            coalesce_in_flight: config.coalesce_in_flight,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_limit: 5,
            normalization_mode: NormalizationMode::Programmatic,
            max_repair_attempts: 1,
            coalesce_in_flight: true,
        }
    }
}

pub struct Orchestrator {
    catalogue: Arc<dyn CatalogueClient>,
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    cache: Arc<dyn CacheStore>,
    index: VectorIndex,
    settings: PipelineSettings,
    in_flight: InFlight<RecommendationResult>,
}

impl Orchestrator {
    pub fn new(
        catalogue: Arc<dyn CatalogueClient>,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
        cache: Arc<dyn CacheStore>,
        index: VectorIndex,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            catalogue,
            embedder,
            generator,
            cache,
            index,
            settings,
            in_flight: InFlight::new(),
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Non-positive limits fall back to the configured default
    pub fn effective_limit(&self, limit: i64) -> usize {
        if limit <= 0 {
            self.settings.default_limit
        } else {
            usize::try_from(limit).unwrap_or(self.settings.default_limit)
        }
    }

    /// Brings the vector index in line with the catalogue of `section`
    pub async fn synchronize(&self, section: &str) -> AppResult<SyncReport> {
        self.index
            .synchronize_from_catalogue(self.catalogue.as_ref(), self.embedder.as_ref(), section)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_recommendation(
        &self,
        section: &str,
        limit: i64,
    ) -> AppResult<RecommendationResult> {
        let limit = self.effective_limit(limit);

        let recently_viewed = self
            .catalogue
            .recently_viewed(section, limit)
            .await
            .stage(PipelineStage::RecentlyViewed)?;

        if recently_viewed.is_empty() {
            return Err(AppError::NotFound(format!(
                "No recently viewed titles in section {}",
                section
            )))
            .stage(PipelineStage::RecentlyViewed);
        }

        let fingerprint =
            CacheFingerprint::from_titles(recently_viewed.iter().map(|e| e.title.as_str()));
        tracing::debug!(
            fingerprint = %fingerprint,
            recently_viewed = recently_viewed.len(),
            "Derived cache fingerprint"
        );

        if let Some(result) = self.cached(&fingerprint).await {
            return Ok(result);
        }

        if !self.settings.coalesce_in_flight {
            return self
                .generate_and_store(section, limit, &recently_viewed, &fingerprint)
                .await;
        }

        self.in_flight
            .run(fingerprint.as_str(), || async {
                // An identical request may have finished between our miss and now
                if let Some(result) = self.cached(&fingerprint).await {
                    return Ok(result);
                }
                self.generate_and_store(section, limit, &recently_viewed, &fingerprint)
                    .await
            })
            .await
    }

    /// Cache lookup where every failure degrades to a miss
    async fn cached(&self, fingerprint: &CacheFingerprint) -> Option<RecommendationResult> {
        let entry = match self.cache.get(fingerprint).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(fingerprint = %fingerprint, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    store = self.cache.name(),
                    error = %e,
                    "Cache read failed, continuing without cache"
                );
                return None;
            }
        };

        match RecommendationResult::from_json(&entry.generated_output) {
            Ok(result) => {
                tracing::info!(
                    fingerprint = %fingerprint,
                    cached_at = %entry.created_at,
                    "Cache hit"
                );
                Some(result)
            }
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    "Cached output is not valid, regenerating"
                );
                None
            }
        }
    }

    async fn generate_and_store(
        &self,
        section: &str,
        limit: usize,
        recently_viewed: &[CatalogueEntry],
        fingerprint: &CacheFingerprint,
    ) -> AppResult<RecommendationResult> {
        let texts: Vec<String> = recently_viewed.iter().map(CatalogueEntry::describe).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .stage(PipelineStage::Embedding)?;

        let similar = self
            .index
            .nearest_neighbors(vectors, limit)
            .await
            .stage(PipelineStage::VectorQuery)?;

        let catalogue = self
            .catalogue
            .all_entries(section)
            .await
            .stage(PipelineStage::Catalogue)?;

        tracing::info!(
            similar = similar.len(),
            catalogue = catalogue.len(),
            "Generating recommendations"
        );

        let prompt = prompts::generation_prompt(recently_viewed, &similar, &catalogue);
        let raw = self
            .generator
            .generate(&prompt)
            .await
            .stage(PipelineStage::Generation)?;

        let parsed = self.normalize(&raw).await?;
        let result = validation::ground(parsed, recently_viewed, &catalogue);

        if result.videos.is_empty() {
            tracing::warn!("No recommendation survived grounding, result not cached");
            return Ok(result);
        }

        if let Err(e) = self.cache.put(fingerprint, &result.to_json()).await {
            tracing::warn!(
                store = self.cache.name(),
                fingerprint = %fingerprint,
                error = %e,
                "Cache write failed"
            );
        }

        Ok(result)
    }

    async fn normalize(&self, raw: &str) -> AppResult<RecommendationResult> {
        match self.settings.normalization_mode {
            NormalizationMode::Programmatic => {
                if let Some((result, _)) = normalize::repair(raw) {
                    return Ok(result);
                }
                tracing::debug!("Programmatic repair failed, falling back to the model");
                self.model_repair(raw, self.settings.max_repair_attempts)
                    .await
            }
            NormalizationMode::Model => {
                self.model_repair(raw, self.settings.max_repair_attempts.max(1))
                    .await
            }
        }
    }

    /// Asks the model to rewrite its output as JSON, up to `attempts` times
    async fn model_repair(&self, raw: &str, attempts: usize) -> AppResult<RecommendationResult> {
        let mut candidate = raw.to_string();

        for attempt in 1..=attempts {
            let normalized = self
                .generator
                .generate(&prompts::normalization_prompt(&candidate))
                .await
                .stage(PipelineStage::Normalization)?;

            if let Some((result, _)) = normalize::repair(&normalized) {
                return Ok(result);
            }

            tracing::warn!(attempt, "Normalized output is still not valid JSON");
            candidate = normalized;
        }

        Err(AppError::MalformedOutput(format!(
            "output could not be parsed as recommendations after {} repair attempt(s)",
            attempts
        )))
        .stage(PipelineStage::Normalization)
    }
}
