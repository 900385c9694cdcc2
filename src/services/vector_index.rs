use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult, PipelineStage, StageContext},
    models::{CatalogueEntry, Embedding, StoredRecord, VectorRecord},
    services::providers::{CatalogueClient, EmbeddingService, VectorBackend},
};

/// Outcome of one catalogue synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub catalogue: usize,
    pub stored: usize,
    pub inserted: usize,
}

/// Identities already present in the index.
///
/// Records carrying a catalogue identifier are matched on it. Records written
/// without one can only be matched on summary text.
#[derive(Debug, Default)]
struct StoredIdentities {
    external_ids: HashSet<String>,
    legacy_summaries: HashSet<String>,
}

impl StoredIdentities {
    fn from_records(records: &[StoredRecord]) -> Self {
        let mut identities = Self::default();
        let mut summary_owners: HashMap<&str, &str> = HashMap::new();

        for record in records {
            match &record.external_id {
                Some(id) => {
                    identities.external_ids.insert(id.clone());
                }
                None => {
                    if let Some(other) = summary_owners.insert(&record.summary, &record.title) {
                        if other != record.title {
                            tracing::warn!(
                                first = %other,
                                second = %record.title,
                                "Stored records without identifiers share a summary; only one is distinguishable"
                            );
                        }
                    }
                    identities.legacy_summaries.insert(record.summary.clone());
                }
            }
        }

        identities
    }

    fn contains(&self, entry: &CatalogueEntry) -> bool {
        if !entry.external_id.is_empty() && self.external_ids.contains(&entry.external_id) {
            return true;
        }
        self.legacy_summaries.contains(&entry.summary)
    }
}

/// Entries of the catalogue not yet present in the index, deduplicated within
/// the catalogue itself
fn missing_entries(catalogue: Vec<CatalogueEntry>, stored: &[StoredRecord]) -> Vec<CatalogueEntry> {
    let identities = StoredIdentities::from_records(stored);
    let mut batch_ids = HashSet::new();

    catalogue
        .into_iter()
        .filter(|entry| !identities.contains(entry))
        .filter(|entry| {
            let key = if entry.external_id.is_empty() {
                format!("summary:{}", entry.summary)
            } else {
                format!("id:{}", entry.external_id)
            };
            batch_ids.insert(key)
        })
        .collect()
}

/// Catalogue vectors plus the logic that keeps them in step with the library
#[derive(Clone)]
pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    page_size: usize,
}

impl VectorIndex {
    pub fn new(backend: Arc<dyn VectorBackend>, page_size: usize) -> Self {
        Self {
            backend,
            page_size: page_size.max(1),
        }
    }

    /// Creates the collection if absent
    pub async fn ensure_schema(&self) -> AppResult<()> {
        self.backend.ensure_collection().await
    }

    pub async fn upsert(&self, records: Vec<VectorRecord>) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.backend.insert_batch(records).await
    }

    /// Up to `limit` entries nearest to the query vectors, in backend order
    pub async fn nearest_neighbors(
        &self,
        vectors: Vec<Embedding>,
        limit: usize,
    ) -> AppResult<Vec<CatalogueEntry>> {
        if vectors.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.backend.near_vectors(vectors, limit).await?;
        hits.truncate(limit);
        Ok(hits)
    }

    /// Every stored record, paging until a short page comes back
    pub async fn stored_records(&self) -> AppResult<Vec<StoredRecord>> {
        let mut records = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page = self.backend.list_page(after.clone(), self.page_size).await?;
            let page_len = page.len();
            let last_id = page.last().map(|record| record.id.clone());
            records.extend(page);

            if page_len < self.page_size {
                break;
            }
            match last_id {
                Some(id) if Some(&id) != after.as_ref() => after = Some(id),
                _ => {
                    return Err(AppError::ExternalApi(
                        "Vector store paging cursor did not advance".to_string(),
                    ))
                }
            }
        }

        Ok(records)
    }

    /// Embeds and stores every catalogue entry of `section` not already in the index.
    ///
    /// Running it again against an unchanged catalogue writes nothing.
    pub async fn synchronize_from_catalogue(
        &self,
        catalogue: &dyn CatalogueClient,
        embedder: &dyn EmbeddingService,
        section: &str,
    ) -> AppResult<SyncReport> {
        let entries = catalogue
            .all_entries(section)
            .await
            .stage(PipelineStage::Catalogue)?;
        let catalogue_len = entries.len();

        let stored = self
            .stored_records()
            .await
            .stage(PipelineStage::Synchronization)?;

        tracing::info!(
            section = %section,
            catalogue = catalogue_len,
            stored = stored.len(),
            "Comparing catalogue with vector index"
        );

        let missing = missing_entries(entries, &stored);
        let report = SyncReport {
            catalogue: catalogue_len,
            stored: stored.len(),
            inserted: missing.len(),
        };

        if missing.is_empty() {
            tracing::info!(section = %section, "Vector index already up to date");
            return Ok(report);
        }

        let texts: Vec<String> = missing.iter().map(CatalogueEntry::describe).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .stage(PipelineStage::Embedding)?;

        if vectors.len() != missing.len() {
            return Err(AppError::ExternalApi(format!(
                "Embedding service returned {} vectors for {} entries",
                vectors.len(),
                missing.len()
            )))
            .stage(PipelineStage::Embedding);
        }

        let records = missing
            .into_iter()
            .zip(vectors)
            .map(|(entry, vector)| VectorRecord { entry, vector })
            .collect();

        self.upsert(records)
            .await
            .stage(PipelineStage::Synchronization)?;

        tracing::info!(
            section = %section,
            inserted = report.inserted,
            "Vector index synchronized"
        );

        Ok(report)
    }
}
