use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Fixed-width embedding produced by the embedding service
pub type Embedding = Vec<f32>;

/// A movie or show from a library section, as fetched from the catalogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CatalogueEntry {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content_rating: String,
    /// Stable identifier assigned by the catalogue backend (Plex GUID)
    #[serde(default)]
    pub external_id: String,
}

impl CatalogueEntry {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        content_rating: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            content_rating: content_rating.into(),
            external_id: external_id.into(),
        }
    }

    /// Text block used both for embedding and for prompt grounding
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl Display for CatalogueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Title: {}\nSummary: {}\nContent Rating: {}\nExternal ID: {}",
            self.title, self.summary, self.content_rating, self.external_id
        )
    }
}

/// A catalogue entry paired with its embedding, ready to be written to the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub entry: CatalogueEntry,
    pub vector: Embedding,
}

/// A record already present in the vector index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Backend-assigned object id, used as the paging cursor
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content_rating: String,
    /// Missing on records written before identifiers were stored
    pub external_id: Option<String>,
}
