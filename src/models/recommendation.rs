use serde::{Deserialize, Serialize};

use super::{CatalogueEntry, NOT_RATED};

/// Upper bound on recommendations returned for one request
pub const MAX_RECOMMENDATIONS: usize = 3;

/// A single recommended title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default = "not_rated")]
    pub content_rating: String,
}

fn not_rated() -> String {
    NOT_RATED.to_string()
}

impl From<&CatalogueEntry> for Recommendation {
    fn from(entry: &CatalogueEntry) -> Self {
        let content_rating = if entry.content_rating.trim().is_empty() {
            not_rated()
        } else {
            entry.content_rating.clone()
        };

        Self {
            title: entry.title.clone(),
            summary: entry.summary.clone(),
            content_rating,
        }
    }
}

/// Validated output of the recommendation pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecommendationResult {
    pub videos: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// Shapes the normalized model output may take
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOutput {
    List(Vec<Recommendation>),
    Detailed {
        #[serde(alias = "recommendations")]
        videos: Vec<Recommendation>,
        #[serde(default)]
        justification: Option<String>,
    },
}

impl RecommendationResult {
    /// Parses strictly valid JSON: either an array of recommendations or an
    /// object with a `videos` array and optional `justification`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawOutput = serde_json::from_str(text)?;
        let result = match raw {
            RawOutput::List(videos) => Self {
                videos,
                justification: None,
            },
            RawOutput::Detailed {
                videos,
                justification,
            } => Self {
                videos,
                justification: justification.filter(|j| !j.trim().is_empty()),
            },
        };
        Ok(result)
    }

    /// Canonical text stored in the cache
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"videos\":[]}".to_string())
    }

    pub fn titles(&self) -> Vec<&str> {
        self.videos.iter().map(|v| v.title.as_str()).collect()
    }
}
