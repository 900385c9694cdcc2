/// Plex Media Server catalogue client
///
/// API Flow:
/// 1. Recently viewed: /library/sections/{section}/recentlyViewed
/// 2. Full catalogue:  /library/sections/{section}/all
///
/// Both endpoints are requested as JSON and return a `MediaContainer` whose
/// `Metadata` array holds the entries.
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::CatalogueEntry,
    services::providers::{upstream_error, CatalogueClient},
};

const TOKEN_HEADER: &str = "X-Plex-Token";

/// Which listing of a section to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionListing {
    RecentlyViewed,
    All,
}

impl SectionListing {
    fn path(&self) -> &'static str {
        match self {
            SectionListing::RecentlyViewed => "recentlyViewed",
            SectionListing::All => "all",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LibraryResponse {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlexMetadata {
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    content_rating: String,
    #[serde(default)]
    guid: String,
    #[serde(default)]
    rating_key: Option<String>,
}

impl From<PlexMetadata> for CatalogueEntry {
    fn from(video: PlexMetadata) -> Self {
        // Older agents leave guid empty; ratingKey is still unique per server
        let external_id = if video.guid.is_empty() {
            video.rating_key.unwrap_or_default()
        } else {
            video.guid
        };

        CatalogueEntry {
            title: video.title,
            summary: video.summary,
            content_rating: video.content_rating,
            external_id,
        }
    }
}

#[derive(Clone)]
pub struct PlexClient {
    http_client: HttpClient,
    base_url: String,
}

impl PlexClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !token.trim().is_empty() {
            let value = HeaderValue::from_str(token.trim())
                .map_err(|e| AppError::InvalidInput(format!("Invalid Plex token: {}", e)))?;
            headers.insert(TOKEN_HEADER, value);
        }

        let http_client = HttpClient::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn section_url(&self, section: &str, listing: SectionListing) -> String {
        format!(
            "{}/library/sections/{}/{}",
            self.base_url,
            section,
            listing.path()
        )
    }

    async fn fetch_section(
        &self,
        section: &str,
        listing: SectionListing,
    ) -> AppResult<Vec<CatalogueEntry>> {
        validate_section(section)?;

        let url = self.section_url(section, listing);
        tracing::debug!(url = %url, "Fetching Plex library section");

        let response = self.http_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("Plex", response).await);
        }

        let response_text = response.text().await?;
        let entries = parse_library(&response_text)?;

        tracing::info!(
            section = %section,
            listing = listing.path(),
            total = entries.len(),
            provider = "plex",
            "Library section fetched"
        );

        Ok(entries)
    }
}

/// Library sections are single path segments: ASCII letters, digits, `-` and `_`.
///
/// Anything else could walk out of `/library/sections/` with the server's token.
pub fn validate_section(section: &str) -> AppResult<()> {
    if section.is_empty() {
        return Err(AppError::InvalidInput(
            "Library section cannot be empty".to_string(),
        ));
    }
    if !section
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::InvalidInput(format!(
            "Invalid library section: {:?}",
            section
        )));
    }
    Ok(())
}

fn parse_library(body: &str) -> AppResult<Vec<CatalogueEntry>> {
    let library: LibraryResponse = serde_json::from_str(body).map_err(|e| {
        tracing::error!(error = %e, "Failed to deserialize Plex response");
        AppError::ExternalApi(format!("Failed to parse Plex response: {}", e))
    })?;

    Ok(library
        .media_container
        .metadata
        .into_iter()
        .map(CatalogueEntry::from)
        .collect())
}

#[async_trait::async_trait]
impl CatalogueClient for PlexClient {
    #[instrument(skip(self))]
    async fn recently_viewed(
        &self,
        section: &str,
        limit: usize,
    ) -> AppResult<Vec<CatalogueEntry>> {
        let mut entries = self
            .fetch_section(section, SectionListing::RecentlyViewed)
            .await?;
        entries.truncate(limit);
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn all_entries(&self, section: &str) -> AppResult<Vec<CatalogueEntry>> {
        self.fetch_section(section, SectionListing::All).await
    }

    fn name(&self) -> &'static str {
        "plex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_client() -> PlexClient {
        PlexClient::new("http://plex.local:32400/", "test_token", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_section_urls() {
        let client = create_test_client();
        assert_eq!(
            client.section_url("3", SectionListing::RecentlyViewed),
            "http://plex.local:32400/library/sections/3/recentlyViewed"
        );
        assert_eq!(
            client.section_url("3", SectionListing::All),
            "http://plex.local:32400/library/sections/3/all"
        );
    }

    #[test]
    fn test_library_deserialization() {
        let json = r#"{
            "MediaContainer": {
                "size": 2,
                "librarySectionID": 3,
                "Metadata": [
                    {
                        "ratingKey": "101",
                        "guid": "plex://movie/5d7768",
                        "type": "movie",
                        "title": "Kiki's Delivery Service",
                        "contentRating": "G",
                        "summary": "A young witch starts a delivery service."
                    },
                    {
                        "ratingKey": "102",
                        "type": "movie",
                        "title": "Akira"
                    }
                ]
            }
        }"#;

        let entries = parse_library(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Kiki's Delivery Service");
        assert_eq!(entries[0].content_rating, "G");
        assert_eq!(entries[0].external_id, "plex://movie/5d7768");
        assert_eq!(entries[1].external_id, "102");
        assert!(entries[1].summary.is_empty());
    }

    #[test]
    fn test_empty_section_has_no_metadata() {
        let entries = parse_library(r#"{"MediaContainer": {"size": 0}}"#).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_invalid_body_is_external_error() {
        let err = parse_library("<MediaContainer/>").unwrap_err();
        assert!(matches!(err, AppError::ExternalApi(_)));
    }

    #[tokio::test]
    async fn test_empty_section_is_rejected() {
        let client = create_test_client();
        let err = client.all_entries("  ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_section() {
        assert!(validate_section("3").is_ok());
        assert!(validate_section("movies_4k-2").is_ok());

        for section in ["3/../..", "..", "3?x=", "3/all", "3%2F..", "3 ", "", "sección"] {
            assert!(
                matches!(validate_section(section), Err(AppError::InvalidInput(_))),
                "{:?} should be rejected",
                section
            );
        }
    }

    #[tokio::test]
    async fn test_traversal_section_never_leaves_the_client() {
        // Unroutable host: an attempted request would surface as HttpClient, not InvalidInput
        let client = PlexClient::new("http://127.0.0.1:9", "test_token", Duration::from_secs(1)).unwrap();

        let err = client
            .recently_viewed("3/../../../status/sessions?", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
