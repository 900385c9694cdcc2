use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::AppResult;

/// Order-independent cache key for a set of recently viewed titles.
///
/// Titles are sorted, rendered as a JSON string array and base64 encoded.
/// Duplicate titles are kept, so the key depends on the multiset of titles
/// and on nothing else about the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheFingerprint(String);

impl CacheFingerprint {
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sorted: Vec<String> = titles
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect();
        sorted.sort();

        let canonical = serde_json::Value::from(sorted).to_string();
        Self(STANDARD.encode(canonical))
    }

    /// Wraps an already-encoded key read back from storage
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A previously generated recommendation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: CacheFingerprint,
    pub generated_output: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: CacheFingerprint, generated_output: impl Into<String>) -> Self {
        Self {
            fingerprint,
            generated_output: generated_output.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only store of generated recommendations keyed by fingerprint.
///
/// Once a fingerprint has an entry, that first entry is what `get` returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Exact-match lookup. `Ok(None)` means nothing was ever stored for the key.
    async fn get(&self, fingerprint: &CacheFingerprint) -> AppResult<Option<CacheEntry>>;

    async fn put(&self, fingerprint: &CacheFingerprint, output: &str) -> AppResult<()>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}
