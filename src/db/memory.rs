use dashmap::DashMap;

use super::cache::{CacheEntry, CacheFingerprint, CacheStore};
use crate::error::AppResult;

/// Process-local cache store. Entries live as long as the process.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<CacheFingerprint, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, fingerprint: &CacheFingerprint) -> AppResult<Option<CacheEntry>> {
        Ok(self.entries.get(fingerprint).map(|entry| entry.clone()))
    }

    async fn put(&self, fingerprint: &CacheFingerprint, output: &str) -> AppResult<()> {
        self.entries
            .entry(fingerprint.clone())
            .or_insert_with(|| CacheEntry::new(fingerprint.clone(), output));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
