use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ExistenceCheck, SetOptions};

use crate::db::cache::{CacheEntry, CacheFingerprint, CacheStore};
use crate::error::{AppError, AppResult};

/// Prefix for recommendation keys
const KEY_PREFIX: &str = "recommendation";

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

fn redis_key(fingerprint: &CacheFingerprint) -> String {
    format!("{}:{}", KEY_PREFIX, fingerprint)
}

/// Cache store backed by Redis.
///
/// Entries are written with `SET NX` and no expiry, so the first write for a
/// fingerprint stays authoritative.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn new(client: Client) -> AppResult<Self> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, fingerprint: &CacheFingerprint) -> AppResult<Option<CacheEntry>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(redis_key(fingerprint)).await?;

        match cached {
            Some(json) => {
                let entry = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, fingerprint: &CacheFingerprint, output: &str) -> AppResult<()> {
        let entry = CacheEntry::new(fingerprint.clone(), output);
        let json = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;

        let options = SetOptions::default().conditional_set(ExistenceCheck::NX);
        let mut conn = self.conn.clone();
        let written: Option<String> = conn.set_options(redis_key(fingerprint), json, options).await?;

        if written.is_none() {
            tracing::debug!(fingerprint = %fingerprint, "Cache entry already present, keeping first");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_key_display() {
        let fingerprint = CacheFingerprint::from_encoded("WyJUb3Rvcm8iXQ==");
        assert_eq!(redis_key(&fingerprint), "recommendation:WyJUb3Rvcm8iXQ==");
    }

    #[test]
    fn test_redis_key_is_order_independent() {
        let a = CacheFingerprint::from_titles(["Ponyo", "Totoro"]);
        let b = CacheFingerprint::from_titles(["Totoro", "Ponyo"]);
        assert_eq!(redis_key(&a), redis_key(&b));
    }

    async fn test_store() -> (RedisCacheStore, Client) {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        (RedisCacheStore::new(client.clone()).await.unwrap(), client)
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_cache_miss() {
        let (store, _) = test_store().await;
        let fingerprint = CacheFingerprint::from_titles(["nonexistent_key_12345"]);

        assert_eq!(store.get(&fingerprint).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_first_write_wins() {
        let (store, client) = test_store().await;
        let fingerprint = CacheFingerprint::from_titles(["redis_first_write_wins"]);

        store.put(&fingerprint, "first").await.unwrap();
        store.put(&fingerprint, "second").await.unwrap();

        let entry = store.get(&fingerprint).await.unwrap().unwrap();
        assert_eq!(entry.generated_output, "first");

        // Clean up
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(redis_key(&fingerprint)).await.unwrap();
    }
}
