pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use cache::{CacheEntry, CacheFingerprint, CacheStore};
#[cfg(test)]
pub use cache::MockCacheStore;
pub use memory::MemoryCacheStore;
pub use postgres::{create_pool, PostgresCacheStore};
pub use self::redis::{create_redis_client, RedisCacheStore};
