//! Redis-backed `SharedCache`, behind the optional `redis` feature
//! (`deadpool-redis`), so a limiter's state can be shared across processes
//! best-effort (§4.6, §5 "Shared-resource policy").

use std::time::Duration;

use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

use crate::error::StorageError;
use crate::storage::SharedCache;

/// A `SharedCache` backed by a pooled Redis connection.
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// Build a cache from a `redis://` connection URL.
    pub fn connect(url: impl Into<String>) -> std::result::Result<Self, StorageError> {
        let config = Config::from_url(url.into());
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| StorageError::CacheUnavailable(err.to_string()))?;
        Ok(Self { pool })
    }
}

impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.pool.get().await.ok()?;
        conn.get::<_, Option<Vec<u8>>>(key).await.ok().flatten()
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> std::result::Result<(), StorageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| StorageError::CacheUnavailable(err.to_string()))?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|err| StorageError::OperationFailed { message: err.to_string() })
    }
}
