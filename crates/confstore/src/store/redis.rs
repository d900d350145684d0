//! Redis client for the scan-based adapter
//!
//! Uses deadpool-redis for async connection pooling. Documents are stored as
//! JSON strings under `<namespace>:<id>`; enumeration uses `SCAN ... MATCH`.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::scan::KeyValueClient;
use crate::{Result, StoreError};

/// Redis connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
        }
    }
}

impl RedisStoreConfig {
    /// Build a connection pool and check it can reach the server
    pub async fn connect(&self) -> Result<Pool> {
        debug!(
            "Creating Redis pool: url={}, pool_size={}",
            self.url, self.pool_size
        );

        let pool = PoolConfig::from_url(&self.url)
            .builder()
            .map_err(|e| {
                StoreError::Configuration(format!("Failed to create pool builder: {}", e))
            })?
            .max_size(self.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Configuration(format!("Failed to create pool: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("Failed to get connection: {}", e))
            })?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Redis PING failed: {}", e)))?;

        info!("Connected to Redis at {}", self.url);
        Ok(pool)
    }
}

/// [`KeyValueClient`] over a shared Redis pool
#[derive(Clone)]
pub struct RedisClient {
    pool: Pool,
}

impl RedisClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to get connection: {}", e)))
    }
}

#[async_trait]
impl KeyValueClient for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to get {}: {}", key, e)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to set {}: {}", key, e)))
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("Failed to set {}: {}", key, e)))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: usize = conn
            .del(key)
            .await
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("Failed to delete {}: {}", key, e))
            })?;
        Ok(removed > 0)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("Failed to get {} keys: {}", keys.len(), e))
            })
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.conn().await?;
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                StoreError::BackendUnavailable(format!("Failed to scan {}: {}", pattern, e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::scan::ScanStore;
    use crate::{DataStore, Key, Pattern};
    use futures::TryStreamExt;
    use std::sync::Arc;

    #[test]
    fn test_config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.pool_size, 10);
    }

    #[test]
    fn test_config_partial_yaml() {
        let config: RedisStoreConfig = serde_yaml::from_str("url: redis://cache:6379").unwrap();
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.pool_size, 10);
    }

    // Integration tests - require Redis running
    async fn redis_store(namespace: &str) -> ScanStore<RedisClient> {
        let pool = RedisStoreConfig::default().connect().await.unwrap();
        let store = ScanStore::new(Arc::new(RedisClient::new(pool)), Key::parse(namespace));
        store.delete_all(&[Pattern::parse("*:*")]).await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore]
    async fn test_create_get_delete() {
        let store = redis_store("confstore-test-crud").await;
        let id = Key::parse("flags:a");

        store.create(id.clone(), serde_json::json!({"on": true})).await.unwrap();
        assert!(store.create(id.clone(), serde_json::json!(1)).await.is_err());
        assert_eq!(
            store.get_by_id(&id).await.unwrap(),
            Some(serde_json::json!({"on": true}))
        );

        store.delete(id.clone()).await.unwrap();
        assert_eq!(store.get_by_id(&id).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_pattern_query() {
        let store = redis_store("confstore-test-scan").await;
        for i in 0..120 {
            store
                .create(Key::parse(&format!("flags:{}", i)), serde_json::json!(i))
                .await
                .unwrap();
        }

        let patterns = [Pattern::parse("flags:*")];
        let all: Vec<_> = store.get_by_id_like(&patterns).try_collect().await.unwrap();
        assert_eq!(all.len(), 120);

        let page = store.get_by_id_like_paged(&patterns, 2, 50).await.unwrap();
        assert_eq!(page.count, 120);
        assert_eq!(page.results.len(), 50);

        store.delete_all(&patterns).await.unwrap();
        assert_eq!(store.count(&patterns).await.unwrap(), 0);
    }
}
