//! Redis cache backend
//!
//! Payloads are plain string keys with an expiry. The dependency index is one
//! Redis set per date, `{prefix}:deps:{date}`, holding the keys computed from
//! that date, so several processes share one consistent index.

use crate::backend::CacheBackend;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use config::RedisConfig;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct RedisCacheBackend {
    redis: Arc<tokio::sync::Mutex<redis::aio::ConnectionManager>>,
    key_prefix: String,
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

impl RedisCacheBackend {
    pub async fn connect(config: &RedisConfig, key_prefix: &str) -> Result<Self> {
        info!(host = %config.host, port = config.port, db = config.db_index, "Connecting to Redis");

        let client = redis::Client::open(config.url().as_str()).map_err(unavailable)?;
        let connection_manager = client.get_connection_manager().await.map_err(unavailable)?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(connection_manager)),
            key_prefix: key_prefix.to_string(),
        })
    }

    fn deps_key(&self, date: NaiveDate) -> String {
        format!("{}:deps:{}", self.key_prefix, date.format("%Y-%m-%d"))
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn ping(&self) -> Result<()> {
        let mut redis = self.redis.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *redis)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut redis = self.redis.lock().await;
        redis.get(key).await.map_err(unavailable)
    }

    async fn put(&self, key: &str, payload: String, deps: &[NaiveDate], ttl: Duration) -> Result<()> {
        let ttl_secs = ttl.as_secs().max(1);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_secs)
            .ignore();
        for date in deps {
            let deps_key = self.deps_key(*date);
            pipe.sadd(&deps_key, key).ignore();
            // The index must outlive every key it lists
            pipe.cmd("EXPIRE").arg(&deps_key).arg(ttl_secs).ignore();
        }

        let mut redis = self.redis.lock().await;
        pipe.query_async::<_, ()>(&mut *redis).await.map_err(unavailable)
    }

    async fn invalidate_date(&self, date: NaiveDate) -> Result<u64> {
        let deps_key = self.deps_key(date);
        let mut redis = self.redis.lock().await;

        let keys: Vec<String> = redis.smembers(&deps_key).await.map_err(unavailable)?;
        if keys.is_empty() {
            return Ok(0);
        }

        // SREM rather than DEL so keys registered meanwhile stay indexed
        let mut pipe = redis::pipe();
        pipe.atomic().del(&keys).ignore().srem(&deps_key, &keys).ignore();
        pipe.query_async::<_, ()>(&mut *redis).await.map_err(unavailable)?;

        Ok(keys.len() as u64)
    }
}
