//! CacheBackend trait definition

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// Storage for cached payloads and the dependency index.
///
/// A backend keeps, for every date, the set of keys whose answers were
/// computed from that date. `put` records the key under each of its
/// dependency dates and `invalidate_date` evicts exactly that set.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> Result<()>;

    /// Payload stored under `key`, if present and not expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a payload and register it under each dependency date
    async fn put(&self, key: &str, payload: String, deps: &[NaiveDate], ttl: Duration) -> Result<()>;

    /// Evict every key depending on `date`, returning how many were removed
    async fn invalidate_date(&self, date: NaiveDate) -> Result<u64>;
}
