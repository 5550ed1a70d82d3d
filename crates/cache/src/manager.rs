//! Cache manager: lookups, stores and date invalidation
//!
//! An invalidation the backend cannot confirm is queued. While the queue is
//! non-empty every lookup first retries it and, if that fails, bypasses the
//! cache, so an answer computed from a superseded date is never served.

use crate::backend::CacheBackend;
use crate::error::{CacheError, Result};
use crate::fingerprint::Fingerprint;
use chrono::NaiveDate;
use common::DateRange;
use config::CacheConfig;
use observability::{CacheMetrics, CacheOutcome};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct CacheManager {
    backend: Option<Arc<dyn CacheBackend>>,
    key_prefix: String,
    ttl: Duration,
    op_timeout: Duration,
    max_range_days: usize,
    pending: Mutex<BTreeSet<NaiveDate>>,
    metrics: CacheMetrics,
}

impl CacheManager {
    /// `op_timeout` bounds every backend call
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig, op_timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            key_prefix: config.key_prefix.clone(),
            ttl: Duration::from_secs(config.ttl_seconds),
            op_timeout,
            max_range_days: config.max_range_days,
            pending: Mutex::new(BTreeSet::new()),
            metrics: CacheMetrics::new(),
        }
    }

    /// A manager that never caches; every lookup is a bypass
    pub fn disabled() -> Self {
        Self {
            backend: None,
            key_prefix: String::new(),
            ttl: Duration::ZERO,
            op_timeout: Duration::ZERO,
            max_range_days: 0,
            pending: Mutex::new(BTreeSet::new()),
            metrics: CacheMetrics::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether an answer depending on every date of `range` may be cached.
    /// Longer spans would register one dependency per calendar day.
    pub fn caches_range(&self, range: &DateRange) -> bool {
        self.backend.is_some() && range.num_days() <= self.max_range_days
    }

    /// Dates whose invalidation has not been confirmed yet
    pub fn pending_dates(&self) -> Vec<NaiveDate> {
        self.pending.lock().iter().copied().collect()
    }

    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Unavailable(format!(
                "operation timed out after {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match &self.backend {
            Some(backend) => self.call(backend.ping()).await,
            None => Ok(()),
        }
    }

    /// Cached answer for `fingerprint`.
    ///
    /// `Ok(None)` is a miss. `Err(Unavailable)` means the cache must not be
    /// trusted right now and the caller should read the datastore.
    pub async fn lookup<T: DeserializeOwned>(&self, fingerprint: &Fingerprint) -> Result<Option<T>> {
        let Some(backend) = &self.backend else {
            self.metrics.record(CacheOutcome::Bypass);
            return Ok(None);
        };

        if let Err(e) = self.flush_pending().await {
            self.metrics.record(CacheOutcome::Bypass);
            return Err(e);
        }

        let key = fingerprint.key(&self.key_prefix);
        let payload = match self.call(backend.get(&key)).await {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.record(CacheOutcome::Bypass);
                return Err(e);
            }
        };

        match payload {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    self.metrics.record(CacheOutcome::Hit);
                    debug!(key = %key, "Cache hit");
                    Ok(Some(value))
                }
                Err(e) => {
                    // Treat an undecodable payload as a miss; the next store overwrites it
                    warn!(key = %key, error = %e, "Discarding unreadable cache payload");
                    self.metrics.record(CacheOutcome::Miss);
                    Ok(None)
                }
            },
            None => {
                self.metrics.record(CacheOutcome::Miss);
                Ok(None)
            }
        }
    }

    /// Store an answer computed from `deps`
    pub async fn store<T: Serialize>(
        &self,
        fingerprint: &Fingerprint,
        value: &T,
        deps: &[NaiveDate],
    ) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let payload =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let key = fingerprint.key(&self.key_prefix);
        self.call(backend.put(&key, payload, deps, self.ttl)).await?;
        debug!(key = %key, deps = deps.len(), "Cached answer");
        Ok(())
    }

    /// Evict every answer that depends on `date`.
    ///
    /// On failure the date is queued for retry and the error is returned so
    /// the caller can report the gap.
    pub async fn invalidate(&self, date: NaiveDate) -> Result<u64> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };

        match self.call(backend.invalidate_date(date)).await {
            Ok(evicted) => {
                self.metrics.evicted(evicted);
                debug!(date = %date, evicted, "Invalidated cached answers");
                Ok(evicted)
            }
            Err(e) => {
                warn!(date = %date, error = %e, "Cache invalidation not confirmed, queued for retry");
                self.pending.lock().insert(date);
                Err(e)
            }
        }
    }

    /// Retry queued invalidations. Stops at the first date that still fails.
    pub async fn flush_pending(&self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        loop {
            let next = self.pending.lock().iter().next().copied();
            let Some(date) = next else {
                return Ok(());
            };

            let evicted = self.call(backend.invalidate_date(date)).await?;
            self.metrics.evicted(evicted);
            self.pending.lock().remove(&date);
            debug!(date = %date, evicted, "Flushed pending invalidation");
        }
    }
}
