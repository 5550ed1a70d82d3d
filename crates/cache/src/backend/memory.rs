//! In-process cache backend

use crate::backend::CacheBackend;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    payload: String,
    expires_at: Instant,
    deps: Vec<NaiveDate>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    by_date: HashMap<NaiveDate, HashSet<String>>,
}

impl Inner {
    fn remove(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        for date in entry.deps {
            if let Some(keys) = self.by_date.get_mut(&date) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_date.remove(&date);
                }
            }
        }
        true
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }
    }

    /// Drop the entry closest to expiry
    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = victim {
            self.remove(&key);
        }
    }
}

/// Cache held in process memory, bounded by entry count
pub struct MemoryCacheBackend {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl MemoryCacheBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently registered under `date`
    pub fn dependents(&self, date: NaiveDate) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .by_date
            .get(&date)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Ok(Some(entry.payload.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, payload: String, deps: &[NaiveDate], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        inner.remove(key);
        if inner.entries.len() >= self.max_entries {
            inner.purge_expired(now);
        }
        while inner.entries.len() >= self.max_entries {
            inner.evict_one();
        }

        for date in deps {
            inner.by_date.entry(*date).or_default().insert(key.to_string());
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                payload,
                expires_at: now + ttl,
                deps: deps.to_vec(),
            },
        );
        Ok(())
    }

    async fn invalidate_date(&self, date: NaiveDate) -> Result<u64> {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .by_date
            .remove(&date)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default();

        let mut evicted = 0;
        for key in keys {
            if inner.remove(&key) {
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_invalidate_evicts_only_dependents() {
        let cache = MemoryCacheBackend::new(100);
        cache.put("a", "1".into(), &[d(1), d(2)], TTL).await.unwrap();
        cache.put("b", "2".into(), &[d(2), d(3)], TTL).await.unwrap();
        cache.put("c", "3".into(), &[d(4)], TTL).await.unwrap();

        assert_eq!(cache.invalidate_date(d(2)).await.unwrap(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap(), Some("3".to_string()));

        // Index entries of evicted keys are cleaned up on their other dates too
        assert!(cache.dependents(d(1)).is_empty());
        assert!(cache.dependents(d(3)).is_empty());
        assert_eq!(cache.invalidate_date(d(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_replaces_dependencies() {
        let cache = MemoryCacheBackend::new(100);
        cache.put("a", "old".into(), &[d(1)], TTL).await.unwrap();
        cache.put("a", "new".into(), &[d(2)], TTL).await.unwrap();

        assert!(cache.dependents(d(1)).is_empty());
        assert_eq!(cache.dependents(d(2)), vec!["a".to_string()]);
        assert_eq!(cache.get("a").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = MemoryCacheBackend::new(100);
        cache.put("a", "1".into(), &[d(1)], TTL).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.dependents(d(1)).is_empty());
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let cache = MemoryCacheBackend::new(2);
        cache.put("a", "1".into(), &[d(1)], TTL).await.unwrap();
        cache.put("b", "2".into(), &[d(1)], TTL).await.unwrap();
        cache.put("c", "3".into(), &[d(1)], TTL).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("c").await.unwrap().is_some());
    }
}
