//! Fixtures shared by the index engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cache::{CacheBackend, CacheError, CacheManager, MemoryCacheBackend};
use chrono::NaiveDate;
use common::{CompositionEntry, DailyObservation, DateRange, PerformanceRecord, Stock, Symbol};
use config::CacheConfig;
use index_engine::{EngineSettings, IndexService};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::{BuildLease, InMemoryIndexStore, IndexStore, Result, StorageError};
use tokio_util::sync::CancellationToken;

/// 2024-01-`d`
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

pub fn settings(constituents: usize) -> EngineSettings {
    EngineSettings {
        constituents,
        ..EngineSettings::default()
    }
}

/// `count` symbols `S000..`, market cap descending by index
pub fn universe(date: NaiveDate, count: usize, price: impl Fn(usize) -> f64) -> Vec<DailyObservation> {
    (0..count)
        .map(|i| {
            DailyObservation::new(
                format!("S{:03}", i).as_str(),
                date,
                price(i),
                (count - i) as f64 * 1e9,
                1_000_000,
            )
        })
        .collect()
}

/// Observations from `(symbol, price, market_cap)` rows
pub fn rows(date: NaiveDate, rows: &[(&str, f64, f64)]) -> Vec<DailyObservation> {
    rows.iter()
        .map(|(symbol, price, cap)| DailyObservation::new(*symbol, date, *price, *cap, 1_000))
        .collect()
}

pub struct Fixture {
    pub store: Arc<InMemoryIndexStore>,
    pub backend: Arc<FlakyCache>,
    pub cache: Arc<CacheManager>,
    pub service: IndexService,
}

impl Fixture {
    pub fn new(settings: EngineSettings) -> Self {
        let store = Arc::new(InMemoryIndexStore::new());
        Self::with_store(store.clone(), store, settings)
    }

    /// Serve the engine through `engine_store`, which wraps `store`
    pub fn with_store(
        store: Arc<InMemoryIndexStore>,
        engine_store: Arc<dyn IndexStore>,
        settings: EngineSettings,
    ) -> Self {
        let backend = Arc::new(FlakyCache::new());
        let cache = Arc::new(CacheManager::new(
            backend.clone(),
            &CacheConfig::default(),
            Duration::from_secs(1),
        ));
        let service = IndexService::new(engine_store, cache.clone(), settings);
        Self {
            store,
            backend,
            cache,
            service,
        }
    }

    pub async fn load(&self, observations: &[DailyObservation]) {
        self.store.save_observations(observations).await.unwrap();
    }

    pub async fn load_stocks(&self, stocks: &[(&str, &str, Option<&str>)]) {
        let stocks: Vec<Stock> = stocks
            .iter()
            .map(|(symbol, name, sector)| Stock {
                symbol: Symbol::new(*symbol),
                company_name: name.to_string(),
                sector: sector.map(str::to_string),
            })
            .collect();
        self.store.upsert_stocks(&stocks).await.unwrap();
    }

    pub async fn composition(&self, date: NaiveDate) -> Vec<CompositionEntry> {
        self.store.get_composition(date).await.unwrap()
    }

    pub async fn performance(&self, date: NaiveDate) -> Option<PerformanceRecord> {
        self.store.get_performance(date).await.unwrap()
    }
}

/// Memory cache whose invalidations can be made to fail.
///
/// Confirmed invalidations are logged with the keys they evicted.
pub struct FlakyCache {
    inner: MemoryCacheBackend,
    fail_invalidate: AtomicBool,
    evictions: Mutex<Vec<(NaiveDate, Vec<String>)>>,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheBackend::new(1_000),
            fail_invalidate: AtomicBool::new(false),
            evictions: Mutex::new(Vec::new()),
        }
    }

    /// Invalidations since the last call, in order
    pub fn take_evictions(&self) -> Vec<(NaiveDate, Vec<String>)> {
        std::mem::take(&mut *self.evictions.lock())
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_invalidate.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn dependents(&self, date: NaiveDate) -> Vec<String> {
        self.inner.dependents(date)
    }
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn ping(&self) -> cache::Result<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> cache::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, payload: String, deps: &[NaiveDate], ttl: Duration) -> cache::Result<()> {
        self.inner.put(key, payload, deps, ttl).await
    }

    async fn invalidate_date(&self, date: NaiveDate) -> cache::Result<u64> {
        if self.fail_invalidate.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection reset".into()));
        }
        let keys = self.inner.dependents(date);
        let evicted = self.inner.invalidate_date(date).await?;
        self.evictions.lock().push((date, keys));
        Ok(evicted)
    }
}

/// Store wrapper that can stall calls, fire a token when a date commits or
/// refuse to discard dates
#[derive(Default)]
pub struct HookedStore {
    inner: Arc<InMemoryIndexStore>,
    observations_delay: Option<Duration>,
    last_committed_delay: Option<Duration>,
    cancel_on_commit: Mutex<HashMap<NaiveDate, CancellationToken>>,
    discard_fails: bool,
}

impl HookedStore {
    pub fn new(inner: Arc<InMemoryIndexStore>) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn slow_observations(mut self, delay: Duration) -> Self {
        self.observations_delay = Some(delay);
        self
    }

    pub fn slow_last_committed(mut self, delay: Duration) -> Self {
        self.last_committed_delay = Some(delay);
        self
    }

    pub fn failing_discard(mut self) -> Self {
        self.discard_fails = true;
        self
    }

    /// Cancel `token` as soon as `date` is committed
    pub fn cancel_after_commit(self, date: NaiveDate, token: CancellationToken) -> Self {
        self.cancel_on_commit.lock().insert(date, token);
        self
    }
}

#[async_trait]
impl IndexStore for HookedStore {
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<usize> {
        self.inner.upsert_stocks(stocks).await
    }

    async fn get_stocks(&self, symbols: &[Symbol]) -> Result<Vec<Stock>> {
        self.inner.get_stocks(symbols).await
    }

    async fn save_observations(&self, observations: &[DailyObservation]) -> Result<usize> {
        self.inner.save_observations(observations).await
    }

    async fn get_observations(&self, date: NaiveDate) -> Result<Vec<DailyObservation>> {
        if let Some(delay) = self.observations_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_observations(date).await
    }

    async fn observed_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>> {
        self.inner.observed_dates(range).await
    }

    async fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>> {
        self.inner.get_composition(date).await
    }

    async fn latest_composition_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(NaiveDate, Vec<CompositionEntry>)>> {
        self.inner.latest_composition_before(date).await
    }

    async fn composition_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>> {
        self.inner.composition_dates(range).await
    }

    async fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>> {
        self.inner.get_performance(date).await
    }

    async fn latest_performance_before(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>> {
        self.inner.latest_performance_before(date).await
    }

    async fn performance_range(&self, range: &DateRange) -> Result<Vec<PerformanceRecord>> {
        self.inner.performance_range(range).await
    }

    async fn last_committed_date(&self) -> Result<Option<NaiveDate>> {
        if let Some(delay) = self.last_committed_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.last_committed_date().await
    }

    async fn commit_date(
        &self,
        date: NaiveDate,
        composition: &[CompositionEntry],
        performance: &PerformanceRecord,
    ) -> Result<()> {
        self.inner.commit_date(date, composition, performance).await?;
        if let Some(token) = self.cancel_on_commit.lock().get(&date) {
            token.cancel();
        }
        Ok(())
    }

    async fn discard_after(&self, date: NaiveDate) -> Result<Vec<NaiveDate>> {
        if self.discard_fails {
            return Err(StorageError::Transaction("deadlock detected".into()));
        }
        self.inner.discard_after(date).await
    }

    async fn try_lock_builds(&self) -> Result<Option<Box<dyn BuildLease>>> {
        self.inner.try_lock_builds().await
    }
}
