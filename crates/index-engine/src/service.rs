//! IndexService: builds and cached queries over one index
//!
//! Queries hold the commit gate shared from cache lookup to cache store, so
//! an answer computed before a commit cannot be stored after that commit's
//! eviction.

use crate::differ::diff_compositions;
use crate::error::{IndexError, Result};
use crate::lock::CommitGate;
use crate::orchestrator::{BuildOrchestrator, BuildResult};
use crate::returns::period_return;
use crate::settings::{bounded, EngineSettings};
use cache::{CacheManager, Endpoint, Fingerprint};
use chrono::NaiveDate;
use common::{
    ChangeType, CompositionChange, ConstituentView, DailyChangeSummary, DailyObservation,
    DateRange, PerformanceRecord, PerformanceSummary, Stock, Symbol,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use storage::IndexStore;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// A computed answer and the dates it depends on. `None` means the answer
/// must not be cached.
type Computed<T> = (T, Option<Vec<NaiveDate>>);

pub struct IndexService {
    store: Arc<dyn IndexStore>,
    cache: Arc<CacheManager>,
    gate: Arc<CommitGate>,
    orchestrator: BuildOrchestrator,
    settings: EngineSettings,
}

impl IndexService {
    pub fn new(store: Arc<dyn IndexStore>, cache: Arc<CacheManager>, settings: EngineSettings) -> Self {
        let gate = Arc::new(CommitGate::new());
        let orchestrator =
            BuildOrchestrator::new(store.clone(), cache.clone(), gate.clone(), settings.clone());
        Self {
            store,
            cache,
            gate,
            orchestrator,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Cache connectivity check
    pub async fn ping_cache(&self) -> Result<()> {
        Ok(self.cache.ping().await?)
    }

    /// Load reference data and observations into the datastore
    #[instrument(skip_all, fields(stocks = stocks.len(), observations = observations.len()))]
    pub async fn import(&self, stocks: &[Stock], observations: &[DailyObservation]) -> Result<(usize, usize)> {
        let limit = self.settings.operation_timeout;
        let stocks = bounded("upsert_stocks", limit, self.store.upsert_stocks(stocks)).await?;
        let observations =
            bounded("save_observations", limit, self.store.save_observations(observations)).await?;
        Ok((stocks, observations))
    }

    // =========================================================================
    // Builds
    // =========================================================================

    pub async fn build_index(&self, start: NaiveDate, end: NaiveDate) -> Result<BuildResult> {
        self.build_index_with_cancel(start, end, CancellationToken::new())
            .await
    }

    /// Build `[start, end]`, stopping between dates once `cancel` fires.
    ///
    /// Fails immediately with `BuildLockContention` while another build, in
    /// this process or any other using the same datastore, holds the lease.
    pub async fn build_index_with_cancel(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cancel: CancellationToken,
    ) -> Result<BuildResult> {
        let requested = DateRange::new(start, end)?;
        let lease = bounded(
            "try_lock_builds",
            self.settings.operation_timeout,
            self.store.try_lock_builds(),
        )
        .await?
        .ok_or(IndexError::BuildLockContention { requested })?;

        let result = self.orchestrator.run(requested, &cancel).await;

        if let Err(e) = lease.release().await {
            warn!(error = %e, "Failed to release the build lease");
        }
        result
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Constituents of `date` by rank, joined with metadata and that day's data
    pub async fn get_composition(&self, date: NaiveDate) -> Result<Vec<ConstituentView>> {
        let fingerprint = Fingerprint::for_date(Endpoint::Composition, date);
        self.cached(&fingerprint, || self.load_composition(date)).await
    }

    pub async fn get_composition_changes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompositionChange>> {
        let range = DateRange::new(start, end)?;
        let fingerprint = Fingerprint::for_range(Endpoint::CompositionChanges, &range);
        self.cached(&fingerprint, || self.load_changes(range)).await
    }

    /// Added and removed symbols per date, omitting dates with neither
    pub async fn get_composition_change_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyChangeSummary>> {
        let changes = self.get_composition_changes(start, end).await?;
        Ok(summarize_changes(&changes))
    }

    pub async fn get_performance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PerformanceRecord>> {
        let range = DateRange::new(start, end)?;
        let fingerprint = Fingerprint::for_range(Endpoint::Performance, &range);
        self.cached(&fingerprint, || self.load_performance(range)).await
    }

    /// Performance records plus the return compounded inside the range
    pub async fn get_performance_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PerformanceSummary> {
        let records = self.get_performance(start, end).await?;
        let period_return = period_return(&records);
        Ok(PerformanceSummary {
            records,
            period_return,
        })
    }

    /// Serve from cache, or compute and store. An unusable cache falls back
    /// to the datastore without storing.
    async fn cached<T, F, Fut>(&self, fingerprint: &Fingerprint, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>>>,
    {
        let _gate = self.gate.read().await;

        let usable = match self.cache.lookup::<T>(fingerprint).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => true,
            Err(e) => {
                warn!(endpoint = fingerprint.endpoint().as_str(), error = %e, "Cache unavailable, reading datastore");
                false
            }
        };

        let (value, deps) = compute().await?;

        if let (true, Some(deps)) = (usable, deps) {
            if let Err(e) = self.cache.store(fingerprint, &value, &deps).await {
                warn!(endpoint = fingerprint.endpoint().as_str(), error = %e, "Failed to cache answer");
            }
        }

        Ok(value)
    }

    async fn load_composition(&self, date: NaiveDate) -> Result<Computed<Vec<ConstituentView>>> {
        let limit = self.settings.operation_timeout;

        let entries = bounded("get_composition", limit, self.store.get_composition(date)).await?;
        if entries.is_empty() {
            return Ok((Vec::new(), Some(vec![date])));
        }

        let symbols: Vec<Symbol> = entries.iter().map(|e| e.symbol.clone()).collect();
        let stocks: HashMap<Symbol, Stock> =
            bounded("get_stocks", limit, self.store.get_stocks(&symbols))
                .await?
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect();
        let observations: HashMap<Symbol, DailyObservation> =
            bounded("get_observations", limit, self.store.get_observations(date))
                .await?
                .into_iter()
                .map(|o| (o.symbol.clone(), o))
                .collect();

        let views = entries
            .into_iter()
            .map(|entry| {
                let stock = stocks.get(&entry.symbol);
                let obs = observations.get(&entry.symbol);
                ConstituentView {
                    date,
                    rank: entry.rank,
                    weight: entry.weight,
                    company_name: stock.map(|s| s.company_name.clone()).unwrap_or_default(),
                    sector: stock.and_then(|s| s.sector.clone()).unwrap_or_default(),
                    price: obs.and_then(|o| o.price).unwrap_or(0.0),
                    market_cap: obs.and_then(|o| o.market_cap).unwrap_or(0.0),
                    symbol: entry.symbol,
                }
            })
            .collect();

        Ok((views, Some(vec![date])))
    }

    /// Diff each composition date in `range` against the one before it.
    ///
    /// The answer depends on every date from the composition preceding the
    /// range to its end. With no preceding composition an earlier date
    /// committed later would change it, so it is not cached.
    async fn load_changes(&self, range: DateRange) -> Result<Computed<Vec<CompositionChange>>> {
        let limit = self.settings.operation_timeout;

        let dates = bounded("composition_dates", limit, self.store.composition_dates(&range)).await?;
        let base = bounded(
            "latest_composition_before",
            limit,
            self.store.latest_composition_before(range.start()),
        )
        .await?;

        let (mut previous, base_date) = match base {
            Some((date, entries)) => (entries, Some(date)),
            None => (Vec::new(), None),
        };

        let mut changes = Vec::new();
        for date in dates {
            let current = bounded("get_composition", limit, self.store.get_composition(date)).await?;
            changes.extend(diff_compositions(date, &previous, &current));
            previous = current;
        }

        let deps = match base_date {
            Some(base_date) => self.range_deps(&DateRange::new(base_date, range.end())?),
            None => None,
        };
        Ok((changes, deps))
    }

    async fn load_performance(&self, range: DateRange) -> Result<Computed<Vec<PerformanceRecord>>> {
        let records = bounded(
            "performance_range",
            self.settings.operation_timeout,
            self.store.performance_range(&range),
        )
        .await?;
        Ok((records, self.range_deps(&range)))
    }

    /// Every calendar date of `range`, or `None` when the span is too long to cache
    fn range_deps(&self, range: &DateRange) -> Option<Vec<NaiveDate>> {
        self.cache
            .caches_range(range)
            .then(|| range.days().collect())
    }
}

/// Group additions and removals by date, symbols sorted
pub fn summarize_changes(changes: &[CompositionChange]) -> Vec<DailyChangeSummary> {
    let mut by_date: BTreeMap<NaiveDate, DailyChangeSummary> = BTreeMap::new();

    for change in changes {
        let summary = by_date.entry(change.date).or_insert_with(|| DailyChangeSummary {
            date: change.date,
            added: Vec::new(),
            removed: Vec::new(),
        });
        match change.change_type {
            ChangeType::Added => summary.added.push(change.symbol.clone()),
            ChangeType::Removed => summary.removed.push(change.symbol.clone()),
            ChangeType::RankChanged => {}
        }
    }

    by_date
        .into_values()
        .filter(|s| !s.added.is_empty() || !s.removed.is_empty())
        .map(|mut s| {
            s.added.sort();
            s.removed.sort();
            s
        })
        .collect()
}
