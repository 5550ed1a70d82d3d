//! In-memory index store implementation

use crate::error::{Result, StorageError};
use crate::store::traits::{BuildLease, IndexStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CompositionEntry, DailyObservation, DateRange, PerformanceRecord, Stock, Symbol};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
struct Tables {
    stocks: HashMap<Symbol, Stock>,
    observations: BTreeMap<NaiveDate, BTreeMap<Symbol, DailyObservation>>,
    compositions: BTreeMap<NaiveDate, Vec<CompositionEntry>>,
    performance: BTreeMap<NaiveDate, PerformanceRecord>,
}

/// In-memory index store for tests and single-process runs
///
/// All tables sit behind one lock so a commit is visible all at once. The
/// build lease is a process mutex shared by every service over this store.
#[derive(Default)]
pub struct InMemoryIndexStore {
    tables: RwLock<Tables>,
    builds: Arc<Mutex<()>>,
}

struct MemoryLease {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl BuildLease for MemoryLease {
    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dates with a committed composition
    pub fn committed_count(&self) -> usize {
        self.tables.read().compositions.len()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<usize> {
        let mut tables = self.tables.write();
        for stock in stocks {
            tables.stocks.insert(stock.symbol.clone(), stock.clone());
        }
        Ok(stocks.len())
    }

    async fn get_stocks(&self, symbols: &[Symbol]) -> Result<Vec<Stock>> {
        let tables = self.tables.read();
        Ok(symbols
            .iter()
            .filter_map(|s| tables.stocks.get(s).cloned())
            .collect())
    }

    async fn save_observations(&self, observations: &[DailyObservation]) -> Result<usize> {
        let mut tables = self.tables.write();
        for obs in observations {
            tables
                .observations
                .entry(obs.date)
                .or_default()
                .insert(obs.symbol.clone(), obs.clone());
        }
        Ok(observations.len())
    }

    async fn get_observations(&self, date: NaiveDate) -> Result<Vec<DailyObservation>> {
        let tables = self.tables.read();
        Ok(tables
            .observations
            .get(&date)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn observed_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>> {
        let tables = self.tables.read();
        Ok(tables
            .observations
            .range(range.start()..=range.end())
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(date, _)| *date)
            .collect())
    }

    async fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>> {
        let tables = self.tables.read();
        Ok(tables.compositions.get(&date).cloned().unwrap_or_default())
    }

    async fn latest_composition_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(NaiveDate, Vec<CompositionEntry>)>> {
        let tables = self.tables.read();
        Ok(tables
            .compositions
            .range(..date)
            .next_back()
            .map(|(d, entries)| (*d, entries.clone())))
    }

    async fn composition_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>> {
        let tables = self.tables.read();
        Ok(tables
            .compositions
            .range(range.start()..=range.end())
            .map(|(d, _)| *d)
            .collect())
    }

    async fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>> {
        Ok(self.tables.read().performance.get(&date).copied())
    }

    async fn latest_performance_before(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>> {
        let tables = self.tables.read();
        Ok(tables.performance.range(..date).next_back().map(|(_, r)| *r))
    }

    async fn performance_range(&self, range: &DateRange) -> Result<Vec<PerformanceRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .performance
            .range(range.start()..=range.end())
            .map(|(_, r)| *r)
            .collect())
    }

    async fn last_committed_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self.tables.read().performance.keys().next_back().copied())
    }

    async fn commit_date(
        &self,
        date: NaiveDate,
        composition: &[CompositionEntry],
        performance: &PerformanceRecord,
    ) -> Result<()> {
        if performance.date != date || composition.iter().any(|e| e.date != date) {
            return Err(StorageError::InvalidData(format!(
                "commit for {} contains rows for another date",
                date
            )));
        }

        let mut entries = composition.to_vec();
        entries.sort_by_key(|e| e.rank);

        let mut tables = self.tables.write();
        tables.compositions.insert(date, entries);
        tables.performance.insert(date, *performance);
        Ok(())
    }

    async fn discard_after(&self, date: NaiveDate) -> Result<Vec<NaiveDate>> {
        let Some(next) = date.succ_opt() else {
            return Ok(Vec::new());
        };

        let mut tables = self.tables.write();
        let mut removed: BTreeSet<NaiveDate> =
            tables.performance.split_off(&next).into_keys().collect();
        removed.extend(tables.compositions.split_off(&next).into_keys());
        Ok(removed.into_iter().collect())
    }

    async fn try_lock_builds(&self) -> Result<Option<Box<dyn BuildLease>>> {
        Ok(self.builds.clone().try_lock_owned().ok().map(|guard| {
            Box::new(MemoryLease { _guard: guard }) as Box<dyn BuildLease>
        }))
    }
}
