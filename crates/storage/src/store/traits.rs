//! IndexStore trait definition

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CompositionEntry, DailyObservation, DateRange, PerformanceRecord, Stock, Symbol};

/// Exclusive right to run a build, shared by every process using the datastore.
///
/// Dropping a lease frees it too, but a backend may only manage that by
/// closing the connection that holds it.
#[async_trait]
pub trait BuildLease: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// IndexStore trait - the datastore the engine builds from and commits to
///
/// Implementations must make [`IndexStore::commit_date`] all-or-nothing:
/// a reader sees either both the composition and the performance record of
/// a date or neither.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or replace stock metadata, keyed by symbol
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<usize>;

    /// Metadata for the given symbols. Unknown symbols are omitted.
    async fn get_stocks(&self, symbols: &[Symbol]) -> Result<Vec<Stock>>;

    /// Insert or replace observations, keyed by `(symbol, date)`
    async fn save_observations(&self, observations: &[DailyObservation]) -> Result<usize>;

    /// Every observation row for a date, ordered by symbol
    async fn get_observations(&self, date: NaiveDate) -> Result<Vec<DailyObservation>>;

    /// Distinct dates inside `range` that have at least one observation row
    async fn observed_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>>;

    /// Committed composition for a date ordered by rank, empty when none
    async fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>>;

    /// Most recent committed composition strictly before `date`
    async fn latest_composition_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(NaiveDate, Vec<CompositionEntry>)>>;

    /// Dates inside `range` with a committed composition, ascending
    async fn composition_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>>;

    async fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>>;

    /// Performance record of the most recent committed date strictly before `date`
    async fn latest_performance_before(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>>;

    /// Performance records inside `range`, ascending by date
    async fn performance_range(&self, range: &DateRange) -> Result<Vec<PerformanceRecord>>;

    /// Latest date with a committed performance record
    async fn last_committed_date(&self) -> Result<Option<NaiveDate>>;

    /// Replace the composition and performance of `date` atomically
    async fn commit_date(
        &self,
        date: NaiveDate,
        composition: &[CompositionEntry],
        performance: &PerformanceRecord,
    ) -> Result<()>;

    /// Delete every composition and performance record dated after `date`,
    /// atomically. Returns the removed dates, ascending.
    async fn discard_after(&self, date: NaiveDate) -> Result<Vec<NaiveDate>>;

    /// Take the build lease without waiting; `None` while another build holds it
    async fn try_lock_builds(&self) -> Result<Option<Box<dyn BuildLease>>>;
}
