//! Build orchestrator
//!
//! Walks the trading days of a range in ascending order. Each date runs the
//! selector, weight assigner, differ and return calculator, then commits its
//! composition and performance together and evicts the cached answers that
//! depend on it. The first failing date stops the build; dates committed
//! before it stay committed.
//!
//! Cumulative returns chain from one committed date to the next, so a build
//! that commits some dates and then stops also discards every committed date
//! after its last one. Those dates chain from records it replaced.

use crate::differ::diff_compositions;
use crate::error::{ErrorKind, IndexError, Result};
use crate::lock::CommitGate;
use crate::returns::{chain, daily_return};
use crate::selector::select_universe;
use crate::settings::{bounded, EngineSettings};
use crate::state::{BuildState, DateBuild};
use crate::weights::{assign_weights, validate_composition};
use cache::CacheManager;
use chrono::NaiveDate;
use common::{
    ChangeType, CompositionEntry, DailyObservation, DateRange, PerformanceRecord, Symbol,
    TradingCalendar,
};
use observability::BuildMetrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use storage::IndexStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Why a build stopped before the end of its range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildFailure {
    pub date: NaiveDate,
    /// State the date was in when it failed
    pub state: BuildState,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildResult {
    pub requested: DateRange,
    /// `requested`, extended to cover committed dates after its end
    pub effective: DateRange,
    /// Dates committed by this build, ascending
    pub committed: Vec<NaiveDate>,
    pub last_successful_date: Option<NaiveDate>,
    /// The first failure, if any; dates after it were not attempted
    pub failures: Vec<BuildFailure>,
    pub cancelled: bool,
    /// Committed dates whose cache eviction was not confirmed
    pub invalidation_gaps: Vec<NaiveDate>,
    /// Previously committed dates removed after the build stopped early
    pub discarded: Vec<NaiveDate>,
    /// Set when those dates could not be removed: records after this date
    /// still chain from superseded ones
    pub stale_after: Option<NaiveDate>,
}

impl BuildResult {
    fn new(requested: DateRange, effective: DateRange) -> Self {
        Self {
            requested,
            effective,
            committed: Vec::new(),
            last_successful_date: None,
            failures: Vec::new(),
            cancelled: false,
            invalidation_gaps: Vec::new(),
            discarded: Vec::new(),
            stale_after: None,
        }
    }

    /// Every trading day of the effective range was committed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn first_failure(&self) -> Option<&BuildFailure> {
        self.failures.first()
    }
}

/// The last committed date, carried forward as the base of the next one
struct Anchor {
    date: NaiveDate,
    composition: Vec<CompositionEntry>,
    cumulative: f64,
    prices: HashMap<Symbol, f64>,
}

/// A computed date, ready to commit
struct PreparedDate {
    composition: Vec<CompositionEntry>,
    performance: PerformanceRecord,
    prices: HashMap<Symbol, f64>,
}

fn price_map(observations: &[DailyObservation]) -> HashMap<Symbol, f64> {
    observations
        .iter()
        .filter_map(|o| o.price.map(|p| (o.symbol.clone(), p)))
        .collect()
}

pub struct BuildOrchestrator {
    store: Arc<dyn IndexStore>,
    cache: Arc<CacheManager>,
    gate: Arc<CommitGate>,
    settings: EngineSettings,
    metrics: BuildMetrics,
}

impl BuildOrchestrator {
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Arc<CacheManager>,
        gate: Arc<CommitGate>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            cache,
            gate,
            settings,
            metrics: BuildMetrics::new(),
        }
    }

    /// Build `requested`. Errors before the first date starts are returned
    /// as `Err`; per-date errors end up in [`BuildResult::failures`].
    #[instrument(skip(self, cancel), fields(range = %requested))]
    pub async fn run(&self, requested: DateRange, cancel: &CancellationToken) -> Result<BuildResult> {
        let _timer = self.metrics.start_build();
        let limit = self.settings.operation_timeout;

        let last_committed =
            bounded("last_committed_date", limit, self.store.last_committed_date()).await?;
        let effective = match last_committed {
            Some(last) if last > requested.end() => {
                info!(until = %last, "Extending build over downstream committed dates");
                requested.extend_to(last)
            }
            _ => requested,
        };

        let observed = match self.settings.calendar {
            TradingCalendar::Observed => {
                bounded("observed_dates", limit, self.store.observed_dates(&effective)).await?
            }
            TradingCalendar::Weekdays => Vec::new(),
        };
        let days = self.settings.calendar.trading_days(&effective, &observed);
        info!(effective = %effective, trading_days = days.len(), "Starting build");

        let mut result = BuildResult::new(requested, effective);
        let mut anchor: Option<Anchor> = None;
        let mut anchor_loaded = false;

        for date in days {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let mut tracker = DateBuild::new(date);

            if !anchor_loaded {
                anchor = match self.load_anchor(date).await {
                    Ok(anchor) => anchor,
                    Err(e) => {
                        self.record_failure(&mut result, &mut tracker, e);
                        break;
                    }
                };
                anchor_loaded = true;
            }

            let prepared = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    result.cancelled = true;
                    break;
                }
                prepared = self.prepare(&mut tracker, anchor.as_ref()) => prepared,
            };

            let prepared = match prepared {
                Ok(prepared) => prepared,
                Err(e) => {
                    self.record_failure(&mut result, &mut tracker, e);
                    break;
                }
            };

            // Committing is not raced against cancellation
            match self.commit(&mut tracker, &prepared).await {
                Ok(confirmed) => {
                    if !confirmed {
                        result.invalidation_gaps.push(date);
                    }
                    result.committed.push(date);
                    result.last_successful_date = Some(date);
                    anchor = Some(Anchor {
                        date,
                        cumulative: prepared.performance.cumulative_return,
                        composition: prepared.composition,
                        prices: prepared.prices,
                    });
                }
                Err(e) => {
                    self.record_failure(&mut result, &mut tracker, e);
                    break;
                }
            }
        }

        if !result.is_complete() {
            if let Some(last) = result.last_successful_date {
                self.discard_downstream(&mut result, last).await;
            }
        }

        if result.cancelled {
            warn!(committed = result.committed.len(), "Build cancelled");
        } else if result.is_complete() {
            info!(committed = result.committed.len(), "Build finished");
        }

        Ok(result)
    }

    /// Most recent committed date before `date`, with what the next date needs from it
    async fn load_anchor(&self, date: NaiveDate) -> Result<Option<Anchor>> {
        let limit = self.settings.operation_timeout;

        let Some((prior_date, composition)) = bounded(
            "latest_composition_before",
            limit,
            self.store.latest_composition_before(date),
        )
        .await?
        else {
            return Ok(None);
        };

        let performance = bounded(
            "latest_performance_before",
            limit,
            self.store.latest_performance_before(date),
        )
        .await?
        .filter(|record| record.date == prior_date)
        .ok_or_else(|| {
            IndexError::inconsistent(
                date,
                format!("prior date {} has a composition but no performance record", prior_date),
            )
        })?;
        let observations =
            bounded("get_observations", limit, self.store.get_observations(prior_date)).await?;

        Ok(Some(Anchor {
            date: prior_date,
            composition,
            cumulative: performance.cumulative_return,
            prices: price_map(&observations),
        }))
    }

    async fn prepare(&self, tracker: &mut DateBuild, anchor: Option<&Anchor>) -> Result<PreparedDate> {
        let date = tracker.date();
        let limit = self.settings.operation_timeout;

        tracker.advance();
        let observations = bounded("get_observations", limit, self.store.get_observations(date)).await?;
        let selected = select_universe(date, &observations, self.settings.constituents)?;
        let composition = assign_weights(date, &selected, self.settings.weight_precision);
        validate_composition(date, &composition, self.settings.weight_tolerance)?;

        tracker.advance();
        let prior: &[CompositionEntry] = anchor.map(|a| a.composition.as_slice()).unwrap_or(&[]);
        let changes = diff_compositions(date, prior, &composition);
        let count = |t: ChangeType| changes.iter().filter(|c| c.change_type == t).count();
        debug!(
            date = %date,
            base = ?anchor.map(|a| a.date),
            added = count(ChangeType::Added),
            removed = count(ChangeType::Removed),
            rank_changed = count(ChangeType::RankChanged),
            "Composition diffed"
        );

        tracker.advance();
        let prices = price_map(&observations);
        let (daily, prior_cumulative) = match anchor {
            Some(anchor) => (
                daily_return(date, &composition, &anchor.composition, &prices, &anchor.prices)?,
                anchor.cumulative,
            ),
            None => (0.0, 0.0),
        };

        Ok(PreparedDate {
            performance: PerformanceRecord {
                date,
                daily_return: daily,
                cumulative_return: chain(prior_cumulative, daily),
            },
            composition,
            prices,
        })
    }

    /// Commit a prepared date under the exclusive gate and evict its dependents.
    ///
    /// Returns whether the eviction was confirmed by the cache.
    async fn commit(&self, tracker: &mut DateBuild, prepared: &PreparedDate) -> Result<bool> {
        let date = tracker.date();
        tracker.advance();

        let _gate = self.gate.write().await;

        let committed = bounded(
            "commit_date",
            self.settings.operation_timeout,
            self.store
                .commit_date(date, &prepared.composition, &prepared.performance),
        )
        .await;

        // Evict even when the commit outcome is unknown
        let invalidated = self.cache.invalidate(date).await;
        committed?;

        if let Err(e) = &invalidated {
            warn!(
                date = %date,
                error = %e,
                "Committed without confirmed cache invalidation; cached answers may be stale until retried"
            );
        }

        tracker.advance();
        self.metrics.date_committed();
        info!(
            date = %date,
            constituents = prepared.composition.len(),
            daily_return = prepared.performance.daily_return,
            cumulative_return = prepared.performance.cumulative_return,
            "Committed index date"
        );

        Ok(invalidated.is_ok())
    }

    /// Remove committed dates after `last` and evict their cached answers,
    /// under the exclusive gate so no query sees the removal half done.
    async fn discard_downstream(&self, result: &mut BuildResult, last: NaiveDate) {
        let _gate = self.gate.write().await;

        let discarded = match bounded(
            "discard_after",
            self.settings.operation_timeout,
            self.store.discard_after(last),
        )
        .await
        {
            Ok(discarded) => discarded,
            Err(e) => {
                error!(
                    after = %last,
                    error = %e,
                    "Could not discard downstream dates; their cumulative returns are stale until rebuilt"
                );
                result.stale_after = Some(last);
                return;
            }
        };

        if discarded.is_empty() {
            return;
        }

        for date in &discarded {
            if self.cache.invalidate(*date).await.is_err() {
                result.invalidation_gaps.push(*date);
            }
        }

        warn!(
            after = %last,
            discarded = discarded.len(),
            "Discarded committed dates that chained from replaced records; rebuild them"
        );
        result.discarded = discarded;
    }

    fn record_failure(&self, result: &mut BuildResult, tracker: &mut DateBuild, e: IndexError) {
        let state = tracker.fail();
        let kind = e.kind();
        let date = tracker.date();

        match kind {
            ErrorKind::Structural => error!(
                date = %date,
                state = %state,
                error = %e,
                "Structural failure, build halted; operator attention required"
            ),
            ErrorKind::Infrastructure => {
                error!(date = %date, state = %state, error = %e, "Build failed")
            }
            _ => warn!(date = %date, state = %state, error = %e, "Build stopped at date"),
        }

        self.metrics.build_failed(kind.as_str());
        result.failures.push(BuildFailure {
            date,
            state,
            kind,
            message: e.to_string(),
        });
    }
}
