//! PostgreSQL implementation of the `IndexStore` trait.
//!
//! Tables are created by `migrations/001_create_index_tables.sql`. A date is
//! committed inside one transaction that deletes its previous composition and
//! performance rows before inserting the new ones.
//!
//! The build lease is a session-level advisory lock, held on a connection
//! taken out of the pool for the whole build.

use crate::error::{Result, StorageError};
use crate::store::traits::{BuildLease, IndexStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CompositionEntry, DailyObservation, DateRange, PerformanceRecord, Stock, Symbol};
use config::PostgresConfig;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Advisory lock key of the build lease, "eqindex" in ASCII
const BUILD_LOCK_KEY: i64 = 0x0065_7169_6e64_6578;

/// PostgreSQL-backed index store.
#[derive(Debug, Clone)]
pub struct PostgresIndexStore {
    pool: PgPool,
}

impl PostgresIndexStore {
    /// Open a connection pool from configuration.
    pub async fn connect(cfg: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(Duration::from_secs(cfg.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(cfg.idle_timeout_seconds))
            .connect(&cfg.url())
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to database: {}", e)))?;

        info!(host = %cfg.host, database = %cfg.database, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run the migration SQL to create tables.
    pub async fn run_migrations(&self) -> Result<()> {
        let migration_sql = include_str!("../../../../migrations/001_create_index_tables.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("Migration failed: {}", e)))?;
        info!("Database migrations completed successfully");
        Ok(())
    }
}

/// Connection holding the build advisory lock.
///
/// A lease dropped without `release` closes its connection instead of
/// returning it to the pool, which ends the session and frees the lock.
struct PgBuildLease {
    conn: Option<PoolConnection<Postgres>>,
}

#[async_trait]
impl BuildLease for PgBuildLease {
    async fn release(self: Box<Self>) -> Result<()> {
        let mut lease = self;
        let Some(mut conn) = lease.conn.take() else {
            return Ok(());
        };

        let unlocked: std::result::Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
                .bind(BUILD_LOCK_KEY)
                .fetch_one(&mut *conn)
                .await;

        match unlocked {
            Ok(true) => {
                debug!("Build lock released");
                Ok(())
            }
            Ok(false) => {
                warn!("Build lock was no longer held at release");
                Ok(())
            }
            Err(e) => {
                drop(conn.detach());
                Err(StorageError::Query(format!("Failed to release build lock: {}", e)))
            }
        }
    }
}

impl Drop for PgBuildLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Build lock dropped without release, closing its connection");
            drop(conn.detach());
        }
    }
}

fn query_err(context: &str) -> impl Fn(sqlx::Error) -> StorageError + '_ {
    move |e| StorageError::Query(format!("{}: {}", context, e))
}

fn tx_err(e: sqlx::Error) -> StorageError {
    StorageError::Transaction(e.to_string())
}

fn row_to_observation(row: &PgRow) -> Result<DailyObservation> {
    let symbol: String = row.try_get("symbol").map_err(query_err("symbol"))?;
    Ok(DailyObservation {
        symbol: Symbol::new(symbol),
        date: row.try_get("date").map_err(query_err("date"))?,
        price: row.try_get("price").map_err(query_err("price"))?,
        market_cap: row.try_get("market_cap").map_err(query_err("market_cap"))?,
        volume: row.try_get("volume").map_err(query_err("volume"))?,
    })
}

fn row_to_entry(row: &PgRow) -> Result<CompositionEntry> {
    let symbol: String = row.try_get("symbol").map_err(query_err("symbol"))?;
    let rank: i32 = row.try_get("rank").map_err(query_err("rank"))?;
    let rank = u32::try_from(rank)
        .map_err(|_| StorageError::InvalidData(format!("negative rank {} for {}", rank, symbol)))?;
    Ok(CompositionEntry {
        date: row.try_get("date").map_err(query_err("date"))?,
        symbol: Symbol::new(symbol),
        weight: row.try_get("weight").map_err(query_err("weight"))?,
        rank,
    })
}

fn row_to_performance(row: &PgRow) -> Result<PerformanceRecord> {
    Ok(PerformanceRecord {
        date: row.try_get("date").map_err(query_err("date"))?,
        daily_return: row.try_get("daily_return").map_err(query_err("daily_return"))?,
        cumulative_return: row
            .try_get("cumulative_return")
            .map_err(query_err("cumulative_return"))?,
    })
}

#[async_trait]
impl IndexStore for PostgresIndexStore {
    #[instrument(skip(self, stocks), fields(count = stocks.len()))]
    async fn upsert_stocks(&self, stocks: &[Stock]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        for stock in stocks {
            sqlx::query(
                r#"
                INSERT INTO stocks (symbol, company_name, sector, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (symbol) DO UPDATE SET
                    company_name = EXCLUDED.company_name,
                    sector = EXCLUDED.sector,
                    updated_at = NOW()
                "#,
            )
            .bind(stock.symbol.as_str())
            .bind(&stock.company_name)
            .bind(&stock.sector)
            .execute(&mut *tx)
            .await
            .map_err(query_err("Failed to upsert stock"))?;
        }
        tx.commit().await.map_err(tx_err)?;
        Ok(stocks.len())
    }

    async fn get_stocks(&self, symbols: &[Symbol]) -> Result<Vec<Stock>> {
        let names: Vec<String> = symbols.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT symbol, company_name, sector FROM stocks WHERE symbol = ANY($1) ORDER BY symbol",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("Failed to get stocks"))?;

        rows.iter()
            .map(|row| {
                let symbol: String = row.try_get("symbol").map_err(query_err("symbol"))?;
                Ok(Stock {
                    symbol: Symbol::new(symbol),
                    company_name: row.try_get("company_name").map_err(query_err("company_name"))?,
                    sector: row.try_get("sector").map_err(query_err("sector"))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, observations), fields(count = observations.len()))]
    async fn save_observations(&self, observations: &[DailyObservation]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        for obs in observations {
            sqlx::query(
                r#"
                INSERT INTO daily_data (symbol, date, price, market_cap, volume)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (symbol, date) DO UPDATE SET
                    price = EXCLUDED.price,
                    market_cap = EXCLUDED.market_cap,
                    volume = EXCLUDED.volume
                "#,
            )
            .bind(obs.symbol.as_str())
            .bind(obs.date)
            .bind(obs.price)
            .bind(obs.market_cap)
            .bind(obs.volume)
            .execute(&mut *tx)
            .await
            .map_err(query_err("Failed to save observation"))?;
        }
        tx.commit().await.map_err(tx_err)?;
        Ok(observations.len())
    }

    async fn get_observations(&self, date: NaiveDate) -> Result<Vec<DailyObservation>> {
        let rows = sqlx::query(
            "SELECT symbol, date, price, market_cap, volume FROM daily_data WHERE date = $1 ORDER BY symbol",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("Failed to get observations"))?;

        rows.iter().map(row_to_observation).collect()
    }

    async fn observed_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query(
            "SELECT DISTINCT date FROM daily_data WHERE date BETWEEN $1 AND $2 ORDER BY date",
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("Failed to list observed dates"))?;

        rows.iter()
            .map(|row| row.try_get("date").map_err(query_err("date")))
            .collect()
    }

    async fn get_composition(&self, date: NaiveDate) -> Result<Vec<CompositionEntry>> {
        let rows = sqlx::query(
            "SELECT date, symbol, weight, rank FROM index_composition WHERE date = $1 ORDER BY rank",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("Failed to get composition"))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn latest_composition_before(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(NaiveDate, Vec<CompositionEntry>)>> {
        let prior: Option<NaiveDate> =
            sqlx::query_scalar("SELECT MAX(date) FROM index_composition WHERE date < $1")
                .bind(date)
                .fetch_one(&self.pool)
                .await
                .map_err(query_err("Failed to find prior composition"))?;

        match prior {
            Some(prior) => Ok(Some((prior, self.get_composition(prior).await?))),
            None => Ok(None),
        }
    }

    async fn composition_dates(&self, range: &DateRange) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query(
            "SELECT DISTINCT date FROM index_composition WHERE date BETWEEN $1 AND $2 ORDER BY date",
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("Failed to list composition dates"))?;

        rows.iter()
            .map(|row| row.try_get("date").map_err(query_err("date")))
            .collect()
    }

    async fn get_performance(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>> {
        let row = sqlx::query(
            "SELECT date, daily_return, cumulative_return FROM index_performance WHERE date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("Failed to get performance"))?;

        row.as_ref().map(row_to_performance).transpose()
    }

    async fn latest_performance_before(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT date, daily_return, cumulative_return FROM index_performance
            WHERE date < $1 ORDER BY date DESC LIMIT 1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("Failed to get prior performance"))?;

        row.as_ref().map(row_to_performance).transpose()
    }

    async fn performance_range(&self, range: &DateRange) -> Result<Vec<PerformanceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT date, daily_return, cumulative_return FROM index_performance
            WHERE date BETWEEN $1 AND $2 ORDER BY date
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("Failed to get performance range"))?;

        rows.iter().map(row_to_performance).collect()
    }

    async fn last_committed_date(&self) -> Result<Option<NaiveDate>> {
        sqlx::query_scalar("SELECT MAX(date) FROM index_performance")
            .fetch_one(&self.pool)
            .await
            .map_err(query_err("Failed to get last committed date"))
    }

    #[instrument(skip(self, composition, performance), fields(date = %date, constituents = composition.len()))]
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

        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        sqlx::query("DELETE FROM index_composition WHERE date = $1")
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(query_err("Failed to clear composition"))?;

        for entry in composition {
            sqlx::query(
                "INSERT INTO index_composition (date, symbol, weight, rank) VALUES ($1, $2, $3, $4)",
            )
            .bind(date)
            .bind(entry.symbol.as_str())
            .bind(entry.weight)
            .bind(entry.rank as i32)
            .execute(&mut *tx)
            .await
            .map_err(query_err("Failed to insert composition"))?;
        }

        sqlx::query(
            r#"
            INSERT INTO index_performance (date, daily_return, cumulative_return)
            VALUES ($1, $2, $3)
            ON CONFLICT (date) DO UPDATE SET
                daily_return = EXCLUDED.daily_return,
                cumulative_return = EXCLUDED.cumulative_return
            "#,
        )
        .bind(date)
        .bind(performance.daily_return)
        .bind(performance.cumulative_return)
        .execute(&mut *tx)
        .await
        .map_err(query_err("Failed to upsert performance"))?;

        tx.commit().await.map_err(tx_err)?;
        debug!("Committed composition and performance");
        Ok(())
    }

    async fn discard_after(&self, date: NaiveDate) -> Result<Vec<NaiveDate>> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        sqlx::query("DELETE FROM index_composition WHERE date > $1")
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(query_err("Failed to discard compositions"))?;

        let rows = sqlx::query("DELETE FROM index_performance WHERE date > $1 RETURNING date")
            .bind(date)
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err("Failed to discard performance"))?;

        tx.commit().await.map_err(tx_err)?;

        let mut removed = rows
            .iter()
            .map(|row| row.try_get("date").map_err(query_err("date")))
            .collect::<Result<Vec<NaiveDate>>>()?;
        removed.sort();
        Ok(removed)
    }

    async fn try_lock_builds(&self) -> Result<Option<Box<dyn BuildLease>>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to acquire connection: {}", e)))?;

        // Wrapped before locking so an abandoned call never pools a locked session
        let mut lease = PgBuildLease { conn: Some(conn) };
        let Some(conn) = lease.conn.as_mut() else {
            return Ok(None);
        };

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(BUILD_LOCK_KEY)
            .fetch_one(&mut **conn)
            .await
            .map_err(query_err("Failed to take build lock"))?;

        if !locked {
            // Nothing is held, so the connection can go back to the pool
            drop(lease.conn.take());
            return Ok(None);
        }

        debug!("Build lock taken");
        Ok(Some(Box::new(lease)))
    }
}
