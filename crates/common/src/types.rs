//! Index domain types
//!
//! These are the rows the engine reads (stocks, daily observations) and the
//! rows it writes (composition entries, performance records), plus the
//! derived composition change record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ticker symbol (e.g., "AAPL")
///
/// Symbols are normalised to uppercase. Ordering is lexicographic on the
/// normalised form and is what breaks market cap ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new symbol (normalized to uppercase)
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Get the symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Reference metadata for a listed company.
///
/// Maintained by ingestion; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: Symbol,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
}

/// One symbol's raw data for one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub symbol: Symbol,
    pub date: NaiveDate,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
}

impl DailyObservation {
    /// Create an observation with all fields present
    pub fn new(
        symbol: impl Into<Symbol>,
        date: NaiveDate,
        price: f64,
        market_cap: f64,
        volume: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            price: Some(price),
            market_cap: Some(market_cap),
            volume: Some(volume),
        }
    }

    /// Whether this symbol may be selected into the index on its date.
    ///
    /// Requires a finite positive price and a finite non-negative market cap.
    pub fn is_eligible(&self) -> bool {
        let price_ok = matches!(self.price, Some(p) if p.is_finite() && p > 0.0);
        let cap_ok = matches!(self.market_cap, Some(c) if c.is_finite() && c >= 0.0);
        price_ok && cap_ok
    }
}

/// One constituent of the index on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionEntry {
    pub date: NaiveDate,
    pub symbol: Symbol,
    pub weight: f64,
    /// 1-based rank by descending market cap
    pub rank: u32,
}

/// Index performance for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub date: NaiveDate,
    pub daily_return: f64,
    pub cumulative_return: f64,
}

/// How a symbol's membership changed between two composition dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    RankChanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::RankChanged => "rank_changed",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single membership change, derived by diffing two compositions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionChange {
    pub date: NaiveDate,
    pub symbol: Symbol,
    pub change_type: ChangeType,
    pub old_rank: Option<u32>,
    pub new_rank: Option<u32>,
}

/// A composition entry joined with the stock's metadata and that day's
/// price and market cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentView {
    pub date: NaiveDate,
    pub rank: u32,
    pub symbol: Symbol,
    pub weight: f64,
    pub company_name: String,
    pub sector: String,
    pub price: f64,
    pub market_cap: f64,
}

/// Symbols added and removed on a single date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyChangeSummary {
    pub date: NaiveDate,
    pub added: Vec<Symbol>,
    pub removed: Vec<Symbol>,
}

/// Performance records for a range plus the return compounded over that range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub records: Vec<PerformanceRecord>,
    pub period_return: f64,
}
