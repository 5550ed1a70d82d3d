//! Daily and cumulative index returns
//!
//! The index rebalances to equal weights every day, so no index level is
//! kept: a day's return is the weighted mean of its constituents' simple
//! returns, and the cumulative series is a fold over daily returns in date
//! order.

use crate::error::{IndexError, Result};
use chrono::NaiveDate;
use common::{CompositionEntry, PerformanceRecord, Symbol};
use std::collections::{HashMap, HashSet};

/// `Σ w_i (p_today / p_prior - 1)` over constituents also in the prior composition.
///
/// Constituents new to the index contribute 0 on their first day. Every
/// constituent needs a price today; continuing ones also need one on the
/// prior composition date.
pub fn daily_return(
    date: NaiveDate,
    current: &[CompositionEntry],
    prior: &[CompositionEntry],
    prices_today: &HashMap<Symbol, f64>,
    prices_prior: &HashMap<Symbol, f64>,
) -> Result<f64> {
    let prior_members: HashSet<&Symbol> = prior.iter().map(|e| &e.symbol).collect();

    let mut total = 0.0;
    for entry in current {
        let today = positive_price(prices_today, &entry.symbol).ok_or_else(|| {
            IndexError::MissingPrice {
                date,
                symbol: entry.symbol.clone(),
            }
        })?;

        if !prior_members.contains(&entry.symbol) {
            continue;
        }

        let before = positive_price(prices_prior, &entry.symbol).ok_or_else(|| {
            IndexError::MissingPrice {
                date,
                symbol: entry.symbol.clone(),
            }
        })?;

        total += entry.weight * (today / before - 1.0);
    }

    Ok(total)
}

fn positive_price(prices: &HashMap<Symbol, f64>, symbol: &Symbol) -> Option<f64> {
    prices
        .get(symbol)
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// `(1 + prior) * (1 + daily) - 1`
pub fn chain(prior_cumulative: f64, daily: f64) -> f64 {
    (1.0 + prior_cumulative) * (1.0 + daily) - 1.0
}

/// Fold daily returns, in ascending date order, into performance records.
///
/// `prior_cumulative` is the cumulative return of the day before the first
/// entry, 0 when the series starts here.
pub fn cumulative_series(prior_cumulative: f64, daily: &[(NaiveDate, f64)]) -> Vec<PerformanceRecord> {
    daily
        .iter()
        .scan(prior_cumulative, |cumulative, &(date, daily_return)| {
            *cumulative = chain(*cumulative, daily_return);
            Some(PerformanceRecord {
                date,
                daily_return,
                cumulative_return: *cumulative,
            })
        })
        .collect()
}

/// Return compounded over the records given, ignoring anything before them
pub fn period_return(records: &[PerformanceRecord]) -> f64 {
    records.iter().fold(0.0, |acc, r| chain(acc, r.daily_return))
}
