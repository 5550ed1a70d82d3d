//! Universe selection: the day's largest eligible symbols by market cap

use crate::error::{IndexError, Result};
use chrono::NaiveDate;
use common::{DailyObservation, Symbol};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A symbol chosen for the index on one date
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedConstituent {
    pub symbol: Symbol,
    /// 1-based, 1 is the largest market cap
    pub rank: u32,
    pub market_cap: f64,
    pub price: f64,
}

/// Rank eligible observations by market cap and keep the top `max_constituents`.
///
/// Equal market caps are ordered by symbol ascending. Fewer than
/// `max_constituents` eligible symbols is a valid, smaller index; none at all
/// is [`IndexError::InsufficientData`].
pub fn select_universe(
    date: NaiveDate,
    observations: &[DailyObservation],
    max_constituents: usize,
) -> Result<Vec<SelectedConstituent>> {
    let mut eligible: Vec<(&Symbol, f64, f64)> = observations
        .iter()
        .filter(|o| o.date == date && o.is_eligible())
        .filter_map(|o| match (o.market_cap, o.price) {
            (Some(cap), Some(price)) => Some((&o.symbol, cap, price)),
            _ => None,
        })
        .collect();

    if eligible.is_empty() {
        return Err(IndexError::InsufficientData { date });
    }

    eligible.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    // A symbol observed twice keeps its larger-cap row
    let mut seen = HashSet::new();
    eligible.retain(|e| seen.insert(e.0));
    eligible.truncate(max_constituents);

    Ok(eligible
        .into_iter()
        .enumerate()
        .map(|(i, (symbol, market_cap, price))| SelectedConstituent {
            symbol: symbol.clone(),
            rank: i as u32 + 1,
            market_cap,
            price,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn obs(symbol: &str, cap: f64) -> DailyObservation {
        DailyObservation::new(symbol, day(), 10.0, cap, 100)
    }

    #[test]
    fn test_ranks_by_cap_descending() {
        let rows = vec![obs("SMALL", 1.0), obs("BIG", 3.0), obs("MID", 2.0)];
        let selected = select_universe(day(), &rows, 100).unwrap();
        let symbols: Vec<&str> = selected.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BIG", "MID", "SMALL"]);
        assert_eq!(selected.iter().map(|s| s.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_break_by_symbol() {
        let rows = vec![obs("ZED", 5.0), obs("ABC", 5.0), obs("MNO", 5.0)];
        let first = select_universe(day(), &rows, 2).unwrap();

        let mut reversed = rows.clone();
        reversed.reverse();
        let second = select_universe(day(), &reversed, 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].symbol.as_str(), "ABC");
        assert_eq!(first[1].symbol.as_str(), "MNO");
    }

    #[test]
    fn test_filters_ineligible() {
        let mut no_price = obs("NOPRICE", 9.0);
        no_price.price = None;
        let mut zero_price = obs("ZERO", 8.0);
        zero_price.price = Some(0.0);
        let mut no_cap = obs("NOCAP", 7.0);
        no_cap.market_cap = None;

        let rows = vec![no_price, zero_price, no_cap, obs("OK", 1.0)];
        let selected = select_universe(day(), &rows, 100).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].symbol.as_str(), "OK");
    }

    #[test]
    fn test_truncates_and_accepts_short_universe() {
        let rows: Vec<_> = (0..150).map(|i| obs(&format!("S{:03}", i), i as f64)).collect();
        assert_eq!(select_universe(day(), &rows, 100).unwrap().len(), 100);
        assert_eq!(select_universe(day(), &rows[..40], 100).unwrap().len(), 40);
    }

    #[test]
    fn test_no_eligible_symbols() {
        let mut row = obs("AAPL", 1.0);
        row.price = Some(-1.0);
        assert_matches!(
            select_universe(day(), &[row], 100),
            Err(IndexError::InsufficientData { date }) if date == day()
        );
        assert_matches!(
            select_universe(day(), &[], 100),
            Err(IndexError::InsufficientData { .. })
        );
    }
}
