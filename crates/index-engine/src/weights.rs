//! Equal weighting and composition consistency checks

use crate::error::{IndexError, Result};
use crate::selector::SelectedConstituent;
use chrono::NaiveDate;
use common::CompositionEntry;
use std::collections::HashSet;

/// Assign every constituent the same weight `1/N`.
///
/// With `precision` set, weights are truncated to that many decimals and
/// the residual, at most `N * 10^-precision`, goes to rank 1 so the weights
/// still sum to 1. Truncation keeps the residual non-negative.
pub fn assign_weights(
    date: NaiveDate,
    selected: &[SelectedConstituent],
    precision: Option<u32>,
) -> Vec<CompositionEntry> {
    let n = selected.len();
    if n == 0 {
        return Vec::new();
    }

    let exact = 1.0 / n as f64;
    let (weight, first) = match precision {
        None => (exact, exact),
        Some(p) => {
            let scale = 10f64.powi(p as i32);
            let truncated = (scale / n as f64).floor() / scale;
            (truncated, 1.0 - truncated * (n - 1) as f64)
        }
    };

    selected
        .iter()
        .map(|c| CompositionEntry {
            date,
            symbol: c.symbol.clone(),
            weight: if c.rank == 1 { first } else { weight },
            rank: c.rank,
        })
        .collect()
}

/// Reject compositions that break the weighting invariants.
///
/// Any failure here is a selection or weighting bug, reported as
/// [`IndexError::InconsistentComposition`] and never corrected.
pub fn validate_composition(
    date: NaiveDate,
    entries: &[CompositionEntry],
    tolerance: f64,
) -> Result<()> {
    let n = entries.len();
    if n == 0 {
        return Err(IndexError::inconsistent(date, "composition is empty"));
    }

    let mut symbols = HashSet::with_capacity(n);
    let mut ranks = vec![false; n];
    let mut sum = 0.0;

    for entry in entries {
        if entry.date != date {
            return Err(IndexError::inconsistent(
                date,
                format!("{} carries date {}", entry.symbol, entry.date),
            ));
        }
        if !symbols.insert(&entry.symbol) {
            return Err(IndexError::inconsistent(
                date,
                format!("duplicate symbol {}", entry.symbol),
            ));
        }
        let slot = (entry.rank as usize).checked_sub(1).filter(|i| *i < n);
        match slot {
            Some(i) if !ranks[i] => ranks[i] = true,
            Some(_) => {
                return Err(IndexError::inconsistent(
                    date,
                    format!("duplicate rank {}", entry.rank),
                ))
            }
            None => {
                return Err(IndexError::inconsistent(
                    date,
                    format!("rank {} outside 1..={}", entry.rank, n),
                ))
            }
        }
        if !(entry.weight.is_finite() && entry.weight > 0.0 && entry.weight <= 1.0) {
            return Err(IndexError::inconsistent(
                date,
                format!("weight {} of {} outside (0, 1]", entry.weight, entry.symbol),
            ));
        }
        sum += entry.weight;
    }

    if (sum - 1.0).abs() > tolerance {
        return Err(IndexError::inconsistent(
            date,
            format!("weights sum to {} (tolerance {})", sum, tolerance),
        ));
    }

    Ok(())
}
