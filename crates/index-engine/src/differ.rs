//! Composition differ

use chrono::NaiveDate;
use common::{ChangeType, CompositionChange, CompositionEntry, Symbol};
use std::collections::HashMap;

/// Classify every symbol of `prior ∪ current`.
///
/// Output order: additions and rank changes in current rank order, then
/// removals in prior rank order. Symbols with an unchanged rank are omitted.
/// An empty `prior` makes every current symbol an addition.
pub fn diff_compositions(
    date: NaiveDate,
    prior: &[CompositionEntry],
    current: &[CompositionEntry],
) -> Vec<CompositionChange> {
    let prior_ranks: HashMap<&Symbol, u32> = prior.iter().map(|e| (&e.symbol, e.rank)).collect();
    let current_ranks: HashMap<&Symbol, u32> =
        current.iter().map(|e| (&e.symbol, e.rank)).collect();

    let mut current_sorted: Vec<&CompositionEntry> = current.iter().collect();
    current_sorted.sort_by_key(|e| e.rank);
    let mut prior_sorted: Vec<&CompositionEntry> = prior.iter().collect();
    prior_sorted.sort_by_key(|e| e.rank);

    let mut changes = Vec::new();

    for entry in current_sorted {
        match prior_ranks.get(&entry.symbol) {
            None => changes.push(CompositionChange {
                date,
                symbol: entry.symbol.clone(),
                change_type: ChangeType::Added,
                old_rank: None,
                new_rank: Some(entry.rank),
            }),
            Some(&old) if old != entry.rank => changes.push(CompositionChange {
                date,
                symbol: entry.symbol.clone(),
                change_type: ChangeType::RankChanged,
                old_rank: Some(old),
                new_rank: Some(entry.rank),
            }),
            Some(_) => {}
        }
    }

    for entry in prior_sorted {
        if !current_ranks.contains_key(&entry.symbol) {
            changes.push(CompositionChange {
                date,
                symbol: entry.symbol.clone(),
                change_type: ChangeType::Removed,
                old_rank: Some(entry.rank),
                new_rank: None,
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    }

    fn comp(symbols: &[&str]) -> Vec<CompositionEntry> {
        symbols
            .iter()
            .enumerate()
            .map(|(i, s)| CompositionEntry {
                date: day(),
                symbol: Symbol::new(*s),
                weight: 1.0 / symbols.len() as f64,
                rank: i as u32 + 1,
            })
            .collect()
    }

    #[test]
    fn test_first_date_is_all_additions() {
        let changes = diff_compositions(day(), &[], &comp(&["A", "B"]));
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.change_type == ChangeType::Added));
    }

    #[test]
    fn test_classification() {
        let prior = comp(&["A", "B", "C", "D"]);
        let current = comp(&["B", "A", "C", "E"]);
        let changes = diff_compositions(day(), &prior, &current);

        let find = |s: &str| changes.iter().find(|c| c.symbol.as_str() == s);
        assert_eq!(find("B").unwrap().change_type, ChangeType::RankChanged);
        assert_eq!(find("B").unwrap().old_rank, Some(2));
        assert_eq!(find("B").unwrap().new_rank, Some(1));
        assert_eq!(find("A").unwrap().change_type, ChangeType::RankChanged);
        assert!(find("C").is_none());
        assert_eq!(find("E").unwrap().change_type, ChangeType::Added);
        assert_eq!(find("D").unwrap().change_type, ChangeType::Removed);
        assert_eq!(find("D").unwrap().old_rank, Some(4));
    }

    #[test]
    fn test_every_symbol_accounted_for_once() {
        let prior = comp(&["A", "B", "C", "D", "F"]);
        let current = comp(&["F", "B", "C", "X", "Y"]);
        let changes = diff_compositions(day(), &prior, &current);

        let mut seen = HashSet::new();
        for change in &changes {
            assert!(seen.insert(change.symbol.clone()), "{} twice", change.symbol);
        }

        let unchanged: HashSet<Symbol> = prior
            .iter()
            .filter(|p| current.iter().any(|c| c.symbol == p.symbol && c.rank == p.rank))
            .map(|p| p.symbol.clone())
            .collect();
        let union: HashSet<Symbol> = prior.iter().chain(&current).map(|e| e.symbol.clone()).collect();

        assert!(seen.is_disjoint(&unchanged));
        assert_eq!(seen.len() + unchanged.len(), union.len());
    }
}
