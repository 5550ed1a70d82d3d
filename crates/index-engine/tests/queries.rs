//! Query and cache-consistency integration tests.
//!
//! Every query answered after a commit must match the datastore, whether
//! the cache confirmed the eviction or not.

mod support;

use common::{ChangeType, Symbol};
use index_engine::summarize_changes;
use support::{day, rows, settings, Fixture};

const EPS: f64 = 1e-9;

/// AAA, BBB, CCC on day 2; DDD replaces CCC on day 3 and BBB overtakes AAA
async fn turnover_fixture() -> Fixture {
    let fx = Fixture::new(settings(3));
    fx.load_stocks(&[
        ("AAA", "Alpha Corp", Some("Technology")),
        ("BBB", "Beta Inc", None),
        ("CCC", "Gamma Ltd", Some("Energy")),
    ])
    .await;
    fx.load(&rows(day(2), &[("AAA", 100.0, 3e9), ("BBB", 50.0, 2e9), ("CCC", 20.0, 1e9)]))
        .await;
    fx.load(&rows(
        day(3),
        &[("AAA", 100.0, 2e9), ("BBB", 55.0, 3e9), ("CCC", 18.0, 0.5e9), ("DDD", 30.0, 1e9)],
    ))
    .await;
    fx
}

// ──────────────────────────────────────────────
// Composition views and changes
// ──────────────────────────────────────────────

#[tokio::test]
async fn test_composition_joins_metadata() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();

    let views = fx.service.get_composition(day(3)).await.unwrap();
    let symbols: Vec<&str> = views.iter().map(|v| v.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BBB", "AAA", "DDD"]);

    assert_eq!(views[0].rank, 1);
    assert_eq!(views[0].company_name, "Beta Inc");
    assert_eq!(views[0].sector, "");
    assert!((views[0].price - 55.0).abs() < EPS);
    assert!((views[0].market_cap - 3e9).abs() < 1.0);
    assert_eq!(views[1].sector, "Technology");

    // No metadata for DDD
    assert_eq!(views[2].company_name, "");
    assert!((views[2].weight - 1.0 / 3.0).abs() < EPS);
}

#[tokio::test]
async fn test_uncommitted_date_is_empty() {
    let fx = turnover_fixture().await;
    assert!(fx.service.get_composition(day(2)).await.unwrap().is_empty());
    assert!(fx
        .service
        .get_performance(day(2), day(3))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_changes_account_for_every_symbol() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();

    let changes = fx.service.get_composition_changes(day(3), day(3)).await.unwrap();

    let find = |symbol: &str| {
        changes
            .iter()
            .find(|c| c.symbol.as_str() == symbol)
            .map(|c| (c.change_type, c.old_rank, c.new_rank))
    };
    assert_eq!(find("DDD"), Some((ChangeType::Added, None, Some(3))));
    assert_eq!(find("CCC"), Some((ChangeType::Removed, Some(3), None)));
    assert_eq!(find("BBB"), Some((ChangeType::RankChanged, Some(2), Some(1))));
    assert_eq!(find("AAA"), Some((ChangeType::RankChanged, Some(1), Some(2))));
    assert_eq!(changes.len(), 4);
}

#[tokio::test]
async fn test_first_date_changes_are_all_additions() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();

    let summary = fx
        .service
        .get_composition_change_summary(day(2), day(3))
        .await
        .unwrap();

    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].date, day(2));
    assert_eq!(
        summary[0].added,
        vec![Symbol::new("AAA"), Symbol::new("BBB"), Symbol::new("CCC")]
    );
    assert!(summary[0].removed.is_empty());
    assert_eq!(summary[1].added, vec![Symbol::new("DDD")]);
    assert_eq!(summary[1].removed, vec![Symbol::new("CCC")]);

    let changes = fx.service.get_composition_changes(day(2), day(3)).await.unwrap();
    assert_eq!(summarize_changes(&changes), summary);
}

// ──────────────────────────────────────────────
// Performance
// ──────────────────────────────────────────────

#[tokio::test]
async fn test_performance_summary_compounds_range() {
    let fx = Fixture::new(settings(1));
    for (d, price) in [(2, 100.0), (3, 101.0), (4, 98.98), (5, 99.4749)] {
        fx.load(&rows(day(d), &[("AAA", price, 1e9)])).await;
    }
    fx.service.build_index(day(2), day(5)).await.unwrap();

    let summary = fx.service.get_performance_summary(day(4), day(5)).await.unwrap();
    assert_eq!(summary.records.len(), 2);

    // Only the returns inside the range compound: (1 - 0.02)(1 + 0.005) - 1
    assert!((summary.records[0].daily_return + 0.02).abs() < 1e-9);
    assert!((summary.records[1].daily_return - 0.005).abs() < 1e-9);
    assert!((summary.period_return - (0.98 * 1.005 - 1.0)).abs() < 1e-9);

    // Cumulative carries the whole history: (1.01)(0.98)(1.005) - 1
    assert!((summary.records[1].cumulative_return - (1.01 * 0.98 * 1.005 - 1.0)).abs() < 1e-9);
}

// ──────────────────────────────────────────────
// Cache consistency
// ──────────────────────────────────────────────

#[tokio::test]
async fn test_answers_are_cached_with_dependencies() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();
    assert_eq!(fx.backend.len(), 0);

    let first = fx.service.get_composition(day(3)).await.unwrap();
    fx.service.get_performance(day(2), day(3)).await.unwrap();
    fx.service.get_composition_changes(day(3), day(3)).await.unwrap();

    assert_eq!(fx.backend.len(), 3);
    // composition(3), performance(2..3) and changes(3..3) based on day 2
    assert_eq!(fx.backend.dependents(day(3)).len(), 3);
    assert_eq!(fx.backend.dependents(day(2)).len(), 2);

    assert_eq!(fx.service.get_composition(day(3)).await.unwrap(), first);
}

#[tokio::test]
async fn test_changes_without_prior_composition_are_not_cached() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();

    fx.service.get_composition_changes(day(2), day(3)).await.unwrap();
    assert_eq!(fx.backend.len(), 0);
}

#[tokio::test]
async fn test_long_ranges_are_served_uncached() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();

    // Longer than the default five-year cap
    let start = chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
    let records = fx.service.get_performance(start, day(3)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(fx.backend.len(), 0);

    fx.service.get_performance(day(2), day(3)).await.unwrap();
    assert_eq!(fx.backend.len(), 1);
}

#[tokio::test]
async fn test_rebuild_evicts_stale_answers() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();

    let before = fx.service.get_composition(day(3)).await.unwrap();
    let perf_before = fx.service.get_performance(day(2), day(3)).await.unwrap();
    assert_eq!(before[2].symbol.as_str(), "DDD");

    // CCC recovers on day 3 and pushes DDD out
    fx.load(&rows(day(3), &[("CCC", 25.0, 1.5e9)])).await;
    let result = fx.service.build_index(day(3), day(3)).await.unwrap();
    assert!(result.invalidation_gaps.is_empty());

    let after = fx.service.get_composition(day(3)).await.unwrap();
    assert_eq!(after[2].symbol.as_str(), "CCC");
    assert_eq!(
        after.iter().map(|v| v.symbol.clone()).collect::<Vec<_>>(),
        fx.composition(day(3))
            .await
            .into_iter()
            .map(|e| e.symbol)
            .collect::<Vec<_>>()
    );

    let perf_after = fx.service.get_performance(day(2), day(3)).await.unwrap();
    assert_ne!(perf_after, perf_before);
    assert_eq!(Some(perf_after[1]), fx.performance(day(3)).await);
}

#[tokio::test]
async fn test_unconfirmed_invalidation_bypasses_cache() {
    let fx = turnover_fixture().await;
    fx.service.build_index(day(2), day(3)).await.unwrap();
    let stale = fx.service.get_composition(day(3)).await.unwrap();

    fx.backend.set_failing(true);
    fx.load(&rows(day(3), &[("CCC", 25.0, 1.5e9)])).await;

    let result = fx.service.build_index(day(3), day(3)).await.unwrap();
    assert_eq!(result.committed, vec![day(3)]);
    assert_eq!(result.invalidation_gaps, vec![day(3)]);
    assert_eq!(fx.cache.pending_dates(), vec![day(3)]);

    // The stale entry is still in the backend but must not be served
    let served = fx.service.get_composition(day(3)).await.unwrap();
    assert_ne!(served, stale);
    assert_eq!(served[2].symbol.as_str(), "CCC");

    // Once the backend recovers, the queued eviction is flushed
    fx.backend.set_failing(false);
    let recovered = fx.service.get_composition(day(3)).await.unwrap();
    assert_eq!(recovered, served);
    assert!(fx.cache.pending_dates().is_empty());
    assert!(fx.backend.dependents(day(3)).len() == 1);
}
