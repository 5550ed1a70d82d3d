//! Terminal and JSON rendering of command results

use anyhow::Result;
use cli::OutputFormat;
use common::{CompositionChange, ConstituentView, DailyChangeSummary, PerformanceSummary, Symbol};
use index_engine::BuildResult;
use serde::Serialize;

fn json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn join(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn rank(rank: Option<u32>) -> String {
    rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn build_result(result: &BuildResult, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(result);
    }

    println!("Requested: {}", result.requested);
    if result.effective != result.requested {
        println!("Effective: {} (extended over committed dates)", result.effective);
    }
    println!("Committed: {} date(s)", result.committed.len());
    if let Some(last) = result.last_successful_date {
        println!("Last successful date: {}", last);
    }
    for failure in &result.failures {
        println!(
            "Failed: {} in {} ({}): {}",
            failure.date, failure.state, failure.kind, failure.message
        );
    }
    if result.cancelled {
        println!("Cancelled before the end of the range");
    }
    if !result.invalidation_gaps.is_empty() {
        let dates: Vec<String> = result
            .invalidation_gaps
            .iter()
            .map(|d| d.to_string())
            .collect();
        println!("Cache eviction unconfirmed for: {}", dates.join(", "));
    }
    if !result.discarded.is_empty() {
        let dates: Vec<String> = result.discarded.iter().map(|d| d.to_string()).collect();
        println!("Discarded, rebuild to restore: {}", dates.join(", "));
    }
    if let Some(after) = result.stale_after {
        println!("Stale: records after {} chain from replaced dates", after);
    }
    Ok(())
}

pub fn composition(views: &[ConstituentView], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(views);
    }

    if views.is_empty() {
        println!("No composition for this date");
        return Ok(());
    }

    println!(
        "{:>4}  {:<8} {:<32} {:<24} {:>10} {:>18} {:>8}",
        "Rank", "Symbol", "Company", "Sector", "Price", "Market Cap", "Weight"
    );
    for view in views {
        println!(
            "{:>4}  {:<8} {:<32} {:<24} {:>10.2} {:>18.0} {:>7.4}%",
            view.rank,
            view.symbol.as_str(),
            view.company_name,
            view.sector,
            view.price,
            view.market_cap,
            view.weight * 100.0
        );
    }
    Ok(())
}

pub fn changes(changes: &[CompositionChange], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(changes);
    }

    if changes.is_empty() {
        println!("No composition changes in this range");
        return Ok(());
    }

    println!(
        "{:<10}  {:<8} {:<12} {:>8} {:>8}",
        "Date", "Symbol", "Change", "Old", "New"
    );
    for change in changes {
        println!(
            "{:<10}  {:<8} {:<12} {:>8} {:>8}",
            change.date.to_string(),
            change.symbol.as_str(),
            change.change_type.as_str(),
            rank(change.old_rank),
            rank(change.new_rank)
        );
    }
    Ok(())
}

pub fn change_summary(summary: &[DailyChangeSummary], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(summary);
    }

    if summary.is_empty() {
        println!("No additions or removals in this range");
        return Ok(());
    }

    for day in summary {
        println!("{}", day.date);
        if !day.added.is_empty() {
            println!("  added:   {}", join(&day.added));
        }
        if !day.removed.is_empty() {
            println!("  removed: {}", join(&day.removed));
        }
    }
    Ok(())
}

pub fn performance(summary: &PerformanceSummary, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(summary);
    }

    if summary.records.is_empty() {
        println!("No performance records in this range");
        return Ok(());
    }

    println!("{:<10}  {:>12} {:>12}", "Date", "Daily", "Cumulative");
    for record in &summary.records {
        println!(
            "{:<10}  {:>11.4}% {:>11.4}%",
            record.date.to_string(),
            record.daily_return * 100.0,
            record.cumulative_return * 100.0
        );
    }
    println!();
    println!("Period return: {:.4}%", summary.period_return * 100.0);
    Ok(())
}
