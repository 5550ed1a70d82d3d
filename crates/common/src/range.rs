//! Inclusive date ranges and the trading calendar

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// An inclusive `[start, end]` range of calendar dates.
///
/// Construction validates `start <= end`, so every `DateRange` in the
/// system is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a validated range
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single date
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns a copy with the end moved later, never earlier
    pub fn extend_to(&self, end: NaiveDate) -> Self {
        Self {
            start: self.start,
            end: self.end.max(end),
        }
    }

    /// Number of calendar days in the range
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Iterate over every calendar date in ascending order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Decides which dates of a range are trading days
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingCalendar {
    /// Every date that has at least one observation row
    #[default]
    Observed,
    /// Every Monday to Friday, whether or not data exists
    Weekdays,
}

impl TradingCalendar {
    /// Select the trading days of `range`.
    ///
    /// `observed` must hold the dates that have observation rows, in any order.
    pub fn trading_days(&self, range: &DateRange, observed: &[NaiveDate]) -> Vec<NaiveDate> {
        match self {
            TradingCalendar::Observed => {
                let mut days: Vec<NaiveDate> = observed
                    .iter()
                    .copied()
                    .filter(|d| range.contains(*d))
                    .collect();
                days.sort();
                days.dedup();
                days
            }
            TradingCalendar::Weekdays => range.days().filter(|d| is_weekday(*d)).collect(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "observed" => Some(Self::Observed),
            "weekdays" => Some(Self::Weekdays),
            _ => None,
        }
    }
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_range_validation() {
        assert!(DateRange::new(d(2024, 1, 2), d(2024, 1, 1)).is_err());
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 1)).unwrap();
        assert_eq!(range.num_days(), 1);
    }

    #[test]
    fn test_range_days_inclusive() {
        let range = DateRange::new(d(2024, 1, 30), d(2024, 2, 2)).unwrap();
        let days: Vec<_> = range.days().collect();
        assert_eq!(days, vec![d(2024, 1, 30), d(2024, 1, 31), d(2024, 2, 1), d(2024, 2, 2)]);
        assert_eq!(range.num_days(), 4);
    }

    #[test]
    fn test_range_extend() {
        let a = DateRange::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();
        assert!(a.contains(d(2024, 1, 10)));
        assert_eq!(a.extend_to(d(2024, 1, 5)), a);
        assert_eq!(a.extend_to(d(2024, 1, 15)).end(), d(2024, 1, 15));
    }

    #[test]
    fn test_weekday_calendar() {
        // 2024-01-05 is a Friday
        let range = DateRange::new(d(2024, 1, 5), d(2024, 1, 8)).unwrap();
        let days = TradingCalendar::Weekdays.trading_days(&range, &[]);
        assert_eq!(days, vec![d(2024, 1, 5), d(2024, 1, 8)]);
    }

    #[test]
    fn test_observed_calendar_filters_and_sorts() {
        let range = DateRange::new(d(2024, 1, 2), d(2024, 1, 4)).unwrap();
        let observed = [d(2024, 1, 4), d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 4)];
        let days = TradingCalendar::Observed.trading_days(&range, &observed);
        assert_eq!(days, vec![d(2024, 1, 2), d(2024, 1, 4)]);
    }
}
