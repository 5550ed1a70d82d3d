//! Cache keys derived from a query's endpoint and parameters

use chrono::NaiveDate;
use common::DateRange;

/// Query endpoints whose answers are cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Composition,
    CompositionChanges,
    Performance,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Composition => "composition",
            Endpoint::CompositionChanges => "composition_changes",
            Endpoint::Performance => "performance",
        }
    }
}

/// Identifies one cached answer.
///
/// Parameters are normalised (ISO dates, inclusive `start..end`), so equal
/// queries always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    endpoint: Endpoint,
    params: String,
}

impl Fingerprint {
    pub fn for_date(endpoint: Endpoint, date: NaiveDate) -> Self {
        Self {
            endpoint,
            params: date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn for_range(endpoint: Endpoint, range: &DateRange) -> Self {
        Self {
            endpoint,
            params: format!(
                "{}..{}",
                range.start().format("%Y-%m-%d"),
                range.end().format("%Y-%m-%d")
            ),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    /// Canonical storage key: `{prefix}:{endpoint}:{params}`
    pub fn key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.endpoint.as_str(), self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let range = DateRange::new(day, end).unwrap();

        assert_eq!(
            Fingerprint::for_date(Endpoint::Composition, day).key("eqindex"),
            "eqindex:composition:2024-03-01"
        );
        assert_eq!(
            Fingerprint::for_range(Endpoint::Performance, &range).key("eqindex"),
            "eqindex:performance:2024-03-01..2024-03-31"
        );
        assert_ne!(
            Fingerprint::for_range(Endpoint::Performance, &range),
            Fingerprint::for_range(Endpoint::CompositionChanges, &range)
        );
    }

    #[test]
    fn test_single_day_range_differs_from_date() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let a = Fingerprint::for_date(Endpoint::Performance, day);
        let b = Fingerprint::for_range(Endpoint::Performance, &DateRange::single(day));
        assert_ne!(a.params(), b.params());
    }
}
