//! Index engine error types

use cache::CacheError;
use chrono::NaiveDate;
use common::{DateRange, Symbol};
use serde::Serialize;
use storage::StorageError;
use thiserror::Error;

/// How an error propagates out of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input data; the build stops at this date and can be replayed
    Data,
    /// A selector or weighting bug; needs an operator, never retried
    Structural,
    /// Datastore or cache trouble: unreachable, timed out, or rejected the write
    Infrastructure,
    /// Another build holds the lock; retry later
    Contention,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Data => "data",
            ErrorKind::Structural => "structural",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Contention => "contention",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Insufficient data on {date}: no eligible symbols")]
    InsufficientData { date: NaiveDate },

    #[error("Missing price for {symbol} on {date}")]
    MissingPrice { date: NaiveDate, symbol: Symbol },

    #[error("Inconsistent composition on {date}: {reason}")]
    InconsistentComposition { date: NaiveDate, reason: String },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Another build is running; requested {requested} was not started")]
    BuildLockContention { requested: DateRange },

    #[error(transparent)]
    InvalidRange(#[from] common::Error),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Build cancelled")]
    Cancelled,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::InsufficientData { .. }
            | IndexError::MissingPrice { .. }
            | IndexError::InvalidRange(_) => ErrorKind::Data,
            IndexError::InconsistentComposition { .. } => ErrorKind::Structural,
            IndexError::CacheUnavailable(_)
            | IndexError::Timeout { .. }
            | IndexError::Storage(_) => ErrorKind::Infrastructure,
            IndexError::BuildLockContention { .. } => ErrorKind::Contention,
            IndexError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn inconsistent(date: NaiveDate, reason: impl Into<String>) -> Self {
        IndexError::InconsistentComposition {
            date,
            reason: reason.into(),
        }
    }
}

impl From<CacheError> for IndexError {
    fn from(e: CacheError) -> Self {
        IndexError::CacheUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(IndexError::InsufficientData { date: day }.kind(), ErrorKind::Data);
        assert_eq!(IndexError::inconsistent(day, "dup").kind(), ErrorKind::Structural);
        assert_eq!(
            IndexError::Timeout { operation: "commit_date", after_ms: 10 }.kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(
            IndexError::from(CacheError::Unavailable("down".into())).kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(IndexError::Cancelled.kind().as_str(), "cancelled");
    }
}
