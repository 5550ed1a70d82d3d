//! Common error types for eqindex

use chrono::NaiveDate;
use thiserror::Error;

/// Common error type used across eqindex crates
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A date range whose start lies after its end
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// Invalid input was provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using the common Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
