//! Common types for eqindex
//!
//! This crate provides the domain types shared by the storage, cache and
//! index engine crates.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Index domain types (Symbol, DailyObservation, CompositionEntry, ...)
//! - [`range`] - Inclusive date ranges and the trading calendar

pub mod error;
pub mod range;
pub mod types;

pub use error::{Error, Result};
pub use range::{DateRange, TradingCalendar};
pub use types::*;
