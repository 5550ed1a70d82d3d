//! Store module exports

pub mod memory;
pub mod traits;

#[cfg(feature = "postgres")]
pub mod postgres;
