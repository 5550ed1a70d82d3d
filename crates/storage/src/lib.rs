//! Datastore for the eqindex engine
//!
//! The engine reads stocks and daily observations and writes one composition
//! and one performance record per trading day. [`IndexStore`] is that
//! contract; [`InMemoryIndexStore`] backs tests and single-process runs and
//! `PostgresIndexStore` (feature `postgres`) is the durable implementation.

pub mod error;
pub mod store;

pub use error::{Result, StorageError};
pub use store::memory::InMemoryIndexStore;
pub use store::traits::{BuildLease, IndexStore};

#[cfg(feature = "postgres")]
pub use store::postgres::PostgresIndexStore;
