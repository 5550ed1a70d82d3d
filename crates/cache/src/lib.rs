//! Query cache for eqindex
//!
//! Every cached answer is stored with the set of dates it was computed from.
//! Committing a date evicts exactly the answers that depend on it, through a
//! `date -> keys` index kept by the backend.
//!
//! - [`Fingerprint`]: endpoint plus normalised parameters, the cache key
//! - [`CacheBackend`]: payload and dependency storage ([`MemoryCacheBackend`],
//!   `RedisCacheBackend` behind the `redis` feature)
//! - [`CacheManager`]: lookups, stores, and invalidation with a retry queue

pub mod backend;
pub mod error;
pub mod fingerprint;
pub mod manager;

pub use backend::memory::MemoryCacheBackend;
pub use backend::CacheBackend;
pub use error::{CacheError, Result};
pub use fingerprint::{Endpoint, Fingerprint};
pub use manager::CacheManager;

#[cfg(feature = "redis")]
pub use backend::redis::RedisCacheBackend;
