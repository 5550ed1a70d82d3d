//! Observability for eqindex
//!
//! - Structured logging via tracing
//! - Prometheus metrics for index builds and the query cache
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("eqindex", LogFormat::Pretty)?;
//! observability::metrics::init_metrics(9100)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, BuildMetrics, BuildTimer, CacheMetrics, CacheOutcome};
