//! Equal-weight index engine
//!
//! Builds a daily equal-weighted index of the largest symbols by market cap
//! and answers composition and performance queries over it.
//!
//! # Pipeline
//!
//! For each trading day of a build range, in ascending order:
//!
//! 1. [`selector`] ranks eligible symbols by market cap and keeps the top N
//! 2. [`weights`] assigns equal weights and validates the composition
//! 3. [`differ`] compares it with the previous committed composition
//! 4. [`returns`] computes the daily return and chains the cumulative one
//! 5. the [`orchestrator`] commits composition and performance together and
//!    evicts cached answers depending on the date
//!
//! [`IndexService`] is the entry point: builds under the datastore's build
//! lease plus cached queries.

pub mod differ;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod returns;
pub mod selector;
pub mod service;
pub mod settings;
pub mod state;
pub mod weights;

pub use error::{ErrorKind, IndexError, Result};
pub use lock::CommitGate;
pub use orchestrator::{BuildFailure, BuildOrchestrator, BuildResult};
pub use service::{summarize_changes, IndexService};
pub use settings::EngineSettings;
pub use state::{BuildState, DateBuild};

pub use tokio_util::sync::CancellationToken;
