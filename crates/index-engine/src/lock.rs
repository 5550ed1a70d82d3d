//! Commit gate
//!
//! A read/write lock between builds and queries of one service. A build
//! holds it exclusively while it commits or discards dates and evicts their
//! cached answers; queries hold it shared while they look up, compute and
//! store an answer. Exclusion between builds is the datastore's build lease.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct CommitGate {
    inner: RwLock<()>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.write().await
    }
}
