//! Per-container serialization of sync calls.
//!
//! Each container has its own lane. A sync holds its lane's [`SyncTicket`]
//! from staging until the remote call resolves, so a later sync of the same
//! container starts only after the earlier response has been applied.
//! Tokio mutexes are fair, which keeps lanes first-come first-served.
//! Different containers never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use syllabus_tree::ContainerKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Exclusive right to sync one container.
#[derive(Debug)]
pub struct SyncTicket {
    container: ContainerKey,
    guard: OwnedMutexGuard<u64>,
}

impl SyncTicket {
    /// The container this ticket serializes.
    #[must_use]
    pub const fn container(&self) -> ContainerKey {
        self.container
    }

    /// Position of this sync in its lane, starting at 1.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        *self.guard
    }
}

/// Lanes of pending syncs, one per container.
#[derive(Debug, Default)]
pub struct SyncQueue {
    lanes: Mutex<HashMap<ContainerKey, Arc<AsyncMutex<u64>>>>,
}

impl SyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, container: ContainerKey) -> Arc<AsyncMutex<u64>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(lanes.entry(container).or_default())
    }

    /// Waits for every earlier sync of `container` to finish.
    pub async fn acquire(&self, container: ContainerKey) -> SyncTicket {
        let mut guard = self.lane(container).lock_owned().await;
        *guard += 1;
        trace!(container = %container, sequence = *guard, "Acquired sync lane");
        SyncTicket { container, guard }
    }

    /// Drops the lane of a container that no longer exists.
    pub fn remove(&self, container: &ContainerKey) {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(container);
    }
}
