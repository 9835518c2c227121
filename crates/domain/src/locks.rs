//! Per-aggregate async locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::AggregateId;
use tokio::sync::OwnedMutexGuard;

/// Idle entries are swept once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Serializes commands per aggregate inside one process.
///
/// Two commands on the same order (or the same wallet) queue behind each
/// other; commands on different aggregates never contend. The event store's
/// version check still catches writers in other processes.
#[derive(Clone, Default)]
pub struct AggregateLocks {
    locks: Arc<Mutex<HashMap<AggregateId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AggregateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `aggregate_id`.
    pub async fn acquire(&self, aggregate_id: AggregateId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > PRUNE_THRESHOLD {
                // Only the map holds idle locks.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(aggregate_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked aggregates.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
