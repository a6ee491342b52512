//! Per-appointment serialization within one process.
//!
//! Transitions on the same appointment queue behind one async mutex;
//! different appointments never contend. Across processes the store's
//! compare-and-set remains the single-writer guarantee.

use crate::types::AppointmentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries beyond this count trigger pruning of idle locks.
const PRUNE_THRESHOLD: usize = 1024;

/// Keyed async locks, one per appointment.
#[derive(Debug, Default)]
pub struct AppointmentLocks {
    locks: Mutex<HashMap<AppointmentId, Arc<AsyncMutex<()>>>>,
}

impl AppointmentLocks {
    /// Create an empty lock table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one appointment.
    ///
    /// The lock is released when the guard is dropped.
    pub async fn acquire(&self, id: AppointmentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the table holds an idle lock
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of tracked appointments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no appointment is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
