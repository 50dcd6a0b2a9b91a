//! Concurrency admission control
//!
//! Two gates guard every pipeline run:
//!
//! - A **global permit pool** bounding how many uploads may be in flight at
//!   once across all users. Acquisition suspends until a slot frees up; the
//!   permit is released exactly once via RAII, on every exit path.
//! - A **per-user exclusion slot**. This is a try-lock: a user who already
//!   has an operation running is rejected immediately instead of queued, so
//!   one user can never starve others by piling up waiters.
//!
//! The permit pool is hot-reloadable: [`ConcurrencyGate::set_limit`] swaps in
//! a fresh semaphore atomically. Permits already handed out drain on the old
//! pool, so the new bound applies to subsequent acquisitions only.

use crate::error::{Error, Result};
use crate::types::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

/// Ownership token for one occupied slot in the global upload bound
///
/// Dropping the permit releases the slot. There is no manual release call,
/// so a permit cannot leak across an error or cancellation path.
#[derive(Debug)]
pub struct UploadPermit {
    _permit: OwnedSemaphorePermit,
}

/// Exclusive per-user slot held for the duration of one pipeline run
#[derive(Debug)]
pub struct UserSlot {
    _guard: OwnedMutexGuard<()>,
}

/// Global admission control plus per-user exclusion locks
pub struct ConcurrencyGate {
    /// Current global permit pool. Swapped wholesale on limit changes,
    /// never resized in place.
    global: RwLock<Arc<Semaphore>>,

    /// One long-lived lock per user, created on first use. Entries whose
    /// lock is not held are pruned on insert so the map cannot grow without
    /// bound.
    user_slots: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConcurrencyGate {
    /// Create a gate with the given global concurrency limit
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            global: RwLock::new(Arc::new(Semaphore::new(max_concurrent))),
            user_slots: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a global upload permit, suspending until one is available
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if the gate has been closed.
    pub async fn acquire_global(&self) -> Result<UploadPermit> {
        // Snapshot the current pool; a concurrent set_limit only affects
        // acquisitions that start after the swap.
        let semaphore = {
            let guard = self
                .global
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(&guard)
        };

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        Ok(UploadPermit { _permit: permit })
    }

    /// Try to take the per-user exclusion slot
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationInProgress`] immediately if the slot is
    /// already held; callers are expected to surface this to the user rather
    /// than wait.
    pub fn try_acquire_user(&self, user_id: UserId) -> Result<UserSlot> {
        let lock = self.user_lock(user_id);

        match lock.try_lock_owned() {
            Ok(guard) => Ok(UserSlot { _guard: guard }),
            Err(_) => Err(Error::OperationInProgress),
        }
    }

    /// Acquire the per-user exclusion slot, waiting for it to free up
    ///
    /// Only scheduled runs use this; they queue behind an in-flight
    /// interactive operation instead of being rejected.
    pub async fn acquire_user(&self, user_id: UserId) -> UserSlot {
        let lock = self.user_lock(user_id);
        let guard = lock.lock_owned().await;
        UserSlot { _guard: guard }
    }

    /// Whether the user currently holds their exclusion slot
    pub fn user_busy(&self, user_id: UserId) -> bool {
        let slots = self
            .user_slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match slots.get(&user_id) {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }

    /// Replace the global concurrency limit
    ///
    /// The swap is atomic: readers either see the old pool or the new one.
    /// Permits already held drain against the old pool when dropped.
    pub fn set_limit(&self, max_concurrent: usize) {
        let mut guard = self
            .global
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(Semaphore::new(max_concurrent));
        tracing::info!(max_concurrent, "Global upload concurrency limit updated");
    }

    /// Number of currently available global permits
    pub fn available_permits(&self) -> usize {
        let guard = self
            .global
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.available_permits()
    }

    /// Close the permit pool so pending and future acquisitions fail
    ///
    /// Used once, at shutdown.
    pub fn close(&self) {
        let guard = self
            .global
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.close();
    }

    /// Get or create the long-lived lock for a user
    ///
    /// This is the single synchronized insert point for the per-user lock
    /// registry. Stale entries (strong count of one means only the map holds
    /// the lock, so nobody has it locked) are pruned here to keep the map
    /// from leaking one entry per user ever seen.
    fn user_lock(&self, user_id: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self
            .user_slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        slots.retain(|id, lock| *id == user_id || Arc::strong_count(lock) > 1);

        Arc::clone(
            slots
                .entry(user_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
