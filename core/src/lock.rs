//! Per-key async critical sections.
//!
//! `KeyedMutex` hands out one `tokio::sync::Mutex` per key. Holders of the
//! same key run one at a time; different keys never contend. The guard is
//! owned, so it can be held across `.await` points and moved into tasks.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// Guard returned by [`KeyedMutex::lock`]. The section ends when it drops.
pub type KeyGuard = tokio::sync::OwnedMutexGuard<()>;

/// A registry of async mutexes keyed by `K`.
#[derive(Debug)]
pub struct KeyedMutex<K> {
    slots: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for exclusive access to `key`.
    ///
    /// Waiters on the same key are served in FIFO order (tokio's mutex is
    /// fair).
    pub async fn lock(&self, key: &K) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Drops slots that nobody holds or waits on. Returns how many were removed.
    ///
    /// Every holder and waiter keeps a clone of the slot's `Arc`, and clones
    /// are only taken under the registry lock, so a strong count of one means
    /// the slot is idle.
    pub fn prune(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - slots.len()
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
