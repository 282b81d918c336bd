//! Per-key async locks.
//!
//! Topic creation must be race-free per `(b_chat, a_chat)`: two handlers
//! that both miss the binding would otherwise create two topics. Holding
//! the key's lock across lookup, create and record closes that window
//! without serialising unrelated conversations.

#![allow(clippy::disallowed_types, reason = "Map lock is never held across an await")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::OwnedMutexGuard;

/// Guard for one key; the lock is released on drop.
pub type KeyGuard = OwnedMutexGuard<()>;

/// Lazily created mutex per string key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = {
            #[allow(clippy::expect_used)]
            let mut locks = self.locks.lock().expect("Mutex poisoned");
            // Drop entries nobody holds or waits on
            locks.retain(|held, lock| held == key || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.locks.lock().expect("Mutex poisoned").len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
