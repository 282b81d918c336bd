//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations. Used to check that a
//! failed store call aborts a handler without leaving half-written rows
//! and that the failure is reported rather than swallowed.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use super::{
    ChatThreadPair, ContactName, EphemeralSettings, MessagePair, Storage, StorageError,
    StoreStats,
};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails each
/// operation with the configured probability. Failures are drawn from a
/// seeded LCG so runs are reproducible.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Linear congruential generator for deterministic chaos.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner`, failing with probability `failure_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Count the operation and decide whether it fails.
    fn gate(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
        #[allow(clippy::expect_used)]
        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        if roll < self.failure_rate {
            Err(StorageError::Io("chaotic failure injection".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn record_msg_pair(&self, pair: &MessagePair) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.record_msg_pair(pair)
    }

    fn lookup_b_from_a(
        &self,
        a_msg_id: &str,
        a_chat: &str,
    ) -> Result<Option<MessagePair>, StorageError> {
        self.gate()?;
        self.inner.lookup_b_from_a(a_msg_id, a_chat)
    }

    fn lookup_a_from_b(
        &self,
        b_chat: i64,
        b_msg: i64,
        b_thread: i64,
    ) -> Result<Option<MessagePair>, StorageError> {
        self.gate()?;
        self.inner.lookup_a_from_b(b_chat, b_msg, b_thread)
    }

    fn delete_msg_pair_by_b(&self, b_chat: i64, b_msg: i64) -> Result<usize, StorageError> {
        self.gate()?;
        self.inner.delete_msg_pair_by_b(b_chat, b_msg)
    }

    fn delete_all_msg_pairs(&self) -> Result<usize, StorageError> {
        self.gate()?;
        self.inner.delete_all_msg_pairs()
    }

    fn unread_msg_pairs(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Vec<MessagePair>, StorageError> {
        self.gate()?;
        self.inner.unread_msg_pairs(a_chat, b_chat)
    }

    fn mark_read(&self, a_chat: &str, a_msg_ids: &[String]) -> Result<usize, StorageError> {
        self.gate()?;
        self.inner.mark_read(a_chat, a_msg_ids)
    }

    fn record_chat_thread(&self, pair: &ChatThreadPair) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.record_chat_thread(pair)
    }

    fn chat_thread_by_a(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError> {
        self.gate()?;
        self.inner.chat_thread_by_a(a_chat, b_chat)
    }

    fn chat_thread_by_b(
        &self,
        b_chat: i64,
        b_thread: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError> {
        self.gate()?;
        self.inner.chat_thread_by_b(b_chat, b_thread)
    }

    fn chat_threads(&self, b_chat: i64) -> Result<Vec<ChatThreadPair>, StorageError> {
        self.gate()?;
        self.inner.chat_threads(b_chat)
    }

    fn delete_chat_thread(&self, a_chat: &str, b_chat: i64) -> Result<bool, StorageError> {
        self.gate()?;
        self.inner.delete_chat_thread(a_chat, b_chat)
    }

    fn upsert_contact(&self, a_user: &str, names: &ContactName) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.upsert_contact(a_user, names)
    }

    fn bulk_upsert_contacts(
        &self,
        contacts: &[(String, ContactName)],
    ) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.bulk_upsert_contacts(contacts)
    }

    fn contact(&self, a_user: &str) -> Result<Option<ContactName>, StorageError> {
        self.gate()?;
        self.inner.contact(a_user)
    }

    fn contacts(&self) -> Result<Vec<(String, ContactName)>, StorageError> {
        self.gate()?;
        self.inner.contacts()
    }

    fn set_ephemeral(
        &self,
        a_chat: &str,
        settings: EphemeralSettings,
    ) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.set_ephemeral(a_chat, settings)
    }

    fn ephemeral(&self, a_chat: &str) -> Result<Option<EphemeralSettings>, StorageError> {
        self.gate()?;
        self.inner.ephemeral(a_chat)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        self.gate()?;
        self.inner.stats()
    }

    fn schema_version(&self) -> Result<u64, StorageError> {
        self.gate()?;
        self.inner.schema_version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn pair(n: i64) -> MessagePair {
        MessagePair {
            a_msg_id: format!("M{n}"),
            a_participant: "alice".into(),
            a_chat: "alice".into(),
            b_chat: -1001,
            b_thread: 2,
            b_msg: n,
            read_marker: None,
        }
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        for i in 0..100 {
            chaotic.record_msg_pair(&pair(i)).expect("should not fail with 0% rate");
        }
        assert_eq!(chaotic.inner().pair_count(), 100);
        assert_eq!(chaotic.operation_count(), 100);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        assert!(chaotic.record_msg_pair(&pair(1)).is_err());
        assert!(chaotic.lookup_b_from_a("M1", "alice").is_err());
        assert_eq!(chaotic.inner().pair_count(), 0);
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let chaotic2 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        for i in 0..100 {
            let result1 = chaotic1.record_msg_pair(&pair(i));
            let result2 = chaotic2.record_msg_pair(&pair(i));
            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn test_chaotic_rejects_invalid_failure_rate() {
        let _chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
