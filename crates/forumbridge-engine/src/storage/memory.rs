#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{
    ChatThreadPair, ContactName, EphemeralSettings, MessagePair, SCHEMA_VERSION, Storage,
    StorageError, StoreStats,
};

/// In-memory storage implementation for tests and the `memory` backend.
///
/// Message pairs are held in a primary map keyed by `(a_chat, a_msg_id)` and
/// a secondary index keyed by `(b_chat, b_msg, b_thread)`; bindings likewise
/// have one map per direction. All state is wrapped in Arc<Mutex<>> so
/// clones share it. Uses `lock().expect()` which panics if the mutex is
/// poisoned.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// (`a_chat`, `a_msg_id`) -> pair
    pairs: HashMap<(String, String), MessagePair>,

    /// (`b_chat`, `b_msg`, `b_thread`) -> (`a_chat`, `a_msg_id`)
    pairs_by_b: BTreeMap<(i64, i64, i64), (String, String)>,

    /// (`b_chat`, `a_chat`) -> binding
    threads: BTreeMap<(i64, String), ChatThreadPair>,

    /// (`b_chat`, `b_thread`) -> `a_chat`
    threads_by_b: HashMap<(i64, i64), String>,

    contacts: BTreeMap<String, ContactName>,

    ephemeral: HashMap<String, EphemeralSettings>,
}

impl MemoryStorageInner {
    fn remove_pair(&mut self, a_key: &(String, String)) -> Option<MessagePair> {
        let pair = self.pairs.remove(a_key)?;
        self.pairs_by_b.remove(&(pair.b_chat, pair.b_msg, pair.b_thread));
        Some(pair)
    }
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner::default())) }
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MemoryStorageInner> {
        self.inner.lock().expect("Mutex poisoned")
    }

    /// Number of message pairs.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn pair_count(&self) -> usize {
        self.lock().pairs.len()
    }

    /// Number of conversation bindings across all chats.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn thread_count(&self) -> usize {
        self.lock().threads.len()
    }

    /// Every message pair, ordered by Network-A key.
    pub fn message_pairs(&self) -> Vec<MessagePair> {
        let inner = self.lock();
        let mut pairs: Vec<_> = inner.pairs.values().cloned().collect();
        pairs.sort_by(|a, b| (&a.a_chat, &a.a_msg_id).cmp(&(&b.a_chat, &b.a_msg_id)));
        pairs
    }

    /// Every conversation binding across all chats.
    pub fn all_chat_threads(&self) -> Vec<ChatThreadPair> {
        self.lock().threads.values().cloned().collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn record_msg_pair(&self, pair: &MessagePair) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let a_key = (pair.a_chat.clone(), pair.a_msg_id.clone());
        let b_key = (pair.b_chat, pair.b_msg, pair.b_thread);

        inner.remove_pair(&a_key);
        if let Some(previous) = inner.pairs_by_b.get(&b_key).cloned() {
            inner.remove_pair(&previous);
        }

        inner.pairs_by_b.insert(b_key, a_key.clone());
        inner.pairs.insert(a_key, pair.clone());

        debug_assert_eq!(inner.pairs.len(), inner.pairs_by_b.len());
        Ok(())
    }

    fn lookup_b_from_a(
        &self,
        a_msg_id: &str,
        a_chat: &str,
    ) -> Result<Option<MessagePair>, StorageError> {
        let inner = self.lock();
        Ok(inner.pairs.get(&(a_chat.to_string(), a_msg_id.to_string())).cloned())
    }

    fn lookup_a_from_b(
        &self,
        b_chat: i64,
        b_msg: i64,
        b_thread: i64,
    ) -> Result<Option<MessagePair>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .pairs_by_b
            .get(&(b_chat, b_msg, b_thread))
            .and_then(|a_key| inner.pairs.get(a_key))
            .cloned())
    }

    fn delete_msg_pair_by_b(&self, b_chat: i64, b_msg: i64) -> Result<usize, StorageError> {
        let mut inner = self.lock();
        let matching: Vec<(String, String)> = inner
            .pairs_by_b
            .range((b_chat, b_msg, i64::MIN)..=(b_chat, b_msg, i64::MAX))
            .map(|(_, a_key)| a_key.clone())
            .collect();
        for a_key in &matching {
            inner.remove_pair(a_key);
        }
        Ok(matching.len())
    }

    fn delete_all_msg_pairs(&self) -> Result<usize, StorageError> {
        let mut inner = self.lock();
        let removed = inner.pairs.len();
        inner.pairs.clear();
        inner.pairs_by_b.clear();
        Ok(removed)
    }

    fn unread_msg_pairs(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Vec<MessagePair>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .pairs
            .values()
            .filter(|pair| {
                pair.a_chat == a_chat && pair.b_chat == b_chat && pair.read_marker != Some(true)
            })
            .cloned()
            .collect())
    }

    fn mark_read(&self, a_chat: &str, a_msg_ids: &[String]) -> Result<usize, StorageError> {
        let mut inner = self.lock();
        let mut updated = 0;
        for a_msg_id in a_msg_ids {
            if let Some(pair) = inner.pairs.get_mut(&(a_chat.to_string(), a_msg_id.clone())) {
                pair.read_marker = Some(true);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn record_chat_thread(&self, pair: &ChatThreadPair) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let key = (pair.b_chat, pair.a_chat.clone());

        if let Some(previous) = inner.threads.remove(&key) {
            inner.threads_by_b.remove(&(previous.b_chat, previous.b_thread));
        }
        if let Some(other) = inner.threads_by_b.remove(&(pair.b_chat, pair.b_thread)) {
            inner.threads.remove(&(pair.b_chat, other));
        }

        inner.threads_by_b.insert((pair.b_chat, pair.b_thread), pair.a_chat.clone());
        inner.threads.insert(key, pair.clone());
        Ok(())
    }

    fn chat_thread_by_a(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError> {
        let inner = self.lock();
        Ok(inner.threads.get(&(b_chat, a_chat.to_string())).cloned())
    }

    fn chat_thread_by_b(
        &self,
        b_chat: i64,
        b_thread: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .threads_by_b
            .get(&(b_chat, b_thread))
            .and_then(|a_chat| inner.threads.get(&(b_chat, a_chat.clone())))
            .cloned())
    }

    fn chat_threads(&self, b_chat: i64) -> Result<Vec<ChatThreadPair>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .threads
            .range((b_chat, String::new())..)
            .take_while(|((chat, _), _)| *chat == b_chat)
            .map(|(_, pair)| pair.clone())
            .collect())
    }

    fn delete_chat_thread(&self, a_chat: &str, b_chat: i64) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        match inner.threads.remove(&(b_chat, a_chat.to_string())) {
            Some(pair) => {
                inner.threads_by_b.remove(&(pair.b_chat, pair.b_thread));
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn upsert_contact(&self, a_user: &str, names: &ContactName) -> Result<(), StorageError> {
        self.lock().contacts.insert(a_user.to_string(), names.clone());
        Ok(())
    }

    fn bulk_upsert_contacts(
        &self,
        contacts: &[(String, ContactName)],
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        for (a_user, names) in contacts {
            inner.contacts.insert(a_user.clone(), names.clone());
        }
        Ok(())
    }

    fn contact(&self, a_user: &str) -> Result<Option<ContactName>, StorageError> {
        Ok(self.lock().contacts.get(a_user).cloned())
    }

    fn contacts(&self) -> Result<Vec<(String, ContactName)>, StorageError> {
        Ok(self.lock().contacts.iter().map(|(user, names)| (user.clone(), names.clone())).collect())
    }

    fn set_ephemeral(
        &self,
        a_chat: &str,
        settings: EphemeralSettings,
    ) -> Result<(), StorageError> {
        self.lock().ephemeral.insert(a_chat.to_string(), settings);
        Ok(())
    }

    fn ephemeral(&self, a_chat: &str) -> Result<Option<EphemeralSettings>, StorageError> {
        Ok(self.lock().ephemeral.get(a_chat).copied())
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let inner = self.lock();
        Ok(StoreStats {
            message_pairs: inner.pairs.len(),
            chat_threads: inner.threads.len(),
            contacts: inner.contacts.len(),
            ephemeral_chats: inner.ephemeral.len(),
        })
    }

    fn schema_version(&self) -> Result<u64, StorageError> {
        Ok(SCHEMA_VERSION)
    }
}
