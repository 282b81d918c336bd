//! Observable store state for invariant checking.

use forumbridge_engine::{ChatThreadPair, MemoryStorage, MessagePair, Storage, StorageError};

/// Rows of a store plus what its lookups return for each row.
///
/// Lookups are recorded at capture time so checks stay pure.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Every message pair.
    pub pairs: Vec<MessagePair>,
    /// For each pair: `(lookup_b_from_a, lookup_a_from_b)`.
    pub pair_lookups: Vec<(Option<MessagePair>, Option<MessagePair>)>,
    /// Every conversation binding.
    pub threads: Vec<ChatThreadPair>,
    /// For each binding: `(chat_thread_by_a, chat_thread_by_b)`.
    pub thread_lookups: Vec<(Option<ChatThreadPair>, Option<ChatThreadPair>)>,
}

impl StoreSnapshot {
    /// Capture `pairs` and `threads` and replay the lookups on `store`.
    pub fn capture<S: Storage>(
        store: &S,
        pairs: Vec<MessagePair>,
        threads: Vec<ChatThreadPair>,
    ) -> Result<Self, StorageError> {
        let pair_lookups = pairs
            .iter()
            .map(|pair| {
                Ok((
                    store.lookup_b_from_a(&pair.a_msg_id, &pair.a_chat)?,
                    store.lookup_a_from_b(pair.b_chat, pair.b_msg, pair.b_thread)?,
                ))
            })
            .collect::<Result<_, StorageError>>()?;
        let thread_lookups = threads
            .iter()
            .map(|binding| {
                Ok((
                    store.chat_thread_by_a(&binding.a_chat, binding.b_chat)?,
                    store.chat_thread_by_b(binding.b_chat, binding.b_thread)?,
                ))
            })
            .collect::<Result<_, StorageError>>()?;

        Ok(Self { pairs, pair_lookups, threads, thread_lookups })
    }

    /// Snapshot of an in-memory store.
    pub fn from_memory(store: &MemoryStorage) -> Result<Self, StorageError> {
        Self::capture(store, store.message_pairs(), store.all_chat_threads())
    }
}
