//! Identity Store.
//!
//! Persistent mapping tables shared by both translators: message pairs,
//! conversation ↔ topic bindings, the contact-name cache and per-chat
//! disappearing-message settings. The trait is synchronous; callers treat
//! each call as a suspension point but no call awaits.
//!
//! Every write is keyed so a duplicate insert becomes an idempotent update.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// Current schema version written to new databases.
pub const SCHEMA_VERSION: u64 = 1;

/// One cross-network message identity.
///
/// Unique by `(a_msg_id, a_chat)` and by `(b_chat, b_thread, b_msg)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePair {
    /// Network-A message id.
    pub a_msg_id: String,
    /// Network-A sender (device-less JID).
    pub a_participant: String,
    /// Network-A conversation (device-less JID).
    pub a_chat: String,
    /// Network-B chat.
    pub b_chat: i64,
    /// Network-B forum topic.
    pub b_thread: i64,
    /// Network-B message id.
    pub b_msg: i64,
    /// Whether the operator has read the Network-A message.
    pub read_marker: Option<bool>,
}

/// Binding between a Network-A conversation and a forum topic.
///
/// Within one `b_chat`, `a_chat ↔ b_thread` is a bijection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThreadPair {
    /// Network-A conversation (device-less JID, or a reserved key).
    pub a_chat: String,
    /// Network-B chat.
    pub b_chat: i64,
    /// Forum topic.
    pub b_thread: i64,
}

/// Cached directory names for one Network-A user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactName {
    /// Address-book first name.
    pub first_name: String,
    /// Address-book full name.
    pub full_name: String,
    /// Self-chosen name.
    pub push_name: String,
    /// Verified business name.
    pub business_name: String,
}

/// Disappearing-message policy mirrored from Network A.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralSettings {
    /// Disappearing messages are on.
    pub is_ephemeral: bool,
    /// Timer in seconds.
    pub timer_secs: u32,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Message pairs.
    pub message_pairs: usize,
    /// Conversation bindings.
    pub chat_threads: usize,
    /// Cached contacts.
    pub contacts: usize,
    /// Chats with ephemeral settings.
    pub ephemeral_chats: usize,
}

/// Storage abstraction for the Identity Store.
///
/// Must be Clone (shared by every handler task), Send + Sync, and
/// synchronous. Implementations share internal state via Arc, so clones
/// access the same underlying storage.
///
/// # Invariants
///
/// - Reads that find no row return `Ok(None)` (or an empty collection),
///   never a stale or unrelated row
/// - Upserts never fail because a row already exists
pub trait Storage: Clone + Send + Sync + 'static {
    /// Insert or update a message pair keyed by `(a_msg_id, a_chat)`.
    ///
    /// A second call with the same key replaces every other column. If a
    /// different pair already occupies the same Network-B identity it is
    /// removed, keeping the Network-B key unique.
    fn record_msg_pair(&self, pair: &MessagePair) -> Result<(), StorageError>;

    /// Pair for a Network-A message.
    fn lookup_b_from_a(
        &self,
        a_msg_id: &str,
        a_chat: &str,
    ) -> Result<Option<MessagePair>, StorageError>;

    /// Pair for a Network-B message.
    fn lookup_a_from_b(
        &self,
        b_chat: i64,
        b_msg: i64,
        b_thread: i64,
    ) -> Result<Option<MessagePair>, StorageError>;

    /// Delete the pair(s) for a Network-B message in any thread.
    ///
    /// Returns the number of rows removed.
    fn delete_msg_pair_by_b(&self, b_chat: i64, b_msg: i64) -> Result<usize, StorageError>;

    /// Delete every message pair. Returns the number of rows removed.
    fn delete_all_msg_pairs(&self) -> Result<usize, StorageError>;

    /// Pairs in `a_chat` (bridged into `b_chat`) not yet marked read.
    fn unread_msg_pairs(&self, a_chat: &str, b_chat: i64)
    -> Result<Vec<MessagePair>, StorageError>;

    /// Set `read_marker = true` on the listed messages of `a_chat`.
    ///
    /// Unknown ids are ignored. Returns the number of rows updated.
    fn mark_read(&self, a_chat: &str, a_msg_ids: &[String]) -> Result<usize, StorageError>;

    /// Insert or update a binding keyed by `(a_chat, b_chat)`.
    fn record_chat_thread(&self, pair: &ChatThreadPair) -> Result<(), StorageError>;

    /// Binding for a Network-A conversation in `b_chat`.
    fn chat_thread_by_a(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError>;

    /// Binding for a forum topic.
    fn chat_thread_by_b(
        &self,
        b_chat: i64,
        b_thread: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError>;

    /// Every binding in `b_chat`.
    fn chat_threads(&self, b_chat: i64) -> Result<Vec<ChatThreadPair>, StorageError>;

    /// Remove the binding for `(a_chat, b_chat)`. Returns whether one existed.
    fn delete_chat_thread(&self, a_chat: &str, b_chat: i64) -> Result<bool, StorageError>;

    /// Insert or update the cached names for one user.
    fn upsert_contact(&self, a_user: &str, names: &ContactName) -> Result<(), StorageError>;

    /// Insert or update many contacts in a single transaction.
    ///
    /// Each row is written at most once.
    fn bulk_upsert_contacts(&self, contacts: &[(String, ContactName)])
    -> Result<(), StorageError>;

    /// Cached names for one user.
    fn contact(&self, a_user: &str) -> Result<Option<ContactName>, StorageError>;

    /// Every cached contact.
    fn contacts(&self) -> Result<Vec<(String, ContactName)>, StorageError>;

    /// Replace the disappearing-message settings for a conversation.
    fn set_ephemeral(&self, a_chat: &str, settings: EphemeralSettings)
    -> Result<(), StorageError>;

    /// Disappearing-message settings for a conversation.
    fn ephemeral(&self, a_chat: &str) -> Result<Option<EphemeralSettings>, StorageError>;

    /// Row counts.
    fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Schema version of the open store.
    fn schema_version(&self) -> Result<u64, StorageError>;
}
