//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Each
//! trait call is one transaction, so a pair and its secondary index entry are
//! always written together.

use std::{fmt::Display, path::Path, sync::Arc};

use redb::{
    Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use serde::{Serialize, de::DeserializeOwned};

use super::{
    ChatThreadPair, ContactName, EphemeralSettings, MessagePair, SCHEMA_VERSION, Storage,
    StorageError, StoreStats,
};

/// Table: `msg_pairs`
/// Key: `[len(a_chat): u32 BE][a_chat][a_msg_id]`
/// Value: CBOR-encoded `MessagePair`
const MSG_PAIRS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("msg_pairs");

/// Table: `msg_pairs_by_b`
/// Key: `(b_chat, b_msg, b_thread)` as order-preserving bytes [24 bytes]
/// Value: `msg_pairs` key
const MSG_PAIRS_BY_B: TableDefinition<&[u8], &[u8]> = TableDefinition::new("msg_pairs_by_b");

/// Table: `chat_threads`
/// Key: `[b_chat: 8 bytes][a_chat]`
/// Value: CBOR-encoded `ChatThreadPair`
const CHAT_THREADS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("chat_threads");

/// Table: `chat_threads_by_b`
/// Key: `(b_chat, b_thread)` [16 bytes]
/// Value: `a_chat` bytes
const CHAT_THREADS_BY_B: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("chat_threads_by_b");

/// Table: contacts
/// Key: bare user id
/// Value: CBOR-encoded `ContactName`
const CONTACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("contacts");

/// Table: ephemeral
/// Key: `a_chat`
/// Value: CBOR-encoded `EphemeralSettings`
const EPHEMERAL: TableDefinition<&str, &[u8]> = TableDefinition::new("ephemeral");

/// Table: meta
/// Key: setting name
/// Value: integer setting
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_KEY: &str = "schema_version";

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path and run pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created,
    /// and `StorageError::SchemaVersion` if it was written by a newer build.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let mut meta = txn.open_table(META).map_err(io)?;
            let found = meta.get(SCHEMA_KEY).map_err(io)?.map_or(0, |v| v.value());
            if found > SCHEMA_VERSION {
                return Err(StorageError::SchemaVersion { found, supported: SCHEMA_VERSION });
            }
            for version in found + 1..=SCHEMA_VERSION {
                migrate(&txn, version)?;
            }
            meta.insert(SCHEMA_KEY, SCHEMA_VERSION).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

/// Bring the schema from `version - 1` to `version`.
fn migrate(txn: &WriteTransaction, version: u64) -> Result<(), StorageError> {
    match version {
        1 => {
            let _ = txn.open_table(MSG_PAIRS).map_err(io)?;
            let _ = txn.open_table(MSG_PAIRS_BY_B).map_err(io)?;
            let _ = txn.open_table(CHAT_THREADS).map_err(io)?;
            let _ = txn.open_table(CHAT_THREADS_BY_B).map_err(io)?;
            let _ = txn.open_table(CONTACTS).map_err(io)?;
            let _ = txn.open_table(EPHEMERAL).map_err(io)?;
            Ok(())
        },
        _ => Ok(()),
    }
}

impl Storage for RedbStorage {
    fn record_msg_pair(&self, pair: &MessagePair) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut pairs = txn.open_table(MSG_PAIRS).map_err(io)?;
            let mut by_b = txn.open_table(MSG_PAIRS_BY_B).map_err(io)?;

            let a_key = encode_pair_key(&pair.a_chat, &pair.a_msg_id);
            let b_key = encode_b_key(pair.b_chat, pair.b_msg, pair.b_thread);

            let previous: Option<MessagePair> = match pairs.get(a_key.as_slice()).map_err(io)? {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };
            if let Some(previous) = previous {
                let old_b = encode_b_key(previous.b_chat, previous.b_msg, previous.b_thread);
                by_b.remove(old_b.as_slice()).map_err(io)?;
            }

            let occupant = by_b.get(b_key.as_slice()).map_err(io)?.map(|v| v.value().to_vec());
            if let Some(occupant) = occupant
                && occupant != a_key
            {
                pairs.remove(occupant.as_slice()).map_err(io)?;
            }

            let bytes = encode(pair)?;
            pairs.insert(a_key.as_slice(), bytes.as_slice()).map_err(io)?;
            by_b.insert(b_key.as_slice(), a_key.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn lookup_b_from_a(
        &self,
        a_msg_id: &str,
        a_chat: &str,
    ) -> Result<Option<MessagePair>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let pairs = txn.open_table(MSG_PAIRS).map_err(io)?;

        let key = encode_pair_key(a_chat, a_msg_id);
        match pairs.get(key.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn lookup_a_from_b(
        &self,
        b_chat: i64,
        b_msg: i64,
        b_thread: i64,
    ) -> Result<Option<MessagePair>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let pairs = txn.open_table(MSG_PAIRS).map_err(io)?;
        let by_b = txn.open_table(MSG_PAIRS_BY_B).map_err(io)?;

        let b_key = encode_b_key(b_chat, b_msg, b_thread);
        let Some(a_key) = by_b.get(b_key.as_slice()).map_err(io)? else {
            return Ok(None);
        };
        match pairs.get(a_key.value()).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn delete_msg_pair_by_b(&self, b_chat: i64, b_msg: i64) -> Result<usize, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let removed;
        {
            let mut pairs = txn.open_table(MSG_PAIRS).map_err(io)?;
            let mut by_b = txn.open_table(MSG_PAIRS_BY_B).map_err(io)?;

            let start = encode_b_key(b_chat, b_msg, i64::MIN);
            let end = encode_b_key(b_chat, b_msg, i64::MAX);
            let mut matching = Vec::new();
            for entry in by_b.range(start.as_slice()..=end.as_slice()).map_err(io)? {
                let (b_key, a_key) = entry.map_err(io)?;
                matching.push((b_key.value().to_vec(), a_key.value().to_vec()));
            }

            for (b_key, a_key) in &matching {
                by_b.remove(b_key.as_slice()).map_err(io)?;
                pairs.remove(a_key.as_slice()).map_err(io)?;
            }
            removed = matching.len();
        }
        txn.commit().map_err(io)?;

        Ok(removed)
    }

    fn delete_all_msg_pairs(&self) -> Result<usize, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let pairs = txn.open_table(MSG_PAIRS).map_err(io)?;
            pairs.len().map_err(io)? as usize
        };
        txn.delete_table(MSG_PAIRS).map_err(io)?;
        txn.delete_table(MSG_PAIRS_BY_B).map_err(io)?;
        let _ = txn.open_table(MSG_PAIRS).map_err(io)?;
        let _ = txn.open_table(MSG_PAIRS_BY_B).map_err(io)?;
        txn.commit().map_err(io)?;

        Ok(removed)
    }

    fn unread_msg_pairs(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Vec<MessagePair>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let pairs = txn.open_table(MSG_PAIRS).map_err(io)?;

        let prefix = encode_pair_key(a_chat, "");
        let mut unread = Vec::new();
        for entry in pairs.range(prefix.as_slice()..).map_err(io)? {
            let (key, value) = entry.map_err(io)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let pair: MessagePair = decode(value.value())?;
            if pair.b_chat == b_chat && pair.read_marker != Some(true) {
                unread.push(pair);
            }
        }

        Ok(unread)
    }

    fn mark_read(&self, a_chat: &str, a_msg_ids: &[String]) -> Result<usize, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let mut updated = 0;
        {
            let mut pairs = txn.open_table(MSG_PAIRS).map_err(io)?;
            for a_msg_id in a_msg_ids {
                let key = encode_pair_key(a_chat, a_msg_id);
                let existing: Option<MessagePair> = match pairs.get(key.as_slice()).map_err(io)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
                if let Some(mut pair) = existing {
                    pair.read_marker = Some(true);
                    let bytes = encode(&pair)?;
                    pairs.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;
                    updated += 1;
                }
            }
        }
        txn.commit().map_err(io)?;

        Ok(updated)
    }

    fn record_chat_thread(&self, pair: &ChatThreadPair) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut threads = txn.open_table(CHAT_THREADS).map_err(io)?;
            let mut by_b = txn.open_table(CHAT_THREADS_BY_B).map_err(io)?;

            let a_key = encode_thread_key(pair.b_chat, &pair.a_chat);
            let b_key = encode_topic_key(pair.b_chat, pair.b_thread);

            let previous: Option<ChatThreadPair> =
                match threads.get(a_key.as_slice()).map_err(io)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
            if let Some(previous) = previous {
                let old_b = encode_topic_key(previous.b_chat, previous.b_thread);
                by_b.remove(old_b.as_slice()).map_err(io)?;
            }

            let occupant = by_b.get(b_key.as_slice()).map_err(io)?.map(|v| v.value().to_vec());
            if let Some(occupant) = occupant {
                let occupant = String::from_utf8_lossy(&occupant).into_owned();
                if occupant != pair.a_chat {
                    let other = encode_thread_key(pair.b_chat, &occupant);
                    threads.remove(other.as_slice()).map_err(io)?;
                }
            }

            let bytes = encode(pair)?;
            threads.insert(a_key.as_slice(), bytes.as_slice()).map_err(io)?;
            by_b.insert(b_key.as_slice(), pair.a_chat.as_bytes()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn chat_thread_by_a(
        &self,
        a_chat: &str,
        b_chat: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let threads = txn.open_table(CHAT_THREADS).map_err(io)?;

        let key = encode_thread_key(b_chat, a_chat);
        match threads.get(key.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn chat_thread_by_b(
        &self,
        b_chat: i64,
        b_thread: i64,
    ) -> Result<Option<ChatThreadPair>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let threads = txn.open_table(CHAT_THREADS).map_err(io)?;
        let by_b = txn.open_table(CHAT_THREADS_BY_B).map_err(io)?;

        let b_key = encode_topic_key(b_chat, b_thread);
        let Some(a_chat) = by_b.get(b_key.as_slice()).map_err(io)? else {
            return Ok(None);
        };
        let a_chat = String::from_utf8_lossy(a_chat.value()).into_owned();
        let key = encode_thread_key(b_chat, &a_chat);
        match threads.get(key.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn chat_threads(&self, b_chat: i64) -> Result<Vec<ChatThreadPair>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let threads = txn.open_table(CHAT_THREADS).map_err(io)?;

        let prefix = encode_i64(b_chat);
        let mut bindings = Vec::new();
        for entry in threads.range(prefix.as_slice()..).map_err(io)? {
            let (key, value) = entry.map_err(io)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            bindings.push(decode(value.value())?);
        }

        Ok(bindings)
    }

    fn delete_chat_thread(&self, a_chat: &str, b_chat: i64) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let existed;
        {
            let mut threads = txn.open_table(CHAT_THREADS).map_err(io)?;
            let mut by_b = txn.open_table(CHAT_THREADS_BY_B).map_err(io)?;

            let key = encode_thread_key(b_chat, a_chat);
            let removed: Option<ChatThreadPair> =
                match threads.remove(key.as_slice()).map_err(io)? {
                    Some(value) => Some(decode(value.value())?),
                    None => None,
                };
            existed = removed.is_some();
            if let Some(pair) = removed {
                let b_key = encode_topic_key(pair.b_chat, pair.b_thread);
                by_b.remove(b_key.as_slice()).map_err(io)?;
            }
        }
        txn.commit().map_err(io)?;

        Ok(existed)
    }

    fn upsert_contact(&self, a_user: &str, names: &ContactName) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut contacts = txn.open_table(CONTACTS).map_err(io)?;
            let bytes = encode(names)?;
            contacts.insert(a_user, bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn bulk_upsert_contacts(
        &self,
        contacts: &[(String, ContactName)],
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(CONTACTS).map_err(io)?;
            for (a_user, names) in contacts {
                let bytes = encode(names)?;
                table.insert(a_user.as_str(), bytes.as_slice()).map_err(io)?;
            }
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn contact(&self, a_user: &str) -> Result<Option<ContactName>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let contacts = txn.open_table(CONTACTS).map_err(io)?;

        match contacts.get(a_user).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn contacts(&self) -> Result<Vec<(String, ContactName)>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let contacts = txn.open_table(CONTACTS).map_err(io)?;

        let mut all = Vec::new();
        for entry in contacts.iter().map_err(io)? {
            let (user, value) = entry.map_err(io)?;
            all.push((user.value().to_string(), decode(value.value())?));
        }

        Ok(all)
    }

    fn set_ephemeral(
        &self,
        a_chat: &str,
        settings: EphemeralSettings,
    ) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(EPHEMERAL).map_err(io)?;
            let bytes = encode(&settings)?;
            table.insert(a_chat, bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn ephemeral(&self, a_chat: &str) -> Result<Option<EphemeralSettings>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(EPHEMERAL).map_err(io)?;

        match table.get(a_chat).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;

        Ok(StoreStats {
            message_pairs: txn.open_table(MSG_PAIRS).map_err(io)?.len().map_err(io)? as usize,
            chat_threads: txn.open_table(CHAT_THREADS).map_err(io)?.len().map_err(io)? as usize,
            contacts: txn.open_table(CONTACTS).map_err(io)?.len().map_err(io)? as usize,
            ephemeral_chats: txn.open_table(EPHEMERAL).map_err(io)?.len().map_err(io)? as usize,
        })
    }

    fn schema_version(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let meta = txn.open_table(META).map_err(io)?;

        Ok(meta.get(SCHEMA_KEY).map_err(io)?.map_or(0, |v| v.value()))
    }
}

fn io(err: impl Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encode an i64 so lexicographic byte order matches numeric order.
fn encode_i64(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

/// Encode `(a_chat, a_msg_id)`.
///
/// Layout: `[len(a_chat): u32 BE][a_chat][a_msg_id]`, so every pair of one
/// conversation shares a prefix.
fn encode_pair_key(a_chat: &str, a_msg_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + a_chat.len() + a_msg_id.len());
    key.extend_from_slice(&(a_chat.len() as u32).to_be_bytes());
    key.extend_from_slice(a_chat.as_bytes());
    key.extend_from_slice(a_msg_id.as_bytes());
    key
}

/// Encode `(b_chat, b_msg, b_thread)` as 24 bytes.
fn encode_b_key(b_chat: i64, b_msg: i64, b_thread: i64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&encode_i64(b_chat));
    key[8..16].copy_from_slice(&encode_i64(b_msg));
    key[16..].copy_from_slice(&encode_i64(b_thread));
    key
}

/// Encode `(b_chat, a_chat)`.
fn encode_thread_key(b_chat: i64, a_chat: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + a_chat.len());
    key.extend_from_slice(&encode_i64(b_chat));
    key.extend_from_slice(a_chat.as_bytes());
    key
}

/// Encode `(b_chat, b_thread)` as 16 bytes.
fn encode_topic_key(b_chat: i64, b_thread: i64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&encode_i64(b_chat));
    key[8..].copy_from_slice(&encode_i64(b_thread));
    key
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn pair(a_chat: &str, a_msg_id: &str, b_msg: i64) -> MessagePair {
        MessagePair {
            a_msg_id: a_msg_id.into(),
            a_participant: a_chat.into(),
            a_chat: a_chat.into(),
            b_chat: -1001,
            b_thread: 3,
            b_msg,
            read_marker: None,
        }
    }

    #[test]
    fn test_i64_encoding_preserves_order() {
        let values = [i64::MIN, -1_001_234, -1, 0, 1, i64::MAX];
        for window in values.windows(2) {
            assert!(encode_i64(window[0]) < encode_i64(window[1]));
        }
    }

    #[test]
    fn test_open_sets_schema_version() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("bridge.redb")).unwrap();
        assert_eq!(storage.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(storage.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_pair_round_trip_and_upsert() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("bridge.redb")).unwrap();

        storage.record_msg_pair(&pair("alice", "M1", 10)).unwrap();
        storage.record_msg_pair(&pair("alice", "M1", 12)).unwrap();

        assert_eq!(storage.lookup_a_from_b(-1001, 10, 3).unwrap(), None);
        let found = storage.lookup_a_from_b(-1001, 12, 3).unwrap().unwrap();
        assert_eq!(found.a_msg_id, "M1");
        assert_eq!(storage.stats().unwrap().message_pairs, 1);
    }

    #[test]
    fn test_chat_prefix_does_not_leak() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("bridge.redb")).unwrap();

        // "ab" + "c" and "a" + "bc" must not collide
        storage.record_msg_pair(&pair("ab", "c", 1)).unwrap();
        storage.record_msg_pair(&pair("a", "bc", 2)).unwrap();

        assert_eq!(storage.unread_msg_pairs("a", -1001).unwrap().len(), 1);
        assert_eq!(storage.unread_msg_pairs("ab", -1001).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_all_keeps_tables_usable() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("bridge.redb")).unwrap();

        storage.record_msg_pair(&pair("alice", "M1", 10)).unwrap();
        storage.record_msg_pair(&pair("alice", "M2", 11)).unwrap();
        assert_eq!(storage.delete_all_msg_pairs().unwrap(), 2);

        storage.record_msg_pair(&pair("alice", "M3", 12)).unwrap();
        assert_eq!(storage.stats().unwrap().message_pairs, 1);
    }
}
