//! Property tests for the Identity Store.
//!
//! `MemoryStorage` is the reference model; `RedbStorage` must answer every
//! lookup the same way after any sequence of operations, and both must keep
//! the pair and binding indexes consistent.

use forumbridge_engine::{ChatThreadPair, MemoryStorage, MessagePair, RedbStorage, Storage};
use forumbridge_harness::{InvariantRegistry, StoreSnapshot};
use proptest::prelude::*;
use tempfile::tempdir;

const B_CHAT: i64 = -100_1;

#[derive(Debug, Clone)]
enum Op {
    Record { a_msg: u8, a_chat: u8, b_thread: u8, b_msg: u8 },
    DeleteByB { b_msg: u8 },
    MarkRead { a_chat: u8, a_msg: u8 },
    Bind { a_chat: u8, b_thread: u8 },
    Unbind { a_chat: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..12, 0u8..3, 0u8..3, 0u8..16).prop_map(|(a_msg, a_chat, b_thread, b_msg)| {
            Op::Record { a_msg, a_chat, b_thread, b_msg }
        }),
        1 => (0u8..16).prop_map(|b_msg| Op::DeleteByB { b_msg }),
        1 => (0u8..3, 0u8..12).prop_map(|(a_chat, a_msg)| Op::MarkRead { a_chat, a_msg }),
        2 => (0u8..4, 0u8..4).prop_map(|(a_chat, b_thread)| Op::Bind { a_chat, b_thread }),
        1 => (0u8..4).prop_map(|a_chat| Op::Unbind { a_chat }),
    ]
}

fn chat(n: u8) -> String {
    format!("4477009{n:05}@s.whatsapp.net")
}

fn apply(store: &impl Storage, op: &Op) {
    match *op {
        Op::Record { a_msg, a_chat, b_thread, b_msg } => store
            .record_msg_pair(&MessagePair {
                a_msg_id: format!("M{a_msg}"),
                a_participant: chat(a_chat),
                a_chat: chat(a_chat),
                b_chat: B_CHAT,
                b_thread: i64::from(b_thread) + 10,
                b_msg: i64::from(b_msg) + 1000,
                read_marker: None,
            })
            .unwrap(),
        Op::DeleteByB { b_msg } => {
            store.delete_msg_pair_by_b(B_CHAT, i64::from(b_msg) + 1000).unwrap();
        },
        Op::MarkRead { a_chat, a_msg } => {
            store.mark_read(&chat(a_chat), &[format!("M{a_msg}")]).unwrap();
        },
        Op::Bind { a_chat, b_thread } => store
            .record_chat_thread(&ChatThreadPair {
                a_chat: chat(a_chat),
                b_chat: B_CHAT,
                b_thread: i64::from(b_thread) + 10,
            })
            .unwrap(),
        Op::Unbind { a_chat } => {
            store.delete_chat_thread(&chat(a_chat), B_CHAT).unwrap();
        },
    }
}

fn sorted_threads(store: &impl Storage) -> Vec<ChatThreadPair> {
    let mut threads = store.chat_threads(B_CHAT).unwrap();
    threads.sort_by(|a, b| a.a_chat.cmp(&b.a_chat));
    threads
}

#[test]
fn prop_memory_store_keeps_indexes_consistent() {
    proptest!(|(ops in proptest::collection::vec(op_strategy(), 1..80))| {
        let store = MemoryStorage::new();
        for op in &ops {
            apply(&store, op);
        }

        let snapshot = StoreSnapshot::from_memory(&store).unwrap();
        let result = InvariantRegistry::standard().check_all(&snapshot);
        prop_assert!(result.is_ok(), "violations after {ops:?}: {result:?}");
        prop_assert_eq!(store.stats().unwrap().message_pairs, snapshot.pairs.len());
    });
}

#[test]
fn prop_redb_matches_memory_model() {
    proptest!(ProptestConfig::with_cases(32), |(ops in proptest::collection::vec(op_strategy(), 1..60))| {
        let dir = tempdir().unwrap();
        let redb = RedbStorage::open(dir.path().join("model.redb")).unwrap();
        let model = MemoryStorage::new();

        for op in &ops {
            apply(&model, op);
            apply(&redb, op);
        }

        prop_assert_eq!(redb.stats().unwrap(), model.stats().unwrap());
        prop_assert_eq!(sorted_threads(&redb), sorted_threads(&model));

        for pair in model.message_pairs() {
            prop_assert_eq!(
                redb.lookup_b_from_a(&pair.a_msg_id, &pair.a_chat).unwrap(),
                Some(pair.clone())
            );
            prop_assert_eq!(
                redb.lookup_a_from_b(pair.b_chat, pair.b_msg, pair.b_thread).unwrap(),
                Some(pair.clone())
            );
        }
        for a_chat in 0..3 {
            let mut expected = model.unread_msg_pairs(&chat(a_chat), B_CHAT).unwrap();
            let mut actual = redb.unread_msg_pairs(&chat(a_chat), B_CHAT).unwrap();
            expected.sort_by(|a, b| a.a_msg_id.cmp(&b.a_msg_id));
            actual.sort_by(|a, b| a.a_msg_id.cmp(&b.a_msg_id));
            prop_assert_eq!(actual, expected);
        }

        let snapshot =
            StoreSnapshot::capture(&redb, model.message_pairs(), model.all_chat_threads()).unwrap();
        prop_assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
    });
}

#[test]
fn prop_recording_twice_is_idempotent() {
    proptest!(|(a_msg in 0u8..50, b_msg in 0u8..50, read in proptest::option::of(any::<bool>()))| {
        let store = MemoryStorage::new();
        let pair = MessagePair {
            a_msg_id: format!("M{a_msg}"),
            a_participant: chat(0),
            a_chat: chat(0),
            b_chat: B_CHAT,
            b_thread: 10,
            b_msg: i64::from(b_msg),
            read_marker: read,
        };

        store.record_msg_pair(&pair).unwrap();
        store.record_msg_pair(&pair).unwrap();

        prop_assert_eq!(store.stats().unwrap().message_pairs, 1);
        prop_assert_eq!(store.lookup_b_from_a(&pair.a_msg_id, &pair.a_chat).unwrap(), Some(pair));
    });
}
