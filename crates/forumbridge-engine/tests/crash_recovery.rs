//! Restart tests for the persistent Identity Store.
//!
//! Everything the bridge records must survive closing and reopening the
//! database, so a restarted bridge keeps its topics and recognises
//! redelivered messages.

use forumbridge_engine::{
    ChatThreadPair, ContactName, DropReason, EphemeralSettings, MessagePair, Outcome, RedbStorage,
    Storage, storage::SCHEMA_VERSION,
};
use forumbridge_harness::{
    TestBridge,
    fixtures::{TARGET_CHAT, alice, forum_text, text_event},
};
use tempfile::tempdir;

fn pair(a_msg_id: &str, b_msg: i64) -> MessagePair {
    MessagePair {
        a_msg_id: a_msg_id.to_string(),
        a_participant: alice().to_string(),
        a_chat: alice().to_string(),
        b_chat: TARGET_CHAT,
        b_thread: 10,
        b_msg,
        read_marker: None,
    }
}

#[test]
fn identity_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.redb");
    let alice_names = ContactName {
        first_name: "Alice".into(),
        full_name: "Alice Liddell".into(),
        push_name: "ali".into(),
        business_name: String::new(),
    };

    {
        let store = RedbStorage::open(&path).unwrap();
        store.record_msg_pair(&pair("M1", 1000)).unwrap();
        store.record_msg_pair(&pair("M2", 1001)).unwrap();
        store.mark_read(&alice().to_string(), &["M1".to_string()]).unwrap();
        store
            .record_chat_thread(&ChatThreadPair {
                a_chat: alice().to_string(),
                b_chat: TARGET_CHAT,
                b_thread: 10,
            })
            .unwrap();
        store.upsert_contact("447700900123", &alice_names).unwrap();
        store
            .set_ephemeral(&alice().to_string(), EphemeralSettings {
                is_ephemeral: true,
                timer_secs: 86_400,
            })
            .unwrap();
    }

    let store = RedbStorage::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);

    let stats = store.stats().unwrap();
    assert_eq!(stats.message_pairs, 2);
    assert_eq!(stats.chat_threads, 1);
    assert_eq!(stats.contacts, 1);
    assert_eq!(stats.ephemeral_chats, 1);

    // Both indexes were persisted, not just the primary rows.
    let m1 = store.lookup_a_from_b(TARGET_CHAT, 1000, 10).unwrap().unwrap();
    assert_eq!(m1.a_msg_id, "M1");
    assert_eq!(m1.read_marker, Some(true));
    let unread = store.unread_msg_pairs(&alice().to_string(), TARGET_CHAT).unwrap();
    assert_eq!(unread, vec![pair("M2", 1001)]);

    let binding = store.chat_thread_by_b(TARGET_CHAT, 10).unwrap().unwrap();
    assert_eq!(binding.a_chat, alice().to_string());
    assert_eq!(store.contact("447700900123").unwrap(), Some(alice_names));
    assert_eq!(
        store.ephemeral(&alice().to_string()).unwrap(),
        Some(EphemeralSettings { is_ephemeral: true, timer_secs: 86_400 })
    );
}

#[test]
fn deletes_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.redb");

    {
        let store = RedbStorage::open(&path).unwrap();
        store.record_msg_pair(&pair("M1", 1000)).unwrap();
        store.record_msg_pair(&pair("M2", 1001)).unwrap();
        assert_eq!(store.delete_msg_pair_by_b(TARGET_CHAT, 1000).unwrap(), 1);
    }
    {
        let store = RedbStorage::open(&path).unwrap();
        assert!(store.lookup_b_from_a("M1", &alice().to_string()).unwrap().is_none());
        assert!(store.lookup_a_from_b(TARGET_CHAT, 1000, 10).unwrap().is_none());
        assert_eq!(store.delete_all_msg_pairs().unwrap(), 1);
    }

    let store = RedbStorage::open(&path).unwrap();
    assert_eq!(store.stats().unwrap().message_pairs, 0);
}

#[tokio::test]
async fn restarted_bridge_reuses_topic_and_skips_redelivery() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.redb");
    let thread;

    {
        let tb = TestBridge::builder().store(RedbStorage::open(&path).unwrap()).build();
        tb.inbound(&text_event(&alice(), &alice(), "M1", "before restart")).await.unwrap();
        thread = tb.thread_of(&alice()).unwrap();
    }

    let tb = TestBridge::builder().store(RedbStorage::open(&path).unwrap()).build();

    let redelivered = tb.inbound(&text_event(&alice(), &alice(), "M1", "before restart")).await;
    assert_eq!(redelivered.unwrap(), Outcome::Dropped(DropReason::Duplicate));

    tb.inbound(&text_event(&alice(), &alice(), "M2", "after restart")).await.unwrap();
    assert_eq!(tb.forum.count("createForumTopic"), 0);
    assert_eq!(tb.thread_of(&alice()), Some(thread));
    assert_eq!(tb.forum.texts_in(thread).len(), 1);

    // Operator replies still route through the persisted binding.
    tb.outbound(&forum_text(thread, 4000, "welcome back")).await.unwrap();
    assert_eq!(tb.source.sent()[0].chat, alice());
}
