//! Engine lifecycle tests.
//!
//! The engine runs on its own task and is fed through the same channels the
//! production clients use. Handlers run on conversation workers, so every
//! test waits for their effects before shutting down.

use std::time::Duration;

use forumbridge_engine::{BridgeError, Phase, Storage};
use forumbridge_harness::{
    TestBridge, TestEngine, wait_until,
    fixtures::{TARGET_CHAT, alice, bob, forum_text, operator, own_jid, stranger, text_event},
    sim_source::SimSource,
};
use forumbridge_proto::{
    CallbackQuery, ForumUpdate, GENERAL_THREAD, Jid, LoggedOut, PairingEvent, SourceEvent,
};

const WAIT: Duration = Duration::from_secs(5);

fn engine() -> TestEngine {
    TestBridge::builder().build_engine()
}

#[tokio::test]
async fn bridges_both_directions_through_the_loop() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let bridge = engine.bridge();
    let handle = tokio::spawn(engine.run());

    te.push_source(text_event(&alice(), &alice(), "M1", "hi")).await;
    let store = te.store.clone();
    assert!(
        wait_until(WAIT, || {
            store.lookup_b_from_a("M1", &alice().to_string()).ok().flatten().is_some()
        })
        .await
    );
    assert_eq!(bridge.phase(), Phase::Running);

    let thread = store.chat_thread_by_a(&alice().to_string(), TARGET_CHAT).unwrap().unwrap().b_thread;
    te.push_forum(ForumUpdate::Message(forum_text(thread, 600, "hello back"))).await;
    let source = te.source.clone();
    assert!(wait_until(WAIT, || !source.sent().is_empty()).await);
    assert_eq!(te.source.sent()[0].chat, alice());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(bridge.phase(), Phase::Shutdown);
}

#[tokio::test]
async fn conversations_keep_their_order() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let handle = tokio::spawn(engine.run());

    for n in 0..5 {
        te.push_source(text_event(&alice(), &alice(), &format!("A{n}"), &format!("alice {n}"))).await;
        te.push_source(text_event(&bob(), &bob(), &format!("B{n}"), &format!("bob {n}"))).await;
    }
    let store = te.store.clone();
    assert!(wait_until(WAIT, || store.pair_count() == 10).await);

    assert_eq!(te.forum.count("createForumTopic"), 2);
    for (chat, prefix) in [(alice(), "alice"), (bob(), "bob")] {
        let thread = store.chat_thread_by_a(&chat.to_string(), TARGET_CHAT).unwrap().unwrap().b_thread;
        let bodies: Vec<String> = te
            .forum
            .texts_in(thread)
            .into_iter()
            .map(|post| post.text.rsplit('\n').next().unwrap_or_default().to_string())
            .collect();
        let expected: Vec<String> = (0..5).map(|n| format!("{prefix} {n}")).collect();
        assert_eq!(bodies, expected);
    }

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn stalled_conversation_does_not_hold_up_others() {
    let mut te =
        TestBridge::builder().config(|config| config.engine.queue_capacity = 1).build_engine();
    te.forum.stall_next("createForumTopic");
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let handle = tokio::spawn(engine.run());

    // Alice's first message hangs in topic creation; two more queue behind it.
    for n in 0..3 {
        te.push_source(text_event(&alice(), &alice(), &format!("A{n}"), "stuck")).await;
    }
    let forum = te.forum.clone();
    assert!(wait_until(WAIT, || forum.attempts().contains(&"createForumTopic")).await);

    te.push_source(text_event(&bob(), &bob(), "B0", "still flowing")).await;
    te.push_forum(ForumUpdate::Message(forum_text(GENERAL_THREAD, 3, "/help"))).await;

    let store = te.store.clone();
    assert!(
        wait_until(WAIT, || {
            store.lookup_b_from_a("B0", &bob().to_string()).ok().flatten().is_some()
        })
        .await
    );
    assert!(wait_until(WAIT, || forum.texts().iter().any(|post| post.reply_to == Some(3))).await);
    assert!(store.chat_thread_by_a(&alice().to_string(), TARGET_CHAT).unwrap().is_none());

    // Shutdown still gets through with Alice's handler hung.
    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(store.pair_count(), 1);
}

#[tokio::test]
async fn first_messages_on_two_queues_share_one_topic() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let handle = tokio::spawn(engine.run());

    // A broadcast-list post files under the sender's conversation but runs on
    // the list's own queue, in parallel with Alice's direct message.
    let list = Jid::parse("1700000000@broadcast").unwrap();
    te.push_source(text_event(&list, &alice(), "L1", "to my list")).await;
    te.push_source(text_event(&alice(), &alice(), "M1", "hi")).await;

    let store = te.store.clone();
    assert!(wait_until(WAIT, || store.pair_count() == 2).await);

    assert_eq!(te.forum.count("createForumTopic"), 1);
    assert_eq!(store.chat_threads(TARGET_CHAT).unwrap().len(), 1);
    let thread = store.chat_thread_by_a(&alice().to_string(), TARGET_CHAT).unwrap().unwrap().b_thread;
    let via_list = store.lookup_b_from_a("L1", &list.to_string()).unwrap().unwrap();
    let direct = store.lookup_b_from_a("M1", &alice().to_string()).unwrap().unwrap();
    assert_eq!((via_list.b_thread, direct.b_thread), (thread, thread));

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn strangers_and_general_thread_are_ignored() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let handle = tokio::spawn(engine.run());

    let mut from_stranger = forum_text(GENERAL_THREAD, 1, "/help");
    from_stranger.from = Some(stranger());
    te.push_forum(ForumUpdate::Message(from_stranger)).await;
    te.push_forum(ForumUpdate::Message(forum_text(GENERAL_THREAD, 2, "just chatting"))).await;
    // A command from the operator acts as a barrier on the command queue.
    te.push_forum(ForumUpdate::Message(forum_text(GENERAL_THREAD, 3, "/help"))).await;

    let forum = te.forum.clone();
    assert!(wait_until(WAIT, || forum.count("sendMessage") > 0).await);
    let replies = te.forum.texts();
    assert!(replies.iter().all(|reply| reply.reply_to == Some(3)));
    assert!(replies[0].text.starts_with("<b>Commands</b>"));
    assert!(te.source.sent().is_empty());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn operator_errors_are_answered_in_the_topic() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let handle = tokio::spawn(engine.run());

    te.push_forum(ForumUpdate::Message(forum_text(55, 9, "anyone?"))).await;

    let forum = te.forum.clone();
    assert!(wait_until(WAIT, || forum.count("sendMessage") == 1).await);
    let notice = te.forum.texts().pop().unwrap();
    assert_eq!(notice.thread_id, 55);
    assert_eq!(notice.reply_to, Some(9));
    assert!(notice.text.starts_with("This topic is not linked"));

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn button_presses_are_routed_to_callbacks() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let handle = tokio::spawn(engine.run());

    te.push_forum(ForumUpdate::CallbackQuery(CallbackQuery {
        id: "cb-9".into(),
        from: operator(),
        data: "revoke:cancel".into(),
        message: Some(forum_text(GENERAL_THREAD, 77, "Revoke this message?")),
    }))
    .await;

    let forum = te.forum.clone();
    assert!(wait_until(WAIT, || forum.count("deleteMessage") == 1).await);
    assert!(te.source.revoked().is_empty());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn pairing_shows_codes_then_connects() {
    let source = SimSource::unpaired(vec![
        PairingEvent::Code("ABCD-1234".into()),
        PairingEvent::Success { id: own_jid() },
    ]);
    let mut te = TestBridge::builder().source(source).build_engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let bridge = engine.bridge();
    let handle = tokio::spawn(engine.run());

    assert!(wait_until(WAIT, || bridge.phase() == Phase::Running).await);
    assert_eq!(te.pairing.codes(), vec!["ABCD-1234".to_string()]);
    assert!(te.source.is_connected());
    assert_eq!(bridge.own_id(), Some(own_jid()));

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert!(!te.source.is_connected());
    assert_eq!(te.source.connection_counts(), (1, 1));
}

#[tokio::test]
async fn pairing_timeout_is_fatal() {
    let source =
        SimSource::unpaired(vec![PairingEvent::Code("ABCD-1234".into()), PairingEvent::Timeout]);
    let mut te = TestBridge::builder().source(source).build_engine();
    let engine = te.take_engine().unwrap();
    let bridge = engine.bridge();

    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, BridgeError::Fatal(reason) if reason.contains("timed out")));
    assert_eq!(bridge.phase(), Phase::Shutdown);
    assert_eq!(te.source.connection_counts(), (0, 0));
}

#[tokio::test]
async fn logout_keeps_serving_commands() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let shutdown = engine.shutdown_token();
    let bridge = engine.bridge();
    let handle = tokio::spawn(engine.run());

    te.push_source(SourceEvent::LoggedOut(LoggedOut { on_connect: false, reason: "401".into() }))
        .await;
    assert!(wait_until(WAIT, || bridge.phase() == Phase::Reconnecting).await);

    let forum = te.forum.clone();
    assert!(wait_until(WAIT, || forum.count("sendMessage") == 1).await);
    let report = te.forum.texts().pop().unwrap();
    assert_eq!(report.thread_id, GENERAL_THREAD);
    assert!(report.text.contains("logged out"));

    te.push_forum(ForumUpdate::Message(forum_text(GENERAL_THREAD, 5, "/restartwa"))).await;
    assert!(wait_until(WAIT, || bridge.phase() == Phase::Running).await);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_streams_stop_the_engine() {
    let mut te = engine();
    let engine = te.take_engine().unwrap();
    let bridge = engine.bridge();
    let handle = tokio::spawn(engine.run());

    te.push_source(text_event(&alice(), &alice(), "M1", "last words")).await;
    let store = te.store.clone();
    assert!(wait_until(WAIT, || store.pair_count() == 1).await);

    let TestEngine { source_tx, forum_tx, source, .. } = te;
    drop(source_tx);
    drop(forum_tx);

    handle.await.unwrap().unwrap();
    assert_eq!(bridge.phase(), Phase::Shutdown);
    assert_eq!(source.connection_counts(), (1, 1));
}
