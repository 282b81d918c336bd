//! Operator command and button-press tests.

use bytes::Bytes;
use forumbridge_core::ApiError;
use forumbridge_engine::{BridgeError, DropReason, Outcome, Phase, Storage, commands};
use forumbridge_harness::{
    TestBridge,
    fixtures::{
        OWNER_ID, TARGET_CHAT, alice, bob, forum_text, operator, replying, stranger, text_event,
    },
    sim_forum::FIRST_THREAD_ID,
};
use forumbridge_proto::{
    CallbackQuery, DirectoryEntry, ForumMessage, ForumRequest, GENERAL_THREAD, Jid,
};

fn named(full_name: &str) -> DirectoryEntry {
    DirectoryEntry { full_name: full_name.into(), ..DirectoryEntry::default() }
}

fn last_reply(tb: &TestBridge) -> String {
    tb.forum.texts().pop().map(|post| post.text).unwrap_or_default()
}

fn press(data: &str, prompt: Option<ForumMessage>) -> CallbackQuery {
    CallbackQuery {
        id: "cb-1".into(),
        from: operator(),
        data: data.into(),
        message: prompt,
    }
}

#[tokio::test]
async fn help_lists_commands() {
    let tb = TestBridge::new();
    let outcome = tb.command(&forum_text(GENERAL_THREAD, 1, "/help")).await.unwrap();

    assert_eq!(outcome, Outcome::Bridged);
    let help = last_reply(&tb);
    assert!(help.contains("/settargetgroupchat"));
    assert!(help.contains("/revoke"));
}

#[tokio::test]
async fn commands_from_strangers_are_ignored() {
    let tb = TestBridge::new();
    let mut message = forum_text(GENERAL_THREAD, 1, "/clearpairhistory");
    message.from = Some(stranger());

    assert_eq!(tb.command(&message).await.unwrap(), Outcome::Dropped(DropReason::Unauthorized));
    assert!(tb.forum.requests().is_empty());
    assert!(matches!(
        commands::authorize(&tb.bridge, stranger().id),
        Err(BridgeError::Unauthorized)
    ));
    assert!(commands::authorize(&tb.bridge, OWNER_ID).is_ok());
}

#[tokio::test]
async fn group_listing_is_sorted_by_name() {
    let tb = TestBridge::new();
    tb.source.add_group(Jid::group("120363002"), "Zebra club", &[alice()]);
    tb.source.add_group(Jid::group("120363001"), "Book <club>", &[alice(), bob()]);

    tb.command(&forum_text(GENERAL_THREAD, 1, "/getwagroups")).await.unwrap();

    assert_eq!(
        last_reply(&tb),
        "Book &lt;club&gt;: <code>120363001@g.us</code>\nZebra club: <code>120363002@g.us</code>"
    );
}

#[tokio::test]
async fn empty_group_listing_says_so() {
    let tb = TestBridge::new();
    tb.command(&forum_text(GENERAL_THREAD, 1, "/getwagroups")).await.unwrap();
    assert_eq!(last_reply(&tb), "You are not in any groups");
}

#[tokio::test]
async fn find_contact_syncs_and_matches_names_and_numbers() {
    let tb = TestBridge::new();
    tb.source.add_contact(alice(), named("Alice Smith"));
    tb.source.add_contact(bob(), named("Bob Jones"));

    tb.command(&forum_text(GENERAL_THREAD, 1, "/findcontact smith")).await.unwrap();
    let found = last_reply(&tb);
    assert!(found.contains("Alice Smith"));
    assert!(!found.contains("Bob"));
    assert_eq!(tb.store.stats().unwrap().contacts, 2);

    tb.command(&forum_text(GENERAL_THREAD, 2, "/findcontact 900456")).await.unwrap();
    assert!(last_reply(&tb).contains("Bob Jones"));

    tb.command(&forum_text(GENERAL_THREAD, 3, "/findcontact carol")).await.unwrap();
    assert_eq!(last_reply(&tb), "No matching contacts found");
}

#[tokio::test]
async fn sync_contacts_reports_count() {
    let tb = TestBridge::new();
    tb.source.add_contact(alice(), named("Alice"));
    tb.source.add_contact(bob(), named("Bob"));

    tb.command(&forum_text(GENERAL_THREAD, 1, "/synccontacts")).await.unwrap();

    assert_eq!(last_reply(&tb), "Synced 2 contacts");
    assert_eq!(tb.store.contact(&bob().to_string()).unwrap().unwrap().full_name, "Bob");
}

#[tokio::test]
async fn clear_pair_history_empties_pairs_but_keeps_topics() {
    let tb = TestBridge::new();
    tb.inbound(&text_event(&alice(), &alice(), "M1", "one")).await.unwrap();
    tb.inbound(&text_event(&alice(), &alice(), "M2", "two")).await.unwrap();

    tb.command(&forum_text(GENERAL_THREAD, 1, "/clearpairhistory")).await.unwrap();

    assert_eq!(last_reply(&tb), "Deleted 2 message pairs");
    assert_eq!(tb.store.stats().unwrap().message_pairs, 0);
    assert_eq!(tb.thread_of(&alice()), Some(FIRST_THREAD_ID));
}

#[tokio::test]
async fn restart_reconnects_and_reports() {
    let tb = TestBridge::new();
    tb.command(&forum_text(GENERAL_THREAD, 1, "/restartwa")).await.unwrap();

    assert_eq!(last_reply(&tb), "Reconnected to WhatsApp");
    assert!(tb.source.is_connected());
    assert_eq!(tb.source.connection_counts(), (1, 1));
    assert_eq!(tb.bridge.phase(), Phase::Running);
}

#[tokio::test]
async fn failed_restart_leaves_bridge_reconnecting() {
    let tb = TestBridge::new();
    tb.source.fail_next_connect(ApiError::Transport("connection refused".into()));

    let err = tb.command(&forum_text(GENERAL_THREAD, 1, "/restartwa")).await.unwrap_err();

    assert!(matches!(err, BridgeError::Transport(_)));
    assert_eq!(tb.bridge.phase(), Phase::Reconnecting);
    assert!(!tb.source.is_connected());
}

#[tokio::test]
async fn join_invite_link_uses_last_path_segment() {
    let tb = TestBridge::new();
    tb.command(&forum_text(GENERAL_THREAD, 1, "/joininvitelink https://chat.example/AbCdEf/"))
        .await
        .unwrap();

    assert_eq!(tb.source.joined_links(), vec!["AbCdEf".to_string()]);
    assert_eq!(last_reply(&tb), "Joined <code>12036301@g.us</code>");
}

#[tokio::test]
async fn missing_argument_is_a_usage_error() {
    let tb = TestBridge::new();
    let err = tb.command(&forum_text(GENERAL_THREAD, 1, "/joininvitelink")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Routing(usage) if usage.starts_with("Usage: /joininvitelink")));
}

#[tokio::test]
async fn set_target_binds_topic_and_routes_messages() {
    let tb = TestBridge::new();
    let outcome =
        tb.command(&forum_text(77, 1, "/settargetprivatechat +447700900123")).await.unwrap();

    assert_eq!(outcome, Outcome::Bridged);
    assert_eq!(tb.thread_of(&alice()), Some(77));
    assert_eq!(last_reply(&tb), format!("Linked this topic to <code>{}</code>", alice()));

    tb.outbound(&forum_text(77, 2, "hello from the topic")).await.unwrap();
    assert_eq!(tb.source.sent()[0].chat, alice());
    // The bound topic is reused for inbound messages.
    tb.inbound(&text_event(&alice(), &alice(), "M1", "hi")).await.unwrap();
    assert_eq!(tb.forum.count("createForumTopic"), 0);
    assert_eq!(tb.forum.texts_in(77).len(), 2);
}

#[tokio::test]
async fn rebinding_is_rejected() {
    let tb = TestBridge::new();
    let group = Jid::group("120363009");
    tb.command(&forum_text(77, 1, "/settargetgroupchat 120363009")).await.unwrap();

    let same = tb.command(&forum_text(77, 2, "/settargetgroupchat 120363009")).await.unwrap_err();
    assert!(matches!(same, BridgeError::Routing(notice) if notice.contains("already linked to that chat")));

    let elsewhere =
        tb.command(&forum_text(78, 3, "/settargetgroupchat 120363009@g.us")).await.unwrap_err();
    assert!(matches!(elsewhere, BridgeError::Routing(notice) if notice.contains("another topic")));

    let taken = tb.command(&forum_text(77, 4, "/settargetprivatechat 447700900456")).await.unwrap_err();
    assert!(matches!(taken, BridgeError::Routing(notice) if notice.contains(&group.to_string())));

    assert_eq!(tb.store.chat_threads(TARGET_CHAT).unwrap().len(), 1);
}

#[tokio::test]
async fn binding_and_first_message_agree_on_one_topic() {
    let tb = TestBridge::new();
    let first = text_event(&alice(), &alice(), "M1", "hi");
    let bind = forum_text(77, 1, "/settargetprivatechat +447700900123");

    let (delivered, bound) = tokio::join!(tb.inbound(&first), tb.command(&bind));
    delivered.unwrap();

    let threads = tb.store.chat_threads(TARGET_CHAT).unwrap();
    assert_eq!(threads.len(), 1);
    let thread = threads[0].b_thread;
    match bound {
        Ok(_) => {
            assert_eq!(thread, 77);
            assert_eq!(tb.forum.count("createForumTopic"), 0);
        },
        Err(err) => {
            assert!(matches!(err, BridgeError::Routing(notice) if notice.contains("another topic")));
            assert_eq!(thread, FIRST_THREAD_ID);
        },
    }
    let pair = tb.store.lookup_b_from_a("M1", &alice().to_string()).unwrap().unwrap();
    assert_eq!(pair.b_thread, thread);
}

#[tokio::test]
async fn binding_needs_a_topic_and_the_right_kind() {
    let tb = TestBridge::new();

    let general =
        tb.command(&forum_text(GENERAL_THREAD, 1, "/settargetgroupchat 120363009")).await;
    assert!(matches!(general, Err(BridgeError::Routing(_))));

    let not_group = tb.command(&forum_text(77, 2, "/settargetgroupchat 447700900123@s.whatsapp.net")).await;
    assert!(matches!(not_group, Err(BridgeError::Routing(notice)) if notice.contains("is not a group")));

    let not_number = tb.command(&forum_text(77, 3, "/settargetprivatechat alice")).await;
    assert!(matches!(not_number, Err(BridgeError::Routing(notice)) if notice.contains("Invalid phone number")));

    assert!(tb.store.chat_threads(TARGET_CHAT).unwrap().is_empty());
}

#[tokio::test]
async fn send_forwards_replied_message() {
    let tb = TestBridge::new();
    let original = forum_text(GENERAL_THREAD, 10, "meeting at noon");
    let command = replying(forum_text(GENERAL_THREAD, 11, "/send 447700900456"), original);

    tb.command(&command).await.unwrap();

    let sent = tb.source.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat, bob());
    assert!(sent[0].message.quote.is_none());
    assert_eq!(last_reply(&tb), "Successfully sent");
    // Forwarded copies are not tracked.
    assert_eq!(tb.store.stats().unwrap().message_pairs, 0);
}

#[tokio::test]
async fn send_without_reply_is_rejected() {
    let tb = TestBridge::new();
    let err = tb.command(&forum_text(GENERAL_THREAD, 11, "/send 447700900456")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Routing(notice) if notice.starts_with("Reply to")));
    assert!(tb.source.sent().is_empty());
}

/// Operator message bridged to Alice, returning its topic.
async fn operator_sent(tb: &TestBridge, b_msg: i64) -> i64 {
    tb.command(&forum_text(77, 1, "/settargetprivatechat 447700900123")).await.unwrap();
    tb.outbound(&forum_text(77, b_msg, "oops")).await.unwrap();
    77
}

fn prompt_from(tb: &TestBridge) -> ForumMessage {
    let post = tb.forum.texts().pop().unwrap();
    ForumMessage { from: None, ..forum_text(post.thread_id, post.message_id, &post.text) }
}

#[tokio::test]
async fn revoke_asks_then_deletes_on_confirmation() {
    let tb = TestBridge::new();
    let thread = operator_sent(&tb, 500).await;

    let ask = replying(forum_text(thread, 501, "/revoke"), forum_text(thread, 500, "oops"));
    tb.command(&ask).await.unwrap();

    let prompt = prompt_from(&tb);
    assert_eq!(prompt.text(), Some("Revoke this message for everyone?"));
    let buttons = tb
        .forum
        .requests()
        .into_iter()
        .rev()
        .find_map(|request| match request {
            ForumRequest::SendMessage { options, .. } => Some(options.buttons),
            _ => None,
        })
        .unwrap();
    let data: Vec<&str> = buttons.iter().map(|button| button.data.as_str()).collect();
    assert_eq!(data, vec!["revoke:500", "revoke:cancel"]);

    let outcome = commands::handle_callback(&tb.bridge, &press("revoke:500", Some(prompt.clone())))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Bridged);
    let sent_id = tb.source.sent()[0].id.clone();
    assert_eq!(tb.source.revoked(), vec![(alice(), sent_id)]);
    assert!(tb.store.lookup_a_from_b(TARGET_CHAT, 500, thread).unwrap().is_none());
    assert_eq!(tb.forum.count("deleteMessage"), 1);
    assert_eq!(tb.forum.count("answerCallbackQuery"), 1);
}

#[tokio::test]
async fn revoke_cancel_only_removes_prompt() {
    let tb = TestBridge::new();
    let thread = operator_sent(&tb, 500).await;
    tb.command(&replying(forum_text(thread, 501, "/revoke"), forum_text(thread, 500, "oops")))
        .await
        .unwrap();
    let prompt = prompt_from(&tb);

    let outcome =
        commands::handle_callback(&tb.bridge, &press("revoke:cancel", Some(prompt))).await.unwrap();

    assert_eq!(outcome, Outcome::Updated);
    assert!(tb.source.revoked().is_empty());
    assert!(tb.store.lookup_a_from_b(TARGET_CHAT, 500, thread).unwrap().is_some());
    assert_eq!(tb.forum.count("deleteMessage"), 1);
}

#[tokio::test]
async fn only_own_messages_can_be_revoked() {
    let tb = TestBridge::new();
    tb.inbound(&text_event(&alice(), &alice(), "M1", "hi")).await.unwrap();
    let thread = tb.thread_of(&alice()).unwrap();
    let m1 = tb.b_msg_of(&alice(), "M1").unwrap();

    let ask = replying(forum_text(thread, 900, "/revoke"), forum_text(thread, m1, "hi"));
    let err = tb.command(&ask).await.unwrap_err();

    assert!(matches!(err, BridgeError::Routing(notice) if notice.contains("only revoke messages you sent")));
    assert_eq!(tb.forum.texts_in(thread).len(), 1);
}

#[tokio::test]
async fn stranger_button_press_is_refused() {
    let tb = TestBridge::new();
    let thread = operator_sent(&tb, 500).await;
    let mut query = press("revoke:500", Some(forum_text(thread, 502, "prompt")));
    query.from = stranger();

    let outcome = commands::handle_callback(&tb.bridge, &query).await.unwrap();

    assert_eq!(outcome, Outcome::Dropped(DropReason::Unauthorized));
    assert!(tb.source.revoked().is_empty());
    assert!(tb.store.lookup_a_from_b(TARGET_CHAT, 500, thread).unwrap().is_some());
    assert!(matches!(
        tb.forum.requests().last(),
        Some(ForumRequest::AnswerCallbackQuery { show_alert: true, .. })
    ));
}

#[tokio::test]
async fn unknown_button_data_is_dropped() {
    let tb = TestBridge::new();
    let outcome = commands::handle_callback(&tb.bridge, &press("vote:1", None)).await.unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::Unsupported));
}

#[tokio::test]
async fn sync_topic_names_renames_conversation_topics() {
    let tb = TestBridge::new();
    tb.inbound(&text_event(&alice(), &alice(), "M1", "hi")).await.unwrap();
    assert_eq!(tb.forum.topics()[0].1, "447700900123");

    tb.source.add_contact(alice(), named("Alice"));
    tb.command(&forum_text(GENERAL_THREAD, 1, "/synctopicnames")).await.unwrap();

    assert_eq!(last_reply(&tb), "Renamed 1 topics");
    assert!(tb.forum.requests().iter().any(|request| matches!(
        request,
        ForumRequest::EditForumTopic { name, .. } if name == "Alice [ 447700900123 ]"
    )));
}

#[tokio::test]
async fn profile_picture_is_posted_in_bound_topic() {
    let tb = TestBridge::new();
    tb.inbound(&text_event(&alice(), &alice(), "M1", "hi")).await.unwrap();
    let thread = tb.thread_of(&alice()).unwrap();

    tb.command(&forum_text(thread, 1, "/getprofilepicture")).await.unwrap();
    assert_eq!(last_reply(&tb), "No profile picture found");

    tb.source.add_picture(alice(), Bytes::from_static(b"jpeg"));
    tb.command(&forum_text(thread, 2, "/getprofilepicture")).await.unwrap();
    assert_eq!(tb.forum.count("sendPhoto"), 1);

    let unbound = tb.command(&forum_text(GENERAL_THREAD, 3, "/getprofilepicture")).await;
    assert!(matches!(unbound, Err(BridgeError::Routing(_))));
}
