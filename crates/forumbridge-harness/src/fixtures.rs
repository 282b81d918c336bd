//! Event and message builders shared by the tests.

use forumbridge_proto::{
    ContextInfo, FileRef, ForumContent, ForumMessage, ForumUser, Jid, MediaMessage, MediaRef,
    MessageContent, MessageInfo, MessageKey, ProtocolMessage, SourceEvent, SourceMessage,
};

use crate::sim_env::DEFAULT_WALL_CLOCK;

/// Network-B id of the operator.
pub const OWNER_ID: i64 = 4242;

/// Forum chat receiving bridged content.
pub const TARGET_CHAT: i64 = -100_777;

/// The operator's own Network-A account.
pub fn own_jid() -> Jid {
    Jid::user("15550001111")
}

/// A contact.
pub fn alice() -> Jid {
    Jid::user("447700900123")
}

/// Another contact.
pub fn bob() -> Jid {
    Jid::user("447700900456")
}

/// Envelope for a message sent now.
pub fn info(chat: &Jid, sender: &Jid, id: &str) -> MessageInfo {
    MessageInfo {
        id: id.to_string(),
        chat: chat.clone(),
        sender: sender.clone(),
        is_from_me: false,
        push_name: String::new(),
        timestamp: DEFAULT_WALL_CLOCK,
        broadcast_list_owner: None,
    }
}

/// Wrap `content` into a message event.
pub fn message_event(info: MessageInfo, content: MessageContent) -> SourceEvent {
    SourceEvent::Message(Box::new(SourceMessage { info, content }))
}

/// Plain text message.
pub fn text_event(chat: &Jid, sender: &Jid, id: &str, text: &str) -> SourceEvent {
    message_event(
        info(chat, sender, id),
        MessageContent::Text { text: text.to_string(), context: None },
    )
}

/// Text message replying to `stanza_id`.
pub fn reply_event(chat: &Jid, sender: &Jid, id: &str, text: &str, stanza_id: &str) -> SourceEvent {
    let context = ContextInfo {
        stanza_id: Some(stanza_id.to_string()),
        participant: Some(sender.clone()),
        ..ContextInfo::default()
    };
    message_event(
        info(chat, sender, id),
        MessageContent::Text { text: text.to_string(), context: Some(context) },
    )
}

/// Media payload stored at `direct_path`.
pub fn media(direct_path: &str, mime_type: &str, file_length: u64, caption: &str) -> MediaMessage {
    MediaMessage {
        media: MediaRef {
            direct_path: direct_path.to_string(),
            mime_type: mime_type.to_string(),
            file_length,
        },
        caption: caption.to_string(),
        context: None,
        view_once: false,
        seconds: 0,
        file_name: None,
    }
}

/// JPEG image message.
pub fn image_event(chat: &Jid, sender: &Jid, id: &str, direct_path: &str, caption: &str) -> SourceEvent {
    message_event(
        info(chat, sender, id),
        MessageContent::Image(media(direct_path, "image/jpeg", 1024, caption)),
    )
}

fn key(chat: &Jid, sender: &Jid, target_id: &str) -> MessageKey {
    MessageKey {
        chat: chat.clone(),
        id: target_id.to_string(),
        from_me: false,
        participant: chat.is_group().then(|| sender.clone()),
    }
}

/// Edit of `target_id` replacing its text or caption.
pub fn edit_event(chat: &Jid, sender: &Jid, id: &str, target_id: &str, text: &str) -> SourceEvent {
    message_event(
        info(chat, sender, id),
        MessageContent::Protocol(ProtocolMessage::Edit {
            key: key(chat, sender, target_id),
            content: Box::new(MessageContent::Text { text: text.to_string(), context: None }),
        }),
    )
}

/// Revoke of `target_id`.
pub fn revoke_event(chat: &Jid, sender: &Jid, id: &str, target_id: &str) -> SourceEvent {
    message_event(
        info(chat, sender, id),
        MessageContent::Protocol(ProtocolMessage::Revoke { key: key(chat, sender, target_id) }),
    )
}

/// Reaction to `target_id`; empty `emoji` removes it.
pub fn reaction_event(chat: &Jid, sender: &Jid, id: &str, target_id: &str, emoji: &str) -> SourceEvent {
    message_event(
        info(chat, sender, id),
        MessageContent::Reaction { target: key(chat, sender, target_id), text: emoji.to_string() },
    )
}

/// The operator as a Network-B user.
pub fn operator() -> ForumUser {
    ForumUser { id: OWNER_ID, first_name: "Operator".into(), username: None }
}

/// Someone else in the forum.
pub fn stranger() -> ForumUser {
    ForumUser { id: 999, first_name: "Mallory".into(), username: Some("mallory".into()) }
}

/// Operator text posted in a topic of the target chat.
pub fn forum_text(thread_id: i64, message_id: i64, text: &str) -> ForumMessage {
    ForumMessage {
        chat_id: TARGET_CHAT,
        message_id,
        thread_id,
        is_topic_message: thread_id != 0,
        from: Some(operator()),
        date: DEFAULT_WALL_CLOCK,
        reply_to: None,
        content: ForumContent::Text(text.to_string()),
    }
}

/// Operator photo posted in a topic.
pub fn forum_photo(thread_id: i64, message_id: i64, file_id: &str, caption: &str) -> ForumMessage {
    ForumMessage {
        content: ForumContent::Photo {
            file: FileRef {
                file_id: file_id.to_string(),
                file_size: Some(2048),
                mime_type: Some("image/jpeg".into()),
                file_name: None,
            },
            caption: caption.to_string(),
        },
        ..forum_text(thread_id, message_id, "")
    }
}

/// A post the bridge made, as seen inside a reply.
pub fn bridged_post(thread_id: i64, message_id: i64) -> ForumMessage {
    ForumMessage { from: None, ..forum_text(thread_id, message_id, "") }
}

/// `message` as a reply to `to`.
pub fn replying(mut message: ForumMessage, to: ForumMessage) -> ForumMessage {
    message.reply_to = Some(Box::new(to));
    message
}
