//! Message bridging pipeline.
//!
//! Order: ignore list, disappearing-setting frames, own messages, edits,
//! revokes and reactions, de-duplication, status filter, per-kind skips,
//! topic, reply anchor, header, payload, pair record, mention digest.
//! Nothing is written to the store before every filter has passed.

use std::fmt::Write;

use forumbridge_core::{
    Environment,
    format::{Header, TEXT_LIMIT, escape_html, link_mentions, message_link},
};
use forumbridge_proto::{
    ContextInfo, Jid, MessageContent, MessageInfo, MessageKey, ProtocolMessage, SourceMessage,
};

use super::media::{self, Post};
use crate::{
    context::Bridge,
    error::BridgeError,
    outcome::{DropReason, Outcome},
    storage::{EphemeralSettings, MessagePair, Storage},
    topics::{MENTIONS_KEY, STATUS_KEY},
};

pub(super) async fn bridge_message<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &SourceMessage,
) -> Result<Outcome, BridgeError> {
    let info = &message.info;
    let chat = info.chat.to_non_device();
    let sender = info.sender.to_non_device();
    let chat_key = chat.to_string();
    let whatsapp = &bridge.config.whatsapp;

    if whatsapp.ignores_chat(&chat) {
        return Ok(dropped(info, DropReason::IgnoredChat));
    }

    if let MessageContent::Protocol(ProtocolMessage::EphemeralSetting { expiration_secs }) =
        &message.content
    {
        refresh_ephemeral(bridge, &chat_key, *expiration_secs)?;
        return Ok(Outcome::Updated);
    }

    if info.is_from_me && !whatsapp.send_my_messages_from_other_devices {
        return Ok(dropped(info, DropReason::OwnMessage));
    }

    match &message.content {
        MessageContent::Protocol(ProtocolMessage::Edit { key, content }) => {
            return bridge_edit(bridge, info, key, content).await;
        },
        MessageContent::Protocol(ProtocolMessage::Revoke { key }) => {
            return bridge_revoke(bridge, info, key).await;
        },
        MessageContent::Reaction { target, text } => {
            return bridge_reaction(bridge, info, target, text).await;
        },
        _ => {},
    }

    let target_chat = bridge.target_chat();
    if bridge
        .store
        .lookup_b_from_a(&info.id, &chat_key)?
        .is_some_and(|pair| pair.b_chat == target_chat)
    {
        return Ok(dropped(info, DropReason::Duplicate));
    }

    if chat.is_status_broadcast()
        && (whatsapp.ignores_status_from(&sender) || whatsapp.ignores_chat(&sender))
    {
        return Ok(dropped(info, DropReason::StatusSkipped));
    }

    let content = &message.content;
    let skipped = content.media_kind().filter(|kind| whatsapp.skips(*kind));

    if let Some(expiration) = content.context().and_then(|context| context.expiration) {
        refresh_ephemeral(bridge, &chat_key, expiration)?;
    }

    let b_thread = thread_for(bridge, info, &chat).await?;
    let reply_to = reply_anchor(bridge, content.context(), &chat_key)?;
    let header = header_for(bridge, info, &chat, content.context(), false).await?;
    let post = Post { b_thread, reply_to, header: &header };

    let b_msg = match skipped {
        Some(kind) => {
            let notice = format!("<i>Skipping {} as per config</i>", kind.label());
            media::send_text(bridge, &post, &header.with_body(&notice, TEXT_LIMIT)).await?
        },
        None => media::dispatch(bridge, &post, content).await?,
    };

    if b_msg != 0 {
        bridge.store.record_msg_pair(&MessagePair {
            a_msg_id: info.id.clone(),
            a_participant: sender.to_string(),
            a_chat: chat_key.clone(),
            b_chat: target_chat,
            b_thread,
            b_msg,
            read_marker: None,
        })?;
    }

    tracing::debug!(a_chat = %chat_key, a_msg_id = %info.id, b_thread, b_msg, "message bridged");

    if b_msg != 0
        && chat.is_group()
        && mentions_operator(bridge, content.context())
        && let Err(err) = post_mention_digest(bridge, &header, b_msg).await
    {
        tracing::warn!(a_chat = %chat_key, error = %err, "failed to post mention digest");
    }

    Ok(Outcome::Bridged)
}

fn dropped(info: &MessageInfo, reason: DropReason) -> Outcome {
    tracing::info!(a_chat = %info.chat, a_msg_id = %info.id, %reason, "message dropped");
    Outcome::Dropped(reason)
}

fn refresh_ephemeral<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    chat_key: &str,
    expiration_secs: u32,
) -> Result<(), BridgeError> {
    let settings =
        EphemeralSettings { is_ephemeral: expiration_secs > 0, timer_secs: expiration_secs };
    if bridge.store.ephemeral(chat_key)? != Some(settings) {
        bridge.store.set_ephemeral(chat_key, settings)?;
        tracing::debug!(a_chat = chat_key, expiration_secs, "disappearing messages updated");
    }
    Ok(())
}

/// Topic for a new message.
async fn thread_for<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    info: &MessageInfo,
    chat: &Jid,
) -> Result<i64, BridgeError> {
    if chat.is_status_broadcast() {
        return bridge.ensure_thread(STATUS_KEY, "Status").await;
    }
    if chat.is_broadcast() && !info.is_from_me {
        // Broadcast lists are private to their owner; file under the sender
        return bridge.ensure_conversation_thread(&info.sender).await;
    }
    bridge.ensure_conversation_thread(chat).await
}

fn reply_anchor<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    context: Option<&ContextInfo>,
    chat_key: &str,
) -> Result<Option<i64>, BridgeError> {
    let Some(stanza_id) = context.and_then(|context| context.stanza_id.as_deref()) else {
        return Ok(None);
    };
    Ok(bridge
        .store
        .lookup_b_from_a(stanza_id, chat_key)?
        .filter(|pair| pair.b_chat == bridge.target_chat())
        .map(|pair| pair.b_msg))
}

/// Header for a message event.
pub(super) async fn header_for<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    info: &MessageInfo,
    chat: &Jid,
    context: Option<&ContextInfo>,
    edited: bool,
) -> Result<Header, BridgeError> {
    let sender = if info.is_from_me {
        "You".to_string()
    } else {
        bridge.display_name(&info.sender, &info.push_name).await?
    };
    let chat_label = if bridge.config.whatsapp.skip_chat_details {
        None
    } else {
        Some(chat_label(bridge, chat).await?)
    };
    Ok(Header {
        sender,
        chat_label,
        edited,
        forwarded: context.is_some_and(|context| context.is_forwarded),
        timestamp: bridge.stale_timestamp(info.timestamp),
    })
}

pub(super) async fn chat_label<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    chat: &Jid,
) -> Result<String, BridgeError> {
    Ok(if chat.is_status_broadcast() {
        "(Status)".to_string()
    } else if chat.is_broadcast() {
        "(Broadcast)".to_string()
    } else if chat.is_group() {
        let name = bridge.resolve_group(chat).await?;
        if name.is_empty() { chat.user_part().to_string() } else { name }
    } else {
        "(PVT)".to_string()
    })
}

/// Escape `text` and link the users it mentions.
pub(super) async fn render_text<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    text: &str,
    context: Option<&ContextInfo>,
) -> Result<String, BridgeError> {
    let escaped = escape_html(text);
    let Some(context) = context.filter(|context| !context.mentioned.is_empty()) else {
        return Ok(escaped);
    };

    let mut mentions = Vec::with_capacity(context.mentioned.len());
    for user in &context.mentioned {
        let name = bridge.display_name(user, "").await?;
        mentions.push((user.user_part().to_string(), name));
    }
    Ok(link_mentions(&escaped, &mentions))
}

fn mentions_operator<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    context: Option<&ContextInfo>,
) -> bool {
    context.is_some_and(|context| context.mentioned.iter().any(|user| bridge.is_own(user)))
}

async fn post_mention_digest<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    header: &Header,
    b_msg: i64,
) -> Result<(), BridgeError> {
    let b_thread = bridge.ensure_thread(MENTIONS_KEY, "Mentions").await?;
    let link = message_link(bridge.target_chat(), b_msg);
    let text = header.with_body(&format!("<a href=\"{link}\">You were mentioned</a>"), TEXT_LIMIT);
    bridge.forum.send_text(bridge.target_chat(), b_thread, text, None).await?;
    Ok(())
}

async fn bridge_edit<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    info: &MessageInfo,
    key: &MessageKey,
    content: &MessageContent,
) -> Result<Outcome, BridgeError> {
    let chat = info.chat.to_non_device();
    let Some(original) = bridge
        .store
        .lookup_b_from_a(&key.id, &chat.to_string())?
        .filter(|pair| pair.b_chat == bridge.target_chat())
    else {
        return Ok(dropped(info, DropReason::UnknownOriginal));
    };

    let header = header_for(bridge, info, &chat, content.context(), true).await?;
    let body = match content {
        MessageContent::Text { text, context } => render_text(bridge, text, context.as_ref()).await?,
        MessageContent::Image(media)
        | MessageContent::Video { media, .. }
        | MessageContent::Document(media) => {
            render_text(bridge, &media.caption, media.context.as_ref()).await?
        },
        _ => "<i>Edited a message</i>".to_string(),
    };

    bridge
        .forum
        .send_text(
            original.b_chat,
            original.b_thread,
            header.with_body(&body, TEXT_LIMIT),
            Some(original.b_msg),
        )
        .await?;
    Ok(Outcome::Bridged)
}

async fn bridge_revoke<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    info: &MessageInfo,
    key: &MessageKey,
) -> Result<Outcome, BridgeError> {
    if !bridge.config.whatsapp.send_revoked_message_updates {
        return Ok(dropped(info, DropReason::Disabled));
    }

    let chat = info.chat.to_non_device();
    let Some(original) = bridge
        .store
        .lookup_b_from_a(&key.id, &chat.to_string())?
        .filter(|pair| pair.b_chat == bridge.target_chat())
    else {
        return Ok(dropped(info, DropReason::UnknownOriginal));
    };

    let header = header_for(bridge, info, &chat, None, false).await?;
    let text = header.with_body("<i>This message was deleted</i>", TEXT_LIMIT);
    bridge
        .forum
        .send_text(original.b_chat, original.b_thread, text, Some(original.b_msg))
        .await?;
    Ok(Outcome::Bridged)
}

async fn bridge_reaction<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    info: &MessageInfo,
    target: &MessageKey,
    emoji: &str,
) -> Result<Outcome, BridgeError> {
    if !bridge.config.telegram.reactions {
        return Ok(dropped(info, DropReason::Disabled));
    }

    let chat = info.chat.to_non_device();
    let Some(original) = bridge
        .store
        .lookup_b_from_a(&target.id, &chat.to_string())?
        .filter(|pair| pair.b_chat == bridge.target_chat())
    else {
        return Ok(dropped(info, DropReason::UnknownOriginal));
    };

    let sender = if info.is_from_me {
        "You".to_string()
    } else {
        bridge.display_name(&info.sender, &info.push_name).await?
    };
    let mut body = String::new();
    if emoji.is_empty() {
        body.push_str("<i>Revoked their reaction</i>");
    } else {
        let _ = write!(body, "<i>Reacted with</i> {}", escape_html(emoji));
    }

    let text = bridge.sender_header(sender, info.timestamp).with_body(&body, TEXT_LIMIT);
    bridge
        .forum
        .send_text(original.b_chat, original.b_thread, text, Some(original.b_msg))
        .await?;
    Ok(Outcome::Bridged)
}
