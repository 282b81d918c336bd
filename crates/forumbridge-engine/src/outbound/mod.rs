//! B→A Translator.
//!
//! Operator posts in the target chat are sent into the Network-A
//! conversation their topic (or the post they reply to) is bound to. A
//! reply consisting of a single emoji becomes a reaction instead.

pub(crate) mod content;
pub(crate) mod route;

use std::collections::BTreeMap;

use forumbridge_core::{
    ConfirmationType, Environment,
    emoji::is_single_emoji,
    format::escape_html,
};
use forumbridge_proto::{ForumMessage, Jid, MessageKey, OutgoingMessage, QuotedMessage};

use crate::{
    context::Bridge,
    error::BridgeError,
    outcome::{DropReason, Outcome},
    storage::{MessagePair, Storage},
};

/// Bridge one operator message from the target chat.
pub async fn handle_operator_message<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<Outcome, BridgeError> {
    let route = route::resolve(bridge, message)?;

    if let Some(text) = message.text()
        && is_single_emoji(text)
        && let Some(quote) = &route.quote
    {
        send_reaction(bridge, &route.chat, quote, text.trim()).await?;
        tracing::debug!(a_chat = %route.chat, a_msg_id = %quote.stanza_id, "reaction sent");
        reply_notice(bridge, message, "Successfully reacted").await;
        return Ok(Outcome::Bridged);
    }

    let Some(payload) = content::build(bridge, &message.content).await? else {
        return Ok(Outcome::Dropped(DropReason::Unsupported));
    };

    let mut outgoing = OutgoingMessage::new(payload);
    outgoing.quote = route.quote.clone();
    outgoing.mentions =
        content::mentions(bridge, &route.chat, content::text_of(&message.content)).await?;
    let chat_key = route.chat.to_string();
    outgoing.expiration_secs = bridge
        .store
        .ephemeral(&chat_key)?
        .filter(|settings| settings.is_ephemeral && settings.timer_secs > 0)
        .map(|settings| settings.timer_secs);

    let sent = bridge.source.send_message(&route.chat, outgoing).await?;

    let own = bridge.own_id().unwrap_or_else(|| route.chat.clone());
    bridge.store.record_msg_pair(&MessagePair {
        a_msg_id: sent.id.clone(),
        a_participant: own.to_string(),
        a_chat: chat_key.clone(),
        b_chat: message.chat_id,
        b_thread: message.thread_id,
        b_msg: message.message_id,
        read_marker: Some(true),
    })?;
    tracing::debug!(a_chat = %chat_key, a_msg_id = %sent.id, b_msg = message.message_id, "operator message sent");

    if let Err(err) = send_read_receipts(bridge, &route.chat).await {
        tracing::warn!(a_chat = %chat_key, error = %err, "failed to send read receipts");
    }

    confirm(bridge, message).await;
    Ok(Outcome::Bridged)
}

async fn send_reaction<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    chat: &Jid,
    quote: &QuotedMessage,
    emoji: &str,
) -> Result<(), BridgeError> {
    let key = MessageKey {
        chat: chat.clone(),
        id: quote.stanza_id.clone(),
        from_me: bridge.is_own(&quote.participant),
        participant: chat.is_group().then(|| quote.participant.clone()),
    };
    bridge.source.send_reaction(chat, &key, emoji).await?;
    Ok(())
}

/// Mark everything bridged from `chat` as read on Network A.
async fn send_read_receipts<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    chat: &Jid,
) -> Result<(), BridgeError> {
    let chat_key = chat.to_string();
    let unread = bridge.store.unread_msg_pairs(&chat_key, bridge.target_chat())?;

    let mut by_sender: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in unread {
        by_sender.entry(pair.a_participant).or_default().push(pair.a_msg_id);
    }

    let now = bridge.env.wall_clock_secs();
    for (sender, ids) in by_sender {
        let Ok(sender_jid) = Jid::parse(&sender) else {
            tracing::debug!(a_participant = %sender, "skipping receipts for unparsable sender");
            continue;
        };
        if !bridge.is_own(&sender_jid) {
            bridge.source.mark_read(chat, &sender_jid, &ids, now).await?;
        }
        bridge.store.mark_read(&chat_key, &ids)?;
    }
    Ok(())
}

/// Acknowledge a successful send the configured way.
async fn confirm<E: Environment, S: Storage>(bridge: &Bridge<E, S>, message: &ForumMessage) {
    match bridge.config.telegram.confirmation_type {
        ConfirmationType::Emoji => {
            if let Err(err) =
                bridge.forum.set_reaction(message.chat_id, message.message_id, "👍").await
            {
                tracing::warn!(error = %err, "failed to confirm send");
            }
        },
        ConfirmationType::Text => reply_notice(bridge, message, "Successfully sent").await,
    }
}

/// Reply to an operator message with a short text; failures are logged.
pub(crate) async fn reply_notice<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    html: &str,
) {
    if let Err(err) = bridge
        .forum
        .send_text(message.chat_id, message.thread_id, html, Some(message.message_id))
        .await
    {
        tracing::warn!(b_msg = message.message_id, error = %err, "failed to reply to operator");
    }
}

/// Tell the operator why their message or command failed.
pub async fn report_operator_failure<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    err: &BridgeError,
) {
    if !err.is_reportable() {
        return;
    }
    let text = match err {
        BridgeError::Routing(notice) => escape_html(notice),
        _ => format!("<b>Failed to send</b>\n<code>{}</code>", escape_html(&err.to_string())),
    };
    reply_notice(bridge, message, &text).await;
}
