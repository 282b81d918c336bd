//! Where an operator message goes on Network A.

use forumbridge_core::Environment;
use forumbridge_proto::{ForumMessage, Jid, QuotedMessage};

use crate::{context::Bridge, error::BridgeError, storage::Storage, topics::is_reserved};

/// Resolved Network-A destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Route {
    /// Conversation to send into.
    pub chat: Jid,
    /// Quoted message when the operator replied to a bridged post.
    pub quote: Option<QuotedMessage>,
}

fn parse_jid(raw: &str) -> Result<Jid, BridgeError> {
    Jid::parse(raw).map_err(|err| BridgeError::routing(format!("Stored chat id is invalid: {err}")))
}

/// The bridged post `message` replies to, if it is a real reply.
///
/// Messages in a topic implicitly reply to the topic's opening service
/// message; that is not a reply anchor.
pub(crate) fn reply_target(message: &ForumMessage) -> Option<&ForumMessage> {
    message
        .reply_to
        .as_deref()
        .filter(|reply| !reply.is_topic_created() && reply.message_id != message.thread_id)
}

/// Resolve the destination for an operator message in the target chat.
///
/// A reply to a bridged post goes to that post's conversation, quoting it.
/// Anything else goes to the conversation bound to the topic.
pub(crate) fn resolve<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<Route, BridgeError> {
    if let Some(reply) = reply_target(message)
        && let Some(pair) =
            bridge.store.lookup_a_from_b(message.chat_id, reply.message_id, message.thread_id)?
    {
        let participant = parse_jid(&pair.a_participant)?;
        let mut chat = parse_jid(&pair.a_chat)?;
        // Status updates and the operator's own chat are answered privately
        if chat.is_broadcast() || bridge.is_own(&chat) {
            chat = participant.clone();
        }
        return Ok(Route {
            chat,
            quote: Some(QuotedMessage { stanza_id: pair.a_msg_id, participant }),
        });
    }

    let Some(binding) = bridge.store.chat_thread_by_b(message.chat_id, message.thread_id)? else {
        return Err(BridgeError::routing(
            "This topic is not linked to a WhatsApp chat. Reply to a bridged message, or link \
             the topic with /settargetgroupchat or /settargetprivatechat.",
        ));
    };
    if is_reserved(&binding.a_chat) {
        return Err(BridgeError::routing(
            "This topic only collects notices. Reply to a message to answer it.",
        ));
    }

    let chat = parse_jid(&binding.a_chat)?;
    if chat.is_broadcast() {
        return Err(BridgeError::routing("Reply to a status update to answer its author."));
    }
    Ok(Route { chat, quote: None })
}
