//! Command Dispatcher.
//!
//! Slash commands from the operator. Every command and button press passes
//! the same authoriser: only the configured owner is served, anyone else
//! is ignored (or told no, for button presses).

use forumbridge_core::{
    Environment,
    format::{TEXT_LIMIT, escape_html, truncate_html},
};
use forumbridge_proto::{
    CallbackQuery, ForumMedia, ForumMessage, ForumRequest, GENERAL_THREAD, InlineButton,
    InputFile, Jid, OutgoingMessage, SendOptions,
};

use crate::{
    context::Bridge,
    error::BridgeError,
    names::titled,
    outbound::{content, route},
    outcome::{DropReason, Outcome},
    storage::{ChatThreadPair, Storage},
    topics::{clamp_title, reserved_title},
};

const HELP: &str = "<b>Commands</b>\n\
/getwagroups - list your groups\n\
/findcontact &lt;query&gt; - search contacts by name or number\n\
/synccontacts - refresh the contact cache\n\
/clearpairhistory - forget every bridged message\n\
/restartwa - reconnect to WhatsApp\n\
/joininvitelink &lt;link&gt; - join a group\n\
/settargetgroupchat &lt;group id&gt; - link this topic to a group\n\
/settargetprivatechat &lt;number&gt; - link this topic to a contact\n\
/send &lt;chat id&gt; - send the replied message to another chat\n\
/revoke - delete the replied message for everyone\n\
/synctopicnames - rename topics after their chats\n\
/getprofilepicture - show this chat's profile picture";

/// Callback payload prefix for revoke confirmations.
const REVOKE_PREFIX: &str = "revoke:";

/// Parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Greeting.
    Start,
    /// Command list.
    Help,
    /// List joined groups.
    GetWaGroups,
    /// Search cached contacts.
    FindContact(String),
    /// Refresh the contact cache.
    SyncContacts,
    /// Delete every message pair.
    ClearPairHistory,
    /// Reconnect the Network-A client.
    RestartWa,
    /// Join a group by invite link.
    JoinInviteLink(String),
    /// Bind the current topic to a group.
    SetTargetGroupChat(String),
    /// Bind the current topic to a user.
    SetTargetPrivateChat(String),
    /// Forward the replied-to message to a chat.
    Send(String),
    /// Revoke the replied-to message after confirmation.
    Revoke,
    /// Re-resolve every topic title.
    SyncTopicNames,
    /// Post the bound chat's profile picture.
    GetProfilePicture,
}

impl Command {
    /// Parse `/name[@bot] args`.
    ///
    /// Returns `None` when `text` is not a known command and `Some(Err)`
    /// with a usage line when a required argument is missing.
    pub fn parse(text: &str) -> Option<Result<Self, String>> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split_once('@').map_or(head, |(name, _)| name).to_ascii_lowercase();
        let args = args.trim();

        let with_arg = |make: fn(String) -> Self, usage: &str| {
            let arg = args.split_whitespace().next().unwrap_or_default();
            if arg.is_empty() { Err(format!("Usage: {usage}")) } else { Ok(make(arg.to_string())) }
        };

        Some(match name.as_str() {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "getwagroups" => Ok(Self::GetWaGroups),
            "findcontact" if args.is_empty() => {
                Err("Usage: /findcontact <name or number>".to_string())
            },
            "findcontact" => Ok(Self::FindContact(args.to_string())),
            "synccontacts" => Ok(Self::SyncContacts),
            "clearpairhistory" => Ok(Self::ClearPairHistory),
            "restartwa" => Ok(Self::RestartWa),
            "joininvitelink" => with_arg(Self::JoinInviteLink, "/joininvitelink <link>"),
            "settargetgroupchat" => {
                with_arg(Self::SetTargetGroupChat, "/settargetgroupchat <group id>")
            },
            "settargetprivatechat" => {
                with_arg(Self::SetTargetPrivateChat, "/settargetprivatechat <number>")
            },
            "send" => with_arg(Self::Send, "/send <chat id>, as a reply"),
            "revoke" => Ok(Self::Revoke),
            "synctopicnames" => Ok(Self::SyncTopicNames),
            "getprofilepicture" => Ok(Self::GetProfilePicture),
            _ => return None,
        })
    }
}

/// Single authoriser for commands, buttons and forwarded messages.
pub fn authorize<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    user_id: i64,
) -> Result<(), BridgeError> {
    if user_id == bridge.owner_id() { Ok(()) } else { Err(BridgeError::Unauthorized) }
}

async fn reply<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    html: &str,
) -> Result<(), BridgeError> {
    bridge
        .forum
        .send_text(message.chat_id, message.thread_id, html, Some(message.message_id))
        .await?;
    Ok(())
}

/// Split lines into posts that each fit Network B's text limit.
pub(crate) fn chunk_lines(lines: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in lines {
        let line = truncate_html(line, limit);
        if !current.is_empty() && current.chars().count() + 1 + line.chars().count() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn reply_lines<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    lines: &[String],
) -> Result<(), BridgeError> {
    for chunk in chunk_lines(lines, TEXT_LIMIT) {
        reply(bridge, message, &chunk).await?;
    }
    Ok(())
}

/// Network-A chat named by a command argument.
///
/// Accepts a full JID, or a bare id that is read as a group when
/// `group` is set and as a phone number otherwise.
fn parse_chat(raw: &str, group: bool) -> Result<Jid, BridgeError> {
    let jid = if raw.contains('@') {
        Jid::parse(raw).map_err(|err| BridgeError::routing(format!("Invalid chat id: {err}")))?
    } else if group {
        Jid::group(raw)
    } else {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(BridgeError::routing(format!("Invalid phone number: {raw}")));
        }
        Jid::user(digits)
    };
    Ok(jid.to_non_device())
}

/// Run an authorised operator command.
pub async fn handle_command<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    command: Command,
) -> Result<Outcome, BridgeError> {
    if authorize(bridge, message.sender_id()).is_err() {
        tracing::info!(user = message.sender_id(), ?command, "unauthorized command ignored");
        return Ok(Outcome::Dropped(DropReason::Unauthorized));
    }
    tracing::debug!(?command, "running command");

    match command {
        Command::Start => {
            reply(bridge, message, "Hi! The bridge is running. Send /help for the commands.")
                .await?;
        },
        Command::Help => reply(bridge, message, HELP).await?,
        Command::GetWaGroups => get_groups(bridge, message).await?,
        Command::FindContact(query) => find_contact(bridge, message, &query).await?,
        Command::SyncContacts => {
            let count = bridge.sync_contacts().await?;
            reply(bridge, message, &format!("Synced {count} contacts")).await?;
        },
        Command::ClearPairHistory => {
            let count = bridge.store.delete_all_msg_pairs()?;
            tracing::info!(count, "message pairs cleared");
            reply(bridge, message, &format!("Deleted {count} message pairs")).await?;
        },
        Command::RestartWa => restart_source(bridge, message).await?,
        Command::JoinInviteLink(link) => {
            let code = link.trim().trim_end_matches('/').rsplit('/').next().unwrap_or_default();
            if code.is_empty() {
                return Err(BridgeError::routing("That invite link has no code."));
            }
            let group = bridge.source.join_group_with_link(code).await?;
            reply(bridge, message, &format!("Joined <code>{group}</code>")).await?;
        },
        Command::SetTargetGroupChat(id) => {
            let chat = parse_chat(&id, true)?;
            if !chat.is_group() {
                return Err(BridgeError::routing(format!("{chat} is not a group")));
            }
            bind_topic(bridge, message, &chat).await?;
        },
        Command::SetTargetPrivateChat(id) => {
            let chat = parse_chat(&id, false)?;
            if !chat.is_user() {
                return Err(BridgeError::routing(format!("{chat} is not a contact")));
            }
            bind_topic(bridge, message, &chat).await?;
        },
        Command::Send(id) => forward(bridge, message, &id).await?,
        Command::Revoke => ask_revoke(bridge, message).await?,
        Command::SyncTopicNames => sync_topic_names(bridge, message).await?,
        Command::GetProfilePicture => profile_picture(bridge, message).await?,
    }
    Ok(Outcome::Bridged)
}

async fn get_groups<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<(), BridgeError> {
    let mut groups = bridge.source.joined_groups().await?;
    if groups.is_empty() {
        return reply(bridge, message, "You are not in any groups").await;
    }
    groups.sort_by_key(|group| group.name.to_lowercase());
    let lines: Vec<String> = groups
        .iter()
        .map(|group| format!("{}: <code>{}</code>", escape_html(&group.name), group.jid))
        .collect();
    reply_lines(bridge, message, &lines).await
}

async fn find_contact<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    query: &str,
) -> Result<(), BridgeError> {
    let mut contacts = bridge.store.contacts()?;
    if contacts.is_empty() {
        bridge.sync_contacts().await?;
        contacts = bridge.store.contacts()?;
    }

    let needle = query.trim().to_lowercase();
    let lines: Vec<String> = contacts
        .iter()
        .filter_map(|(key, names)| {
            let jid = Jid::parse(key).ok().filter(Jid::is_user)?;
            (names.matches(&needle) || jid.user_part().contains(&needle)).then(|| {
                format!(
                    "{}: <code>{}</code>",
                    escape_html(&titled(Some(names), jid.user_part())),
                    jid.user_part()
                )
            })
        })
        .collect();

    if lines.is_empty() {
        return reply(bridge, message, "No matching contacts found").await;
    }
    reply_lines(bridge, message, &lines).await
}

async fn restart_source<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<(), BridgeError> {
    bridge.source.disconnect().await;
    bridge.set_phase(crate::engine::Phase::Connecting);
    if let Err(err) = bridge.source.connect().await {
        bridge.set_phase(crate::engine::Phase::Reconnecting);
        return Err(err.into());
    }
    bridge.set_phase(crate::engine::Phase::Running);
    reply(bridge, message, "Reconnected to WhatsApp").await
}

async fn bind_topic<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    chat: &Jid,
) -> Result<(), BridgeError> {
    if !message.is_topic_message || message.thread_id == GENERAL_THREAD {
        return Err(BridgeError::routing("Send this command inside the topic you want to link."));
    }
    if message.chat_id != bridge.target_chat() {
        return Err(BridgeError::routing("Topics can only be linked in the target chat."));
    }

    let key = chat.to_string();
    // Serialised with topic creation for this chat.
    let _guard = bridge.topic_locks.lock(&format!("{}:{key}", message.chat_id)).await;
    if let Some(existing) = bridge.store.chat_thread_by_a(&key, message.chat_id)? {
        let notice = if existing.b_thread == message.thread_id {
            "This topic is already linked to that chat.".to_string()
        } else {
            format!(
                "{key} is already linked to another topic. Unlink it there before linking it here."
            )
        };
        return Err(BridgeError::Routing(notice));
    }
    if let Some(other) = bridge.store.chat_thread_by_b(message.chat_id, message.thread_id)? {
        return Err(BridgeError::Routing(format!(
            "This topic is already linked to {}.",
            other.a_chat
        )));
    }

    bridge.store.record_chat_thread(&ChatThreadPair {
        a_chat: key.clone(),
        b_chat: message.chat_id,
        b_thread: message.thread_id,
    })?;
    tracing::info!(a_chat = %key, b_thread = message.thread_id, "topic linked by operator");
    reply(bridge, message, &format!("Linked this topic to <code>{key}</code>")).await
}

async fn forward<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    id: &str,
) -> Result<(), BridgeError> {
    let Some(original) = route::reply_target(message) else {
        return Err(BridgeError::routing("Reply to the message you want to send."));
    };
    let chat = parse_chat(id, false).or_else(|_| parse_chat(id, true))?;
    let Some(payload) = content::build(bridge, &original.content).await? else {
        return Err(BridgeError::routing("That message can't be sent to WhatsApp."));
    };

    let mut outgoing = OutgoingMessage::new(payload);
    outgoing.expiration_secs = bridge
        .store
        .ephemeral(&chat.to_string())?
        .filter(|settings| settings.is_ephemeral && settings.timer_secs > 0)
        .map(|settings| settings.timer_secs);
    bridge.source.send_message(&chat, outgoing).await?;
    reply(bridge, message, "Successfully sent").await
}

async fn ask_revoke<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<(), BridgeError> {
    let Some(target) = route::reply_target(message) else {
        return Err(BridgeError::routing("Reply to the message you want to revoke."));
    };
    let Some(pair) =
        bridge.store.lookup_a_from_b(message.chat_id, target.message_id, message.thread_id)?
    else {
        return Err(BridgeError::routing("That message was not bridged."));
    };
    let sender = Jid::parse(&pair.a_participant)
        .map_err(|err| BridgeError::routing(format!("Stored sender is invalid: {err}")))?;
    if !bridge.is_own(&sender) {
        return Err(BridgeError::routing("You can only revoke messages you sent."));
    }

    let options = SendOptions {
        reply_to: Some(target.message_id),
        buttons: vec![
            InlineButton {
                text: "Yes".into(),
                data: format!("{REVOKE_PREFIX}{}", target.message_id),
            },
            InlineButton { text: "No".into(), data: format!("{REVOKE_PREFIX}cancel") },
        ],
        ..SendOptions::default()
    };
    bridge
        .forum
        .post(ForumRequest::SendMessage {
            chat_id: message.chat_id,
            thread_id: message.thread_id,
            text: "Revoke this message for everyone?".into(),
            options,
        })
        .await?;
    Ok(())
}

/// Handle an inline button press.
pub async fn handle_callback<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    query: &CallbackQuery,
) -> Result<Outcome, BridgeError> {
    if authorize(bridge, query.from.id).is_err() {
        tracing::info!(user = query.from.id, "unauthorized button press");
        bridge.forum.answer_callback(&query.id, "You are not allowed to do this.", true).await?;
        return Ok(Outcome::Dropped(DropReason::Unauthorized));
    }

    let Some(action) = query.data.strip_prefix(REVOKE_PREFIX) else {
        bridge.forum.answer_callback(&query.id, "Unknown action", false).await?;
        return Ok(Outcome::Dropped(DropReason::Unsupported));
    };
    let Some(prompt) = query.message.as_ref() else {
        bridge.forum.answer_callback(&query.id, "This prompt has expired.", false).await?;
        return Ok(Outcome::Dropped(DropReason::Unsupported));
    };

    if action == "cancel" {
        delete_prompt(bridge, prompt).await;
        bridge.forum.answer_callback(&query.id, "Cancelled", false).await?;
        return Ok(Outcome::Updated);
    }

    let Ok(b_msg) = action.parse::<i64>() else {
        bridge.forum.answer_callback(&query.id, "Invalid request", false).await?;
        return Ok(Outcome::Dropped(DropReason::Unsupported));
    };
    let Some(pair) = bridge.store.lookup_a_from_b(prompt.chat_id, b_msg, prompt.thread_id)? else {
        bridge.forum.answer_callback(&query.id, "That message is no longer bridged.", true).await?;
        return Ok(Outcome::Dropped(DropReason::UnknownOriginal));
    };

    let chat = Jid::parse(&pair.a_chat)
        .map_err(|err| BridgeError::routing(format!("Stored chat id is invalid: {err}")))?;
    bridge.source.revoke_message(&chat, &pair.a_msg_id).await?;
    bridge.store.delete_msg_pair_by_b(prompt.chat_id, b_msg)?;
    tracing::info!(a_chat = %pair.a_chat, a_msg_id = %pair.a_msg_id, "message revoked");

    delete_prompt(bridge, prompt).await;
    bridge.forum.answer_callback(&query.id, "Message revoked", false).await?;
    Ok(Outcome::Bridged)
}

async fn delete_prompt<E: Environment, S: Storage>(bridge: &Bridge<E, S>, prompt: &ForumMessage) {
    if let Err(err) = bridge.forum.delete_message(prompt.chat_id, prompt.message_id).await {
        tracing::warn!(b_msg = prompt.message_id, error = %err, "failed to delete prompt");
    }
}

async fn sync_topic_names<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<(), BridgeError> {
    let mut renamed = 0;
    for binding in bridge.store.chat_threads(bridge.target_chat())? {
        if reserved_title(&binding.a_chat).is_some() {
            continue;
        }
        let Ok(chat) = Jid::parse(&binding.a_chat) else { continue };
        let title = if chat.is_group() {
            bridge.refresh_group_name(&chat).await?
        } else {
            bridge.resolve_user(&chat).await?
        };
        if title.trim().is_empty() {
            continue;
        }
        bridge.forum.edit_topic(binding.b_chat, binding.b_thread, &clamp_title(&title)).await?;
        renamed += 1;
    }
    reply(bridge, message, &format!("Renamed {renamed} topics")).await
}

async fn profile_picture<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
) -> Result<(), BridgeError> {
    let binding = bridge
        .store
        .chat_thread_by_b(message.chat_id, message.thread_id)?
        .filter(|binding| reserved_title(&binding.a_chat).is_none());
    let Some(binding) = binding else {
        return Err(BridgeError::routing("Send this command inside a linked topic."));
    };
    let chat = Jid::parse(&binding.a_chat)
        .map_err(|err| BridgeError::routing(format!("Stored chat id is invalid: {err}")))?;

    let Some(data) = bridge.source.profile_picture(&chat).await? else {
        return reply(bridge, message, "No profile picture found").await;
    };
    bridge
        .forum
        .post(ForumRequest::SendMedia {
            chat_id: message.chat_id,
            thread_id: message.thread_id,
            kind: ForumMedia::Photo,
            file: InputFile { data, file_name: "profile.jpg".into() },
            caption: None,
            spoiler: false,
            options: SendOptions::reply_to(Some(message.message_id)),
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(Command::parse("/start"), Some(Ok(Command::Start)));
        assert_eq!(Command::parse("/help@forum_bridge_bot"), Some(Ok(Command::Help)));
        assert_eq!(
            Command::parse("/findcontact  alice smith "),
            Some(Ok(Command::FindContact("alice smith".into())))
        );
        assert_eq!(
            Command::parse("/settargetgroupchat 120363025246125486@g.us"),
            Some(Ok(Command::SetTargetGroupChat("120363025246125486@g.us".into())))
        );
    }

    #[test]
    fn missing_argument_yields_usage() {
        assert_eq!(
            Command::parse("/send"),
            Some(Err("Usage: /send <chat id>, as a reply".to_string()))
        );
        assert!(matches!(Command::parse("/findcontact"), Some(Err(_))));
    }

    #[test]
    fn unknown_and_plain_text_are_not_commands() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("/shrug"), None);
    }

    #[test]
    fn chat_arguments() {
        assert_eq!(parse_chat("+44 7700 900123", false).unwrap(), Jid::user("447700900123"));
        assert_eq!(parse_chat("12036302", true).unwrap(), Jid::group("12036302"));
        assert!(parse_chat("abc", false).is_err());
    }

    #[test]
    fn chunks_respect_limit() {
        let lines: Vec<String> = (0..50).map(|i| format!("line {i:02} {}", "x".repeat(30))).collect();
        let chunks = chunk_lines(&lines, 200);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 200));
        assert_eq!(chunks.join("\n"), lines.join("\n"));
    }
}
