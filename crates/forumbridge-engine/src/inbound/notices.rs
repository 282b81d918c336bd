//! Notices for non-message events.

use std::fmt::Write;

use forumbridge_core::{
    Environment,
    format::{CAPTION_LIMIT, Header, TEXT_LIMIT, escape_html},
};
use forumbridge_proto::{
    CALLS_KEY, CallOffer, ForumMedia, GroupInfoChange, InputFile, Jid, LoggedOut, PictureChange,
    PushNameChange, Receipt, ReceiptKind, UserAbout,
};

use super::{
    media::{Post, send_file, send_text},
    message::chat_label,
};
use crate::{
    context::Bridge,
    engine::Phase,
    error::BridgeError,
    outcome::{DropReason, Outcome},
    storage::{EphemeralSettings, Storage},
    topics::clamp_title,
};

/// Operator read messages on another device.
pub(super) fn receipt<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    receipt: &Receipt,
) -> Result<Outcome, BridgeError> {
    if receipt.kind != ReceiptKind::ReadSelf {
        return Ok(Outcome::Dropped(DropReason::IrrelevantReceipt));
    }
    let chat = receipt.chat.to_non_device().to_string();
    let updated = bridge.store.mark_read(&chat, &receipt.message_ids)?;
    tracing::debug!(a_chat = %chat, updated, "read markers updated");
    Ok(Outcome::Updated)
}

/// Topic for an info update, created only when the config allows it.
async fn info_thread<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    jid: &Jid,
) -> Result<Option<i64>, BridgeError> {
    if bridge.config.whatsapp.create_thread_for_info_updates {
        return bridge.ensure_conversation_thread(jid).await.map(Some);
    }
    bridge.existing_thread(&jid.to_non_device().to_string())
}

async fn author_name<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    author: Option<&Jid>,
) -> Result<String, BridgeError> {
    match author {
        Some(author) if bridge.is_own(author) => Ok("You".to_string()),
        Some(author) => bridge.display_name(author, "").await,
        None => Ok("Unknown".to_string()),
    }
}

pub(super) async fn picture<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    change: &PictureChange,
) -> Result<Outcome, BridgeError> {
    if bridge.config.whatsapp.skip_profile_picture_updates {
        return Ok(Outcome::Dropped(DropReason::Disabled));
    }
    let jid = change.jid.to_non_device();
    let Some(b_thread) = info_thread(bridge, &jid).await? else {
        return Ok(Outcome::Dropped(DropReason::NoTopic));
    };

    let author = author_name(bridge, Some(change.author.as_ref().unwrap_or(&jid))).await?;
    let header = bridge.sender_header(author, change.timestamp);
    let post = Post { b_thread, reply_to: None, header: &header };

    if change.removed {
        let text = header.with_body("<i>Removed the profile picture</i>", TEXT_LIMIT);
        send_text(bridge, &post, &text).await?;
        return Ok(Outcome::Bridged);
    }

    let body = "<i>Changed the profile picture</i>";
    match bridge.source.profile_picture(&jid).await? {
        Some(data) => {
            let file = InputFile { data, file_name: "profile.jpg".into() };
            let caption = header.with_body(body, CAPTION_LIMIT);
            send_file(bridge, &post, ForumMedia::Photo, file, Some(caption), false).await?;
        },
        None => {
            send_text(bridge, &post, &header.with_body(body, TEXT_LIMIT)).await?;
        },
    }
    Ok(Outcome::Bridged)
}

/// Human form of a disappearing-message timer.
fn timer_label(secs: u32) -> String {
    const DAY: u32 = 86_400;
    const HOUR: u32 = 3_600;
    match secs {
        s if s >= DAY && s % DAY == 0 => plural(s / DAY, "day"),
        s if s >= HOUR && s % HOUR == 0 => plural(s / HOUR, "hour"),
        s => plural(s, "second"),
    }
}

fn plural(count: u32, unit: &str) -> String {
    if count == 1 { format!("1 {unit}") } else { format!("{count} {unit}s") }
}

async fn name_list<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    users: &[Jid],
) -> Result<String, BridgeError> {
    let mut names = Vec::with_capacity(users.len());
    for user in users {
        names.push(bridge.resolve_user(user).await?);
    }
    Ok(names.join(", "))
}

/// Notice lines for every populated field of a group change.
async fn group_change_lines<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    change: &GroupInfoChange,
) -> Result<Vec<String>, BridgeError> {
    let mut lines = Vec::new();
    match change.announce {
        Some(true) => lines.push("Only admins can send messages now".to_string()),
        Some(false) => lines.push("All participants can send messages now".to_string()),
        None => {},
    }
    if let Some(ephemeral) = &change.ephemeral {
        lines.push(if ephemeral.is_ephemeral {
            format!("Turned on disappearing messages ({})", timer_label(ephemeral.timer_secs))
        } else {
            "Turned off disappearing messages".to_string()
        });
    }
    if let Some(reason) = &change.delete {
        lines.push(if reason.is_empty() {
            "Deleted the group".to_string()
        } else {
            format!("Deleted the group: {reason}")
        });
    }
    for (users, verb) in [
        (&change.join, "joined"),
        (&change.leave, "left"),
        (&change.promote, "became admin"),
        (&change.demote, "is no longer admin"),
    ] {
        if !users.is_empty() {
            lines.push(format!("{} {verb}", name_list(bridge, users).await?));
        }
    }
    if let Some(topic) = &change.topic {
        lines.push(format!("Changed the group description:\n{topic}"));
    }
    if let Some(name) = &change.name {
        lines.push(format!("Renamed the group to {name}"));
    }
    Ok(lines)
}

pub(super) async fn group_info<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    change: &GroupInfoChange,
) -> Result<Outcome, BridgeError> {
    let group = change.jid.to_non_device();
    let key = group.to_string();

    if let Some(ephemeral) = &change.ephemeral {
        let settings = EphemeralSettings {
            is_ephemeral: ephemeral.is_ephemeral,
            timer_secs: ephemeral.timer_secs,
        };
        bridge.store.set_ephemeral(&key, settings)?;
    }
    if let Some(name) = change.name.as_deref().filter(|name| !name.trim().is_empty()) {
        bridge.cache_group_name(&group, name)?;
        if let Some(b_thread) = bridge.existing_thread(&key)? {
            bridge.forum.edit_topic(bridge.target_chat(), b_thread, &clamp_title(name)).await?;
            tracing::info!(a_chat = %key, b_thread, "topic renamed after group rename");
        }
    }

    if bridge.config.whatsapp.skip_group_settings_updates {
        return Ok(Outcome::Updated);
    }
    let lines = group_change_lines(bridge, change).await?;
    if lines.is_empty() {
        return Ok(Outcome::Updated);
    }
    let Some(b_thread) = info_thread(bridge, &group).await? else {
        return Ok(Outcome::Dropped(DropReason::NoTopic));
    };

    let header = Header {
        sender: author_name(bridge, change.sender.as_ref()).await?,
        chat_label: if bridge.config.whatsapp.skip_chat_details {
            None
        } else {
            Some(chat_label(bridge, &group).await?)
        },
        timestamp: bridge.stale_timestamp(change.timestamp),
        ..Header::default()
    };
    let mut body = String::new();
    for line in &lines {
        if !body.is_empty() {
            body.push('\n');
        }
        let _ = write!(body, "<i>{}</i>", escape_html(line));
    }

    let post = Post { b_thread, reply_to: None, header: &header };
    send_text(bridge, &post, &header.with_body(&body, TEXT_LIMIT)).await?;
    Ok(Outcome::Bridged)
}

pub(super) async fn push_name<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    change: &PushNameChange,
) -> Result<Outcome, BridgeError> {
    let user = change.jid.to_non_device();
    let key = user.to_string();
    let mut names = bridge.store.contact(&key)?.unwrap_or_default();
    names.push_name.clone_from(&change.new_push_name);
    bridge.store.upsert_contact(&key, &names)?;

    let Some(b_thread) = info_thread(bridge, &user).await? else {
        return Ok(Outcome::Updated);
    };
    let sender = names.best().unwrap_or(user.user_part()).to_string();
    let header = Header { sender, ..Header::default() };
    let body = format!(
        "<i>Changed their name from</i> {} <i>to</i> {}",
        escape_html(&change.old_push_name),
        escape_html(&change.new_push_name)
    );
    let post = Post { b_thread, reply_to: None, header: &header };
    send_text(bridge, &post, &header.with_body(&body, TEXT_LIMIT)).await?;
    Ok(Outcome::Bridged)
}

pub(super) async fn user_about<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    about: &UserAbout,
) -> Result<Outcome, BridgeError> {
    let user = about.jid.to_non_device();
    let Some(b_thread) = info_thread(bridge, &user).await? else {
        return Ok(Outcome::Dropped(DropReason::NoTopic));
    };
    let name = bridge.display_name(&user, "").await?;
    let header = bridge.sender_header(name, about.timestamp);
    let body = format!("<i>Changed their about to:</i>\n{}", escape_html(&about.status));
    let post = Post { b_thread, reply_to: None, header: &header };
    send_text(bridge, &post, &header.with_body(&body, TEXT_LIMIT)).await?;
    Ok(Outcome::Bridged)
}

pub(super) async fn call_offer<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    offer: &CallOffer,
) -> Result<Outcome, BridgeError> {
    let b_thread = bridge.ensure_thread(CALLS_KEY, "Calls").await?;
    let caller = bridge.resolve_user(&offer.from).await?;
    let header = bridge.sender_header(caller, offer.timestamp);
    let kind = if offer.video { "video" } else { "voice" };
    let body = format!("📞 <i>Incoming {kind} call</i>");
    let post = Post { b_thread, reply_to: None, header: &header };
    send_text(bridge, &post, &header.with_body(&body, TEXT_LIMIT)).await?;
    Ok(Outcome::Bridged)
}

/// The Network-A session ended; keep Network B up for diagnostics.
pub(super) async fn logged_out<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    logged_out: &LoggedOut,
) -> Result<Outcome, BridgeError> {
    bridge.set_phase(Phase::Reconnecting);
    bridge.source.disconnect().await;
    tracing::error!(
        reason = %logged_out.reason,
        on_connect = logged_out.on_connect,
        "whatsapp session logged out"
    );

    let reason = if logged_out.reason.is_empty() { "no reason given" } else { &logged_out.reason };
    Err(BridgeError::Fatal(format!(
        "WhatsApp session was logged out ({reason}). Pair the device again and send /restartwa."
    )))
}
