//! Operator payloads as Network-A content.

use bytes::Bytes;
use forumbridge_core::Environment;
use forumbridge_proto::{FileRef, ForumContent, Jid, OutgoingContent};

use crate::{context::Bridge, error::BridgeError, storage::Storage};

const MIB: u64 = 1024 * 1024;

/// Text or caption of a payload, empty if it has none.
pub(crate) fn text_of(content: &ForumContent) -> &str {
    match content {
        ForumContent::Text(text) => text,
        ForumContent::Photo { caption, .. }
        | ForumContent::Video { caption, .. }
        | ForumContent::Animation { caption, .. }
        | ForumContent::Audio { caption, .. }
        | ForumContent::Document { caption, .. } => caption,
        ForumContent::VideoNote { .. }
        | ForumContent::Voice { .. }
        | ForumContent::Sticker { .. }
        | ForumContent::ForumTopicCreated { .. }
        | ForumContent::Unsupported => "",
    }
}

async fn fetch<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    file: &FileRef,
) -> Result<Bytes, BridgeError> {
    if let Some(limit) = bridge.config.download_limit()
        && file.file_size.is_some_and(|size| size > limit)
    {
        return Err(BridgeError::routing(format!(
            "This file is larger than the {} MiB download limit.",
            limit / MIB
        )));
    }
    Ok(bridge.forum.download(&file.file_id).await?)
}

fn mime_or(file: &FileRef, default: &str) -> String {
    file.mime_type.clone().unwrap_or_else(|| default.to_string())
}

/// Convert an operator payload, downloading any attached file.
///
/// Returns `None` for payloads with no Network-A counterpart.
pub(crate) async fn build<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    content: &ForumContent,
) -> Result<Option<OutgoingContent>, BridgeError> {
    let outgoing = match content {
        ForumContent::Text(text) => OutgoingContent::Text(text.clone()),
        ForumContent::Photo { file, caption } => OutgoingContent::Image {
            data: fetch(bridge, file).await?,
            mime_type: mime_or(file, "image/jpeg"),
            caption: caption.clone(),
        },
        ForumContent::Video { file, caption, duration } => OutgoingContent::Video {
            data: fetch(bridge, file).await?,
            mime_type: mime_or(file, "video/mp4"),
            caption: caption.clone(),
            gif_playback: false,
            seconds: *duration,
        },
        ForumContent::Animation { file, caption, duration } => OutgoingContent::Video {
            data: fetch(bridge, file).await?,
            mime_type: mime_or(file, "video/mp4"),
            caption: caption.clone(),
            gif_playback: true,
            seconds: *duration,
        },
        ForumContent::VideoNote { file, duration } => {
            OutgoingContent::VideoNote { data: fetch(bridge, file).await?, seconds: *duration }
        },
        ForumContent::Audio { file, duration, .. } => OutgoingContent::Audio {
            data: fetch(bridge, file).await?,
            mime_type: mime_or(file, "audio/mpeg"),
            voice: false,
            seconds: *duration,
        },
        ForumContent::Voice { file, duration } => OutgoingContent::Audio {
            data: fetch(bridge, file).await?,
            mime_type: mime_or(file, "audio/ogg; codecs=opus"),
            voice: true,
            seconds: *duration,
        },
        ForumContent::Document { file, caption } => OutgoingContent::Document {
            data: fetch(bridge, file).await?,
            mime_type: mime_or(file, "application/octet-stream"),
            file_name: file.file_name.clone().unwrap_or_else(|| "file".to_string()),
            caption: caption.clone(),
        },
        ForumContent::Sticker { is_animated: true, .. }
        | ForumContent::Sticker { is_video: true, .. } => {
            return Err(BridgeError::routing(
                "Animated and video stickers can't be sent to WhatsApp.",
            ));
        },
        ForumContent::Sticker { file, .. } => OutgoingContent::Sticker {
            data: fetch(bridge, file).await?,
            mime_type: "image/webp".to_string(),
        },
        ForumContent::ForumTopicCreated { .. } | ForumContent::Unsupported => return Ok(None),
    };
    Ok(Some(outgoing))
}

/// Mention tokens in operator text.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct MentionTokens {
    /// `@<digits>` user portions, in order, without duplicates.
    pub users: Vec<String>,
    /// `@all` or `@everyone` was present.
    pub everyone: bool,
}

pub(crate) fn mention_tokens(text: &str) -> MentionTokens {
    let mut tokens = MentionTokens::default();
    for word in text.split_whitespace() {
        let Some(name) = word.strip_prefix('@') else { continue };
        let name = name.trim_end_matches(|c: char| !c.is_alphanumeric());
        if name.eq_ignore_ascii_case("all") || name.eq_ignore_ascii_case("everyone") {
            tokens.everyone = true;
        } else if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_digit())
            && !tokens.users.iter().any(|user| user == name)
        {
            tokens.users.push(name.to_string());
        }
    }
    tokens
}

/// Users mentioned by operator `text` sent into `chat`.
///
/// `@all`/`@everyone` expands to every other participant, but only in
/// groups listed in `tag_all_allowed_groups`.
pub(crate) async fn mentions<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    chat: &Jid,
    text: &str,
) -> Result<Vec<Jid>, BridgeError> {
    let tokens = mention_tokens(text);
    let mut mentioned: Vec<Jid> = tokens.users.into_iter().map(Jid::user).collect();

    if tokens.everyone && chat.is_group() && bridge.config.whatsapp.allows_tag_all(chat) {
        let group = bridge.source.group_info(chat).await?;
        for participant in group.participants {
            let jid = participant.jid.to_non_device();
            if !bridge.is_own(&jid) && !mentioned.contains(&jid) {
                mentioned.push(jid);
            }
        }
    }
    Ok(mentioned)
}
