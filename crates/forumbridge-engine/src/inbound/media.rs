//! Payload dispatch by message kind.
//!
//! Each arm returns the Network-B message id the pair is recorded against.
//! Primitives that cannot carry a caption (video notes, stickers, contacts,
//! locations) are sent as a reply to a separate header post, and the pair
//! points at the primitive.

use std::fmt::Write;

use bytes::Bytes;
use forumbridge_core::{
    Environment,
    format::{CAPTION_LIMIT, Header, TEXT_LIMIT, escape_html},
};
use forumbridge_proto::{
    ContactCard, ForumMedia, ForumRequest, InputFile, MediaMessage, MessageContent, Poll,
    SendOptions, VCard,
};

use super::message::render_text;
use crate::{context::Bridge, error::BridgeError, storage::Storage};

const MIB: u64 = 1024 * 1024;

/// Where and how a bridged message is posted.
pub(super) struct Post<'a> {
    pub b_thread: i64,
    pub reply_to: Option<i64>,
    pub header: &'a Header,
}

impl Post<'_> {
    fn replying_to(&self, b_msg: i64) -> Post<'_> {
        Post { b_thread: self.b_thread, reply_to: Some(b_msg), header: self.header }
    }
}

pub(super) async fn send_text<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    text: &str,
) -> Result<i64, BridgeError> {
    Ok(bridge.forum.send_text(bridge.target_chat(), post.b_thread, text, post.reply_to).await?)
}

/// Upload a file into the post's topic.
pub(super) async fn send_file<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    kind: ForumMedia,
    file: InputFile,
    caption: Option<String>,
    spoiler: bool,
) -> Result<i64, BridgeError> {
    let request = ForumRequest::SendMedia {
        chat_id: bridge.target_chat(),
        thread_id: post.b_thread,
        kind,
        file,
        caption: caption.filter(|_| kind.accepts_caption()),
        spoiler,
        options: SendOptions::reply_to(post.reply_to),
    };
    Ok(bridge.forum.post(request).await?)
}

pub(super) async fn dispatch<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    content: &MessageContent,
) -> Result<i64, BridgeError> {
    match content {
        MessageContent::Text { text, context } => {
            let body = render_text(bridge, text, context.as_ref()).await?;
            send_text(bridge, post, &post.header.with_body(&body, TEXT_LIMIT)).await
        },
        MessageContent::Image(media) => {
            upload(bridge, post, media, ForumMedia::Photo, "image", "image.jpg").await
        },
        MessageContent::Video { media, gif_playback: true } => {
            upload(bridge, post, media, ForumMedia::Animation, "gif", "animation.mp4").await
        },
        MessageContent::Video { media, .. } => {
            let kind = ForumMedia::Video { duration: media.seconds };
            upload(bridge, post, media, kind, "video", "video.mp4").await
        },
        MessageContent::VideoNote(media) => {
            let kind = ForumMedia::VideoNote { duration: media.seconds };
            upload(bridge, post, media, kind, "video note", "video_note.mp4").await
        },
        MessageContent::Audio { media, voice: true } => {
            let kind = ForumMedia::Voice { duration: media.seconds };
            upload(bridge, post, media, kind, "voice note", "voice.ogg").await
        },
        MessageContent::Audio { media, .. } => {
            let kind = ForumMedia::Audio { duration: media.seconds };
            let name = file_name_for(&media.media.mime_type, "audio");
            upload(bridge, post, media, kind, "audio", &name).await
        },
        MessageContent::Document(media) => {
            let name = media
                .file_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| file_name_for(&media.media.mime_type, "document"));
            upload(bridge, post, media, ForumMedia::Document, "document", &name).await
        },
        MessageContent::Sticker { media, animated, avatar } => {
            sticker(bridge, post, media, *animated || *avatar).await
        },
        MessageContent::Contact { card, .. } => {
            contacts(bridge, post, std::slice::from_ref(card), None).await
        },
        MessageContent::ContactsArray { display_name, cards, .. } => {
            contacts(bridge, post, cards, Some(display_name.as_str())).await
        },
        MessageContent::Location { latitude, longitude, name, address, accuracy_meters, .. } => {
            let mut body = String::new();
            if !name.is_empty() {
                let _ = writeln!(body, "<b>{}</b>", escape_html(name));
            }
            if !address.is_empty() {
                let _ = writeln!(body, "{}", escape_html(address));
            }
            let header_msg =
                send_text(bridge, post, &post.header.with_body(body.trim_end(), TEXT_LIMIT))
                    .await?;
            let request = ForumRequest::SendLocation {
                chat_id: bridge.target_chat(),
                thread_id: post.b_thread,
                latitude: *latitude,
                longitude: *longitude,
                horizontal_accuracy: *accuracy_meters,
                options: SendOptions::reply_to(Some(header_msg)),
            };
            Ok(bridge.forum.post(request).await?)
        },
        MessageContent::LiveLocation { latitude, longitude, caption, .. } => {
            let mut body = format!(
                "<i>Started sharing live location</i>\n\
                 <a href=\"https://maps.google.com/?q={latitude},{longitude}\">Last known position</a>"
            );
            if !caption.is_empty() {
                let _ = write!(body, "\n{}", escape_html(caption));
            }
            send_text(bridge, post, &post.header.with_body(&body, TEXT_LIMIT)).await
        },
        MessageContent::Poll(poll) => {
            send_text(bridge, post, &post.header.with_body(&render_poll(poll), TEXT_LIMIT)).await
        },
        MessageContent::Unsupported { kind } => {
            let body = format!("<i>Unsupported message type:</i> <code>{}</code>", escape_html(kind));
            send_text(bridge, post, &post.header.with_body(&body, TEXT_LIMIT)).await
        },
        MessageContent::Reaction { .. } | MessageContent::Protocol(_) => {
            tracing::debug!("protocol frame has no payload to post");
            Ok(0)
        },
    }
}

/// Notice posted instead of a file over the upload cap.
fn too_large_notice(label: &str, limit: u64) -> String {
    format!("<i>Couldn't send the {label}: it exceeds the {} MiB upload limit</i>", limit / MIB)
}

fn file_name_for(mime_type: &str, stem: &str) -> String {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    let extension = match essence {
        "audio/mpeg" => "mp3",
        "audio/mp4" | "audio/aac" => "m4a",
        "audio/ogg" => "ogg",
        "application/pdf" => "pdf",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "video/mp4" => "mp4",
        _ => return stem.to_string(),
    };
    format!("{stem}.{extension}")
}

/// Result of fetching a blob for upload.
enum Fetched {
    /// Blob within the cap.
    Data(Bytes),
    /// Too large; the id of the notice posted instead.
    Notice(i64),
}

/// Download a blob, enforcing the upload cap on declared and actual size.
async fn fetch<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    media: &MediaMessage,
    label: &str,
) -> Result<Fetched, BridgeError> {
    let limit = bridge.config.upload_limit();
    if let Some(limit) = limit
        && media.media.file_length > limit
    {
        let notice = post.header.with_body(&too_large_notice(label, limit), TEXT_LIMIT);
        return Ok(Fetched::Notice(send_text(bridge, post, &notice).await?));
    }

    let data = bridge.source.download(&media.media).await?;
    if let Some(limit) = limit
        && data.len() as u64 > limit
    {
        let notice = post.header.with_body(&too_large_notice(label, limit), TEXT_LIMIT);
        return Ok(Fetched::Notice(send_text(bridge, post, &notice).await?));
    }
    Ok(Fetched::Data(data))
}

async fn upload<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    media: &MediaMessage,
    kind: ForumMedia,
    label: &str,
    file_name: &str,
) -> Result<i64, BridgeError> {
    let data = match fetch(bridge, post, media, label).await? {
        Fetched::Data(data) => data,
        Fetched::Notice(notice) => return Ok(notice),
    };
    let file = InputFile { data, file_name: file_name.to_string() };
    let body = render_text(bridge, &media.caption, media.context.as_ref()).await?;

    if kind.accepts_caption() {
        let caption = post.header.with_body(&body, CAPTION_LIMIT);
        return send_file(bridge, post, kind, file, Some(caption), media.view_once).await;
    }

    let header_msg = send_text(bridge, post, &post.header.with_body(&body, TEXT_LIMIT)).await?;
    send_file(bridge, &post.replying_to(header_msg), kind, file, None, media.view_once).await
}

async fn sticker<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    media: &MediaMessage,
    animated: bool,
) -> Result<i64, BridgeError> {
    let data = match fetch(bridge, post, media, "sticker").await? {
        Fetched::Data(data) => data,
        Fetched::Notice(notice) => return Ok(notice),
    };

    if animated {
        match bridge.transcoder.animated_webp_to_gif(&data) {
            Ok(gif) => {
                let file = InputFile { data: gif, file_name: "sticker.gif".into() };
                let caption = post.header.render();
                return send_file(bridge, post, ForumMedia::Animation, file, Some(caption), false)
                    .await;
            },
            Err(err) => {
                tracing::debug!(error = %err, "sticker transcode failed, sending original");
            },
        }
    }

    let header_msg = send_text(bridge, post, &post.header.render()).await?;
    let file = InputFile { data, file_name: "sticker.webp".into() };
    send_file(bridge, &post.replying_to(header_msg), ForumMedia::Sticker, file, None, false).await
}

/// Phone number and display name for a contact primitive.
fn decode_card(card: &ContactCard) -> Option<(String, String)> {
    let vcard = VCard::parse(&card.vcard).ok()?;
    let phone = vcard.preferred_phone()?.number.clone();
    let name = if card.display_name.trim().is_empty() {
        vcard.full_name.unwrap_or_else(|| phone.clone())
    } else {
        card.display_name.clone()
    };
    Some((phone, name))
}

async fn contacts<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    post: &Post<'_>,
    cards: &[ContactCard],
    label: Option<&str>,
) -> Result<i64, BridgeError> {
    let body = label
        .map(|label| format!("<i>Shared {} contacts:</i> {}", cards.len(), escape_html(label)))
        .unwrap_or_default();
    let header_msg = send_text(bridge, post, &post.header.with_body(&body, TEXT_LIMIT)).await?;
    let anchored = post.replying_to(header_msg);

    let mut last_card = None;
    for card in cards {
        let Some((phone_number, first_name)) = decode_card(card) else {
            tracing::warn!(name = %card.display_name, "contact card could not be decoded");
            let notice = format!(
                "<i>Couldn't read the contact card for</i> {}",
                escape_html(&card.display_name)
            );
            send_text(bridge, &anchored, &notice).await?;
            continue;
        };
        let request = ForumRequest::SendContact {
            chat_id: bridge.target_chat(),
            thread_id: post.b_thread,
            phone_number,
            first_name,
            vcard: card.vcard.clone(),
            options: SendOptions::reply_to(Some(header_msg)),
        };
        last_card = Some(bridge.forum.post(request).await?);
    }

    Ok(match (cards.len(), last_card) {
        (1, Some(b_msg)) => b_msg,
        _ => header_msg,
    })
}

fn render_poll(poll: &Poll) -> String {
    let mut body = format!("<b>Poll:</b> {}\n", escape_html(&poll.question));
    if poll.selectable_count == 0 {
        body.push_str("<i>Select any number of options</i>\n");
    } else {
        let _ = writeln!(body, "<i>Select up to {}</i>", poll.selectable_count);
    }
    for (index, option) in poll.options.iter().enumerate() {
        let _ = write!(body, "\n{}. {}", index + 1, escape_html(option));
    }
    body
}
