//! Network-B bot surface.
//!
//! Updates arrive as [`ForumUpdate`]; every operation the engine performs is
//! a [`ForumRequest`] answered by a [`ForumResponse`]. Keeping the request a
//! single value lets middleware (parse mode, link previews, rate-limit
//! retries) wrap one call instead of one per method.

use bytes::Bytes;

/// Thread id of a forum chat's General topic.
pub const GENERAL_THREAD: i64 = 0;

/// Update delivered by the bot client.
#[derive(Debug, Clone)]
pub enum ForumUpdate {
    /// New message.
    Message(ForumMessage),
    /// Inline button press.
    CallbackQuery(CallbackQuery),
}

/// Network-B account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumUser {
    /// Numeric id.
    pub id: i64,
    /// First name.
    pub first_name: String,
    /// Username without `@`.
    pub username: Option<String>,
}

/// Downloadable file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Id to pass to `getFile`.
    pub file_id: String,
    /// Size in bytes, if known.
    pub file_size: Option<u64>,
    /// MIME type, if known.
    pub mime_type: Option<String>,
    /// Original file name, if known.
    pub file_name: Option<String>,
}

/// Message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumContent {
    /// Text (commands included).
    Text(String),
    /// Photo.
    Photo {
        /// Largest size.
        file: FileRef,
        /// Caption.
        caption: String,
    },
    /// Video.
    Video {
        /// Blob.
        file: FileRef,
        /// Caption.
        caption: String,
        /// Seconds.
        duration: u32,
    },
    /// Round video note.
    VideoNote {
        /// Blob.
        file: FileRef,
        /// Seconds.
        duration: u32,
    },
    /// GIF / silent MP4.
    Animation {
        /// Blob.
        file: FileRef,
        /// Caption.
        caption: String,
        /// Seconds.
        duration: u32,
    },
    /// Music.
    Audio {
        /// Blob.
        file: FileRef,
        /// Caption.
        caption: String,
        /// Seconds.
        duration: u32,
    },
    /// Voice note.
    Voice {
        /// Blob.
        file: FileRef,
        /// Seconds.
        duration: u32,
    },
    /// File.
    Document {
        /// Blob.
        file: FileRef,
        /// Caption.
        caption: String,
    },
    /// Sticker.
    Sticker {
        /// Blob.
        file: FileRef,
        /// TGS animated sticker.
        is_animated: bool,
        /// WebM video sticker.
        is_video: bool,
        /// Associated emoji.
        emoji: Option<String>,
    },
    /// Service message created when a forum topic is opened.
    ForumTopicCreated {
        /// Topic title.
        name: String,
    },
    /// Anything else.
    Unsupported,
}

/// Message in a Network-B chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumMessage {
    /// Chat.
    pub chat_id: i64,
    /// Message id.
    pub message_id: i64,
    /// Forum topic; [`GENERAL_THREAD`] outside topics.
    pub thread_id: i64,
    /// Sent inside a forum topic.
    pub is_topic_message: bool,
    /// Author.
    pub from: Option<ForumUser>,
    /// Unix seconds.
    pub date: i64,
    /// Message this one replies to.
    pub reply_to: Option<Box<ForumMessage>>,
    /// Payload.
    pub content: ForumContent,
}

impl ForumMessage {
    /// Text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            ForumContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Author id, `0` for anonymous/channel posts.
    pub fn sender_id(&self) -> i64 {
        self.from.as_ref().map_or(0, |user| user.id)
    }

    /// Whether this is the service message that opened a topic.
    pub fn is_topic_created(&self) -> bool {
        matches!(self.content, ForumContent::ForumTopicCreated { .. })
    }
}

/// Inline button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Query id to answer.
    pub id: String,
    /// Who pressed the button.
    pub from: ForumUser,
    /// Button payload.
    pub data: String,
    /// Message carrying the button.
    pub message: Option<ForumMessage>,
}

/// Text formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// HTML subset (`<b>`, `<i>`, `<a>`, `<code>`, ...).
    Html,
}

/// Inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    /// Label.
    pub text: String,
    /// Callback payload.
    pub data: String,
}

/// Options shared by every send-style request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Message to reply to.
    pub reply_to: Option<i64>,
    /// Formatting mode.
    pub parse_mode: Option<ParseMode>,
    /// Suppress link previews.
    pub disable_link_preview: bool,
    /// Send even if `reply_to` no longer exists.
    pub allow_sending_without_reply: bool,
    /// Inline keyboard, one row.
    pub buttons: Vec<InlineButton>,
}

impl SendOptions {
    /// Options replying to `message_id`.
    pub fn reply_to(message_id: Option<i64>) -> Self {
        Self { reply_to: message_id, ..Self::default() }
    }
}

/// Upload payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Bytes.
    pub data: Bytes,
    /// File name presented to Network B.
    pub file_name: String,
}

/// Upload primitive to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForumMedia {
    /// `sendPhoto`.
    Photo,
    /// `sendVideo`.
    Video {
        /// Seconds.
        duration: u32,
    },
    /// `sendVideoNote` (no caption).
    VideoNote {
        /// Seconds.
        duration: u32,
    },
    /// `sendAnimation`.
    Animation,
    /// `sendAudio`.
    Audio {
        /// Seconds.
        duration: u32,
    },
    /// `sendVoice`.
    Voice {
        /// Seconds.
        duration: u32,
    },
    /// `sendDocument`.
    Document,
    /// `sendSticker` (no caption).
    Sticker,
}

impl ForumMedia {
    /// Whether the primitive accepts a caption.
    pub fn accepts_caption(self) -> bool {
        !matches!(self, Self::VideoNote { .. } | Self::Sticker)
    }
}

/// Operation on Network B.
#[derive(Debug, Clone, PartialEq)]
pub enum ForumRequest {
    /// `sendMessage`.
    SendMessage {
        /// Chat.
        chat_id: i64,
        /// Topic.
        thread_id: i64,
        /// Body.
        text: String,
        /// Shared options.
        options: SendOptions,
    },
    /// Any upload primitive.
    SendMedia {
        /// Chat.
        chat_id: i64,
        /// Topic.
        thread_id: i64,
        /// Primitive.
        kind: ForumMedia,
        /// Payload.
        file: InputFile,
        /// Caption (ignored by primitives without one).
        caption: Option<String>,
        /// Blur until tapped.
        spoiler: bool,
        /// Shared options.
        options: SendOptions,
    },
    /// `sendContact`.
    SendContact {
        /// Chat.
        chat_id: i64,
        /// Topic.
        thread_id: i64,
        /// Phone number.
        phone_number: String,
        /// Display name.
        first_name: String,
        /// Raw vCard.
        vcard: String,
        /// Shared options.
        options: SendOptions,
    },
    /// `sendLocation`.
    SendLocation {
        /// Chat.
        chat_id: i64,
        /// Topic.
        thread_id: i64,
        /// Degrees.
        latitude: f64,
        /// Degrees.
        longitude: f64,
        /// Metres.
        horizontal_accuracy: Option<f64>,
        /// Shared options.
        options: SendOptions,
    },
    /// `createForumTopic`.
    CreateForumTopic {
        /// Forum chat.
        chat_id: i64,
        /// Title.
        name: String,
    },
    /// `editForumTopic`.
    EditForumTopic {
        /// Forum chat.
        chat_id: i64,
        /// Topic.
        thread_id: i64,
        /// New title.
        name: String,
    },
    /// `getFile` followed by the download.
    GetFile {
        /// File id.
        file_id: String,
    },
    /// `setMessageReaction`.
    SetReaction {
        /// Chat.
        chat_id: i64,
        /// Message.
        message_id: i64,
        /// Emoji.
        emoji: String,
    },
    /// `answerCallbackQuery`.
    AnswerCallbackQuery {
        /// Query id.
        callback_id: String,
        /// Pop-up text.
        text: String,
        /// Show as alert instead of toast.
        show_alert: bool,
    },
    /// `deleteMessage`.
    DeleteMessage {
        /// Chat.
        chat_id: i64,
        /// Message.
        message_id: i64,
    },
}

impl ForumRequest {
    /// Bot API method name, for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "sendMessage",
            Self::SendMedia { kind, .. } => match kind {
                ForumMedia::Photo => "sendPhoto",
                ForumMedia::Video { .. } => "sendVideo",
                ForumMedia::VideoNote { .. } => "sendVideoNote",
                ForumMedia::Animation => "sendAnimation",
                ForumMedia::Audio { .. } => "sendAudio",
                ForumMedia::Voice { .. } => "sendVoice",
                ForumMedia::Document => "sendDocument",
                ForumMedia::Sticker => "sendSticker",
            },
            Self::SendContact { .. } => "sendContact",
            Self::SendLocation { .. } => "sendLocation",
            Self::CreateForumTopic { .. } => "createForumTopic",
            Self::EditForumTopic { .. } => "editForumTopic",
            Self::GetFile { .. } => "getFile",
            Self::SetReaction { .. } => "setMessageReaction",
            Self::AnswerCallbackQuery { .. } => "answerCallbackQuery",
            Self::DeleteMessage { .. } => "deleteMessage",
        }
    }

    /// Send options, for requests that post a message.
    pub fn options_mut(&mut self) -> Option<&mut SendOptions> {
        match self {
            Self::SendMessage { options, .. }
            | Self::SendMedia { options, .. }
            | Self::SendContact { options, .. }
            | Self::SendLocation { options, .. } => Some(options),
            _ => None,
        }
    }

    /// Whether the body/caption is formatted text.
    pub fn carries_text(&self) -> bool {
        match self {
            Self::SendMessage { .. } => true,
            Self::SendMedia { kind, caption, .. } => kind.accepts_caption() && caption.is_some(),
            _ => false,
        }
    }
}

/// Result of a [`ForumRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumResponse {
    /// A message was posted.
    Message {
        /// New message id.
        message_id: i64,
    },
    /// A topic was created.
    Topic {
        /// New thread id.
        thread_id: i64,
    },
    /// File contents.
    File {
        /// Bytes.
        data: Bytes,
    },
    /// Acknowledged with no payload.
    Done,
}

impl ForumResponse {
    /// Posted message id, if the response carries one.
    pub fn message_id(&self) -> Option<i64> {
        match self {
            Self::Message { message_id } => Some(*message_id),
            _ => None,
        }
    }

    /// Created thread id, if the response carries one.
    pub fn thread_id(&self) -> Option<i64> {
        match self {
            Self::Topic { thread_id } => Some(*thread_id),
            _ => None,
        }
    }
}
