//! Network-A event catalogue.
//!
//! The Network-A client delivers a heterogeneous stream; it is modelled as
//! the sum type [`SourceEvent`] and matched exhaustively by the engine.
//! Message payloads are a second sum type, [`MessageContent`], one variant
//! per media kind.

use crate::Jid;

/// Events emitted by the Network-A client.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// New message (any kind, including protocol frames for edits/revokes).
    Message(Box<SourceMessage>),
    /// Delivery/read receipt.
    Receipt(Receipt),
    /// Group or user profile picture changed or removed.
    Picture(PictureChange),
    /// Group metadata change.
    GroupInfo(Box<GroupInfoChange>),
    /// Contact changed their push name.
    PushName(PushNameChange),
    /// Contact changed their about text.
    UserAbout(UserAbout),
    /// Incoming call.
    CallOffer(CallOffer),
    /// Session was terminated by the network.
    LoggedOut(LoggedOut),
}

/// Conversation key for the call log, which has no Network-A chat.
pub const CALLS_KEY: &str = "calls";

impl SourceEvent {
    /// Key used to serialise handlers of the same conversation.
    ///
    /// Returns `None` for events that are not tied to a conversation.
    pub fn conversation_key(&self) -> Option<String> {
        match self {
            Self::Message(message) => Some(message.info.chat.to_non_device().to_string()),
            Self::Receipt(receipt) => Some(receipt.chat.to_non_device().to_string()),
            Self::Picture(change) => Some(change.jid.to_non_device().to_string()),
            Self::GroupInfo(change) => Some(change.jid.to_non_device().to_string()),
            Self::PushName(change) => Some(change.jid.to_non_device().to_string()),
            Self::UserAbout(about) => Some(about.jid.to_non_device().to_string()),
            Self::CallOffer(_) => Some(CALLS_KEY.to_string()),
            Self::LoggedOut(_) => None,
        }
    }

    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Receipt(_) => "receipt",
            Self::Picture(_) => "picture",
            Self::GroupInfo(_) => "group_info",
            Self::PushName(_) => "push_name",
            Self::UserAbout(_) => "user_about",
            Self::CallOffer(_) => "call_offer",
            Self::LoggedOut(_) => "logged_out",
        }
    }
}

/// Envelope metadata for a Network-A message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    /// Stable message id (stanza id).
    pub id: String,
    /// Conversation the message belongs to.
    pub chat: Jid,
    /// Author (may carry a device suffix).
    pub sender: Jid,
    /// Sent by the operator's own account (possibly from another device).
    pub is_from_me: bool,
    /// Sender's self-chosen display name.
    pub push_name: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// Owner of the broadcast list this message was sent through.
    pub broadcast_list_owner: Option<Jid>,
}

impl MessageInfo {
    /// Whether the conversation is a group.
    pub fn is_group(&self) -> bool {
        self.chat.is_group()
    }
}

/// A complete Network-A message.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    /// Envelope.
    pub info: MessageInfo,
    /// Payload.
    pub content: MessageContent,
}

/// Reply/mention/forward metadata attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextInfo {
    /// Id of the quoted message, if this is a reply.
    pub stanza_id: Option<String>,
    /// Author of the quoted message.
    pub participant: Option<Jid>,
    /// Users mentioned in the text.
    pub mentioned: Vec<Jid>,
    /// Message was forwarded.
    pub is_forwarded: bool,
    /// Disappearing-message timer in force when sent.
    pub expiration: Option<u32>,
}

/// Identity of a message for reactions, edits and revokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    /// Conversation.
    pub chat: Jid,
    /// Message id.
    pub id: String,
    /// Sent by the operator.
    pub from_me: bool,
    /// Author in group conversations.
    pub participant: Option<Jid>,
}

/// Handle the client needs to download a media blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Opaque download path.
    pub direct_path: String,
    /// MIME type reported by the sender.
    pub mime_type: String,
    /// Declared size in bytes.
    pub file_length: u64,
}

/// Common payload of every downloadable message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMessage {
    /// Blob handle.
    pub media: MediaRef,
    /// Caption (empty if none).
    pub caption: String,
    /// Reply/mention metadata.
    pub context: Option<ContextInfo>,
    /// Sender asked for the media to be viewed once.
    pub view_once: bool,
    /// Duration for audio/video, `0` otherwise.
    pub seconds: u32,
    /// Original file name (documents).
    pub file_name: Option<String>,
}

/// A single shared contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactCard {
    /// Name shown by the sender.
    pub display_name: String,
    /// Raw vCard text.
    pub vcard: String,
}

/// Poll creation message (all three wire versions share this shape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    /// Wire version (1, 2 or 3).
    pub version: u8,
    /// Question text.
    pub question: String,
    /// How many options a voter may pick (`0` means any).
    pub selectable_count: u32,
    /// Option labels.
    pub options: Vec<String>,
    /// Reply/mention metadata.
    pub context: Option<ContextInfo>,
}

/// Protocol frames carried inside a message.
#[derive(Debug, Clone)]
pub enum ProtocolMessage {
    /// Message was deleted for everyone.
    Revoke {
        /// Revoked message.
        key: MessageKey,
    },
    /// Message was edited.
    Edit {
        /// Edited message.
        key: MessageKey,
        /// Replacement content.
        content: Box<MessageContent>,
    },
    /// Disappearing-message timer changed.
    EphemeralSetting {
        /// New timer, `0` disables.
        expiration_secs: u32,
    },
}

/// Message payload, one variant per kind.
#[derive(Debug, Clone)]
pub enum MessageContent {
    /// Plain or extended text.
    Text {
        /// Body.
        text: String,
        /// Reply/mention metadata.
        context: Option<ContextInfo>,
    },
    /// Photo.
    Image(MediaMessage),
    /// Video or GIF.
    Video {
        /// Media payload.
        media: MediaMessage,
        /// Sender marked it as an animated GIF.
        gif_playback: bool,
    },
    /// Round video note (PTV).
    VideoNote(MediaMessage),
    /// Voice note or music.
    Audio {
        /// Media payload.
        media: MediaMessage,
        /// Push-to-talk voice note.
        voice: bool,
    },
    /// Arbitrary file.
    Document(MediaMessage),
    /// Sticker.
    Sticker {
        /// Media payload (WebP).
        media: MediaMessage,
        /// Animated WebP.
        animated: bool,
        /// Avatar sticker (always animated).
        avatar: bool,
    },
    /// Single contact card.
    Contact {
        /// Card.
        card: ContactCard,
        /// Reply/mention metadata.
        context: Option<ContextInfo>,
    },
    /// Several contact cards.
    ContactsArray {
        /// Summary label.
        display_name: String,
        /// Cards.
        cards: Vec<ContactCard>,
        /// Reply/mention metadata.
        context: Option<ContextInfo>,
    },
    /// Static location pin.
    Location {
        /// Degrees.
        latitude: f64,
        /// Degrees.
        longitude: f64,
        /// Place name.
        name: String,
        /// Place address.
        address: String,
        /// Horizontal accuracy in metres.
        accuracy_meters: Option<f64>,
        /// Reply/mention metadata.
        context: Option<ContextInfo>,
    },
    /// Live location share.
    LiveLocation {
        /// Degrees.
        latitude: f64,
        /// Degrees.
        longitude: f64,
        /// Caption.
        caption: String,
        /// Reply/mention metadata.
        context: Option<ContextInfo>,
    },
    /// Poll creation.
    Poll(Poll),
    /// Reaction to another message; empty text revokes the reaction.
    Reaction {
        /// Message reacted to.
        target: MessageKey,
        /// Emoji.
        text: String,
    },
    /// Protocol frame (edit, revoke, ephemeral change).
    Protocol(ProtocolMessage),
    /// Anything the bridge does not understand.
    Unsupported {
        /// Wire type name, for logs and the placeholder notice.
        kind: String,
    },
}

/// Media kinds that can be skipped by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Photos.
    Image,
    /// Animated GIFs.
    Gif,
    /// Videos and video notes.
    Video,
    /// Voice notes.
    VoiceNote,
    /// Music and other audio.
    Audio,
    /// Files.
    Document,
    /// Stickers.
    Sticker,
    /// Contact cards.
    Contact,
    /// Location pins.
    Location,
}

impl MediaKind {
    /// Lower-case human label used in notices.
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Video => "video",
            Self::VoiceNote => "voice note",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Contact => "contact",
            Self::Location => "location",
        }
    }

    /// Config key that skips this kind.
    pub fn skip_key(self) -> &'static str {
        match self {
            Self::Image => "skip_images",
            Self::Gif => "skip_gifs",
            Self::Video => "skip_videos",
            Self::VoiceNote => "skip_voice_notes",
            Self::Audio => "skip_audios",
            Self::Document => "skip_documents",
            Self::Sticker => "skip_stickers",
            Self::Contact => "skip_contacts",
            Self::Location => "skip_locations",
        }
    }
}

impl MessageContent {
    /// Reply/mention metadata, if the kind carries any.
    pub fn context(&self) -> Option<&ContextInfo> {
        match self {
            Self::Text { context, .. }
            | Self::Contact { context, .. }
            | Self::ContactsArray { context, .. }
            | Self::Location { context, .. }
            | Self::LiveLocation { context, .. } => context.as_ref(),
            Self::Image(media)
            | Self::VideoNote(media)
            | Self::Document(media)
            | Self::Video { media, .. }
            | Self::Audio { media, .. }
            | Self::Sticker { media, .. } => media.context.as_ref(),
            Self::Poll(poll) => poll.context.as_ref(),
            Self::Reaction { .. } | Self::Protocol(_) | Self::Unsupported { .. } => None,
        }
    }

    /// Skippable media kind, `None` for text and protocol frames.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Image(_) => Some(MediaKind::Image),
            Self::Video { gif_playback: true, .. } => Some(MediaKind::Gif),
            Self::Video { .. } | Self::VideoNote(_) => Some(MediaKind::Video),
            Self::Audio { voice: true, .. } => Some(MediaKind::VoiceNote),
            Self::Audio { .. } => Some(MediaKind::Audio),
            Self::Document(_) => Some(MediaKind::Document),
            Self::Sticker { .. } => Some(MediaKind::Sticker),
            Self::Contact { .. } | Self::ContactsArray { .. } => Some(MediaKind::Contact),
            Self::Location { .. } | Self::LiveLocation { .. } => Some(MediaKind::Location),
            Self::Text { .. }
            | Self::Poll(_)
            | Self::Reaction { .. }
            | Self::Protocol(_)
            | Self::Unsupported { .. } => None,
        }
    }
}

/// Kinds of receipts the client reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    /// Delivered to the recipient's device.
    Delivered,
    /// Recipient read the message.
    Read,
    /// The operator read the message on another of their devices.
    ReadSelf,
    /// Voice/video note played.
    Played,
}

/// Receipt for one or more messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Conversation.
    pub chat: Jid,
    /// Who produced the receipt.
    pub sender: Jid,
    /// Messages covered.
    pub message_ids: Vec<String>,
    /// Receipt kind.
    pub kind: ReceiptKind,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Profile picture change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureChange {
    /// User or group whose picture changed.
    pub jid: Jid,
    /// Who changed it (groups only).
    pub author: Option<Jid>,
    /// Picture was removed rather than replaced.
    pub removed: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Disappearing-message change inside a [`GroupInfoChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EphemeralChange {
    /// Disappearing messages enabled.
    pub is_ephemeral: bool,
    /// Timer in seconds.
    pub timer_secs: u32,
}

/// Group metadata change. Every field is populated independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfoChange {
    /// Group.
    pub jid: Jid,
    /// Who made the change.
    pub sender: Option<Jid>,
    /// Unix seconds.
    pub timestamp: i64,
    /// Only admins may send messages.
    pub announce: Option<bool>,
    /// Disappearing-message change.
    pub ephemeral: Option<EphemeralChange>,
    /// Group was deleted, with the reason given.
    pub delete: Option<String>,
    /// Participants who joined.
    pub join: Vec<Jid>,
    /// Participants who left or were removed.
    pub leave: Vec<Jid>,
    /// Participants promoted to admin.
    pub promote: Vec<Jid>,
    /// Participants demoted from admin.
    pub demote: Vec<Jid>,
    /// New description.
    pub topic: Option<String>,
    /// New name.
    pub name: Option<String>,
}

impl GroupInfoChange {
    /// Change with no fields populated.
    pub fn new(jid: Jid, timestamp: i64) -> Self {
        Self {
            jid,
            sender: None,
            timestamp,
            announce: None,
            ephemeral: None,
            delete: None,
            join: Vec::new(),
            leave: Vec::new(),
            promote: Vec::new(),
            demote: Vec::new(),
            topic: None,
            name: None,
        }
    }
}

/// Push name change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNameChange {
    /// User.
    pub jid: Jid,
    /// Previous push name.
    pub old_push_name: String,
    /// New push name.
    pub new_push_name: String,
}

/// About text change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAbout {
    /// User.
    pub jid: Jid,
    /// New about text.
    pub status: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Incoming call offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOffer {
    /// Caller.
    pub from: Jid,
    /// Call id.
    pub call_id: String,
    /// Video call.
    pub video: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Session terminated by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedOut {
    /// Happened while connecting rather than during a live session.
    pub on_connect: bool,
    /// Reason given by the network.
    pub reason: String,
}
