//! What the engine sends to, and reads from, the Network-A client.

use bytes::Bytes;

use crate::Jid;

/// Message the operator sends into a Network-A conversation.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Payload.
    pub content: OutgoingContent,
    /// Message this one replies to.
    pub quote: Option<QuotedMessage>,
    /// Users mentioned in the text/caption.
    pub mentions: Vec<Jid>,
    /// Disappearing-message timer to apply.
    pub expiration_secs: Option<u32>,
}

impl OutgoingMessage {
    /// Message with no quote, mentions or timer.
    pub fn new(content: OutgoingContent) -> Self {
        Self { content, quote: None, mentions: Vec::new(), expiration_secs: None }
    }
}

/// Reply anchor on the Network-A side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedMessage {
    /// Id of the quoted message.
    pub stanza_id: String,
    /// Author of the quoted message.
    pub participant: Jid,
}

/// Outgoing payload, one variant per kind the operator can send.
#[derive(Debug, Clone)]
pub enum OutgoingContent {
    /// Text.
    Text(String),
    /// Photo.
    Image {
        /// Blob.
        data: Bytes,
        /// MIME type.
        mime_type: String,
        /// Caption.
        caption: String,
    },
    /// Video or GIF.
    Video {
        /// Blob.
        data: Bytes,
        /// MIME type.
        mime_type: String,
        /// Caption.
        caption: String,
        /// Play as looping GIF.
        gif_playback: bool,
        /// Duration.
        seconds: u32,
    },
    /// Round video note.
    VideoNote {
        /// Blob.
        data: Bytes,
        /// Duration.
        seconds: u32,
    },
    /// Voice note or music.
    Audio {
        /// Blob.
        data: Bytes,
        /// MIME type.
        mime_type: String,
        /// Push-to-talk voice note.
        voice: bool,
        /// Duration.
        seconds: u32,
    },
    /// File.
    Document {
        /// Blob.
        data: Bytes,
        /// MIME type.
        mime_type: String,
        /// File name shown to the recipient.
        file_name: String,
        /// Caption.
        caption: String,
    },
    /// Static WebP sticker.
    Sticker {
        /// Blob.
        data: Bytes,
        /// MIME type.
        mime_type: String,
    },
}

/// Result of a successful send on Network A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Id assigned to the new message.
    pub id: String,
    /// Server timestamp (unix seconds).
    pub timestamp: i64,
}

/// Group participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupParticipant {
    /// Member.
    pub jid: Jid,
    /// Admin or super-admin.
    pub is_admin: bool,
}

/// Group metadata as returned by the Network-A directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    /// Group.
    pub jid: Jid,
    /// Display name.
    pub name: String,
    /// Description.
    pub topic: String,
    /// Members.
    pub participants: Vec<GroupParticipant>,
}

/// Contact entry as returned by the Network-A directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// First name from the address book.
    pub first_name: String,
    /// Full name from the address book.
    pub full_name: String,
    /// Self-chosen name.
    pub push_name: String,
    /// Verified business name.
    pub business_name: String,
}

/// Progress of the device-pairing flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// Code to show to the operator (QR payload or link code).
    Code(String),
    /// Pairing finished; the session is persisted.
    Success {
        /// The operator's account.
        id: Jid,
    },
    /// Codes expired without being scanned.
    Timeout,
    /// Pairing failed.
    Error(String),
}
