//! Client seams.
//!
//! The protocol clients for both networks live outside the bridge. The
//! engine holds them as `Arc<dyn SourceApi>` and `Arc<dyn ForumApi>` and
//! treats every call as a suspension point that may fail with [`ApiError`].

use async_trait::async_trait;
use bytes::Bytes;
use forumbridge_proto::{
    DirectoryEntry, ForumRequest, ForumResponse, GroupSummary, Jid, MediaRef, MessageKey,
    OutgoingMessage, PairingEvent, SentMessage,
};
use tokio::sync::mpsc;

use crate::{ApiError, TranscodeError};

/// Network-A client (action sink side; events arrive on a channel).
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Operator's own account, once paired.
    fn own_id(&self) -> Option<Jid>;

    /// Whether a saved session exists.
    async fn has_session(&self) -> bool;

    /// Start pairing a new device.
    ///
    /// The receiver yields codes to display until the flow ends with
    /// `Success`, `Timeout` or `Error`.
    async fn pairing_codes(&self) -> Result<mpsc::Receiver<PairingEvent>, ApiError>;

    /// Connect using the saved session.
    async fn connect(&self) -> Result<(), ApiError>;

    /// Drop the live session without forgetting it.
    async fn disconnect(&self);

    /// Send a message (uploading any attached media).
    async fn send_message(
        &self,
        chat: &Jid,
        message: OutgoingMessage,
    ) -> Result<SentMessage, ApiError>;

    /// React to `target` with `emoji`.
    async fn send_reaction(
        &self,
        chat: &Jid,
        target: &MessageKey,
        emoji: &str,
    ) -> Result<SentMessage, ApiError>;

    /// Delete a message the operator sent, for everyone.
    async fn revoke_message(&self, chat: &Jid, message_id: &str) -> Result<(), ApiError>;

    /// Send read receipts.
    async fn mark_read(
        &self,
        chat: &Jid,
        sender: &Jid,
        message_ids: &[String],
        timestamp: i64,
    ) -> Result<(), ApiError>;

    /// Fetch and decrypt a media blob.
    async fn download(&self, media: &MediaRef) -> Result<Bytes, ApiError>;

    /// Directory entry for a single user.
    async fn contact(&self, jid: &Jid) -> Result<Option<DirectoryEntry>, ApiError>;

    /// Every directory entry the client knows about.
    async fn all_contacts(&self) -> Result<Vec<(Jid, DirectoryEntry)>, ApiError>;

    /// Metadata for one group.
    async fn group_info(&self, jid: &Jid) -> Result<GroupSummary, ApiError>;

    /// Every group the operator is a member of.
    async fn joined_groups(&self) -> Result<Vec<GroupSummary>, ApiError>;

    /// Join a group with an invite code, returning its JID.
    async fn join_group_with_link(&self, code: &str) -> Result<Jid, ApiError>;

    /// Full-size profile picture, `None` if unset or hidden.
    async fn profile_picture(&self, jid: &Jid) -> Result<Option<Bytes>, ApiError>;
}

/// Network-B bot client.
///
/// A single request operation keeps the middleware pipeline to one
/// insertion point.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Perform one bot API call.
    async fn call(&self, request: ForumRequest) -> Result<ForumResponse, ApiError>;
}

/// Renders pairing codes for the operator (terminal QR, log line, ...).
pub trait PairingDisplay: Send + Sync {
    /// Show `code` until the next one arrives.
    fn display_pairing_code(&self, code: &str);
}

/// Pure `bytes -> bytes` media conversions.
pub trait MediaTranscoder: Send + Sync {
    /// Animated WebP sticker to GIF.
    fn animated_webp_to_gif(&self, webp: &[u8]) -> Result<Bytes, TranscodeError>;
}

/// Transcoder for builds without media tooling; every conversion fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscoder;

impl MediaTranscoder for NoTranscoder {
    fn animated_webp_to_gif(&self, _webp: &[u8]) -> Result<Bytes, TranscodeError> {
        Err(TranscodeError("no transcoder configured".into()))
    }
}
