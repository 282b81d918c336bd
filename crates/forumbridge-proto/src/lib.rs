//! Typed domain model for the forum bridge.
//!
//! Both networks are modelled here without any I/O:
//!
//! - [`Jid`]: Network-A identifiers (`user@server`)
//! - [`SourceEvent`]: the Network-A event catalogue consumed by the engine
//! - [`OutgoingMessage`]: what the engine asks the Network-A client to send
//! - [`ForumUpdate`] / [`ForumRequest`] / [`ForumResponse`]: the Network-B
//!   bot surface (updates in, requests out)
//! - [`vcard`]: the small subset of vCard 3.0 needed for contact cards

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod forum;
pub mod jid;
pub mod outgoing;
pub mod source;
pub mod vcard;

pub use errors::ProtocolError;
pub use forum::{
    CallbackQuery, FileRef, ForumContent, ForumMedia, ForumMessage, ForumRequest, ForumResponse,
    ForumUpdate, ForumUser, GENERAL_THREAD, InlineButton, InputFile, ParseMode, SendOptions,
};
pub use jid::Jid;
pub use outgoing::{
    DirectoryEntry, GroupParticipant, GroupSummary, OutgoingContent, OutgoingMessage,
    PairingEvent, QuotedMessage, SentMessage,
};
pub use source::{
    CallOffer, ContactCard, ContextInfo, EphemeralChange, GroupInfoChange, LoggedOut, MediaKind,
    MediaMessage, MediaRef, MessageContent, MessageInfo, MessageKey, PictureChange, Poll,
    ProtocolMessage, PushNameChange, Receipt, ReceiptKind, SourceEvent, SourceMessage, UserAbout,
    CALLS_KEY,
};
pub use vcard::{Phone, VCard};
