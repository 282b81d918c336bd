//! Protocol-level parse errors.

use thiserror::Error;

/// Errors produced while parsing identifiers and payloads from either network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// String is not a `user@server` identifier
    #[error("invalid JID: {0:?}")]
    InvalidJid(String),

    /// Contact card could not be decoded
    #[error("invalid vCard: {0}")]
    InvalidVCard(String),
}
