//! Engine error taxonomy.
//!
//! Every event handler is an isolated failure domain. A handler returns
//! [`BridgeError`] to the engine loop, which logs it and, when the variant
//! is reportable, posts a notice to the operator. Policy decisions are not
//! errors; see [`crate::Outcome`].

use forumbridge_core::ApiError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that abort a single event handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A network client call failed.
    ///
    /// Rate limits are retried by the request pipeline and only surface
    /// here once retries are exhausted. The event is not retried.
    #[error("transport error: {0}")]
    Transport(#[from] ApiError),

    /// The Identity Store failed.
    ///
    /// The event is not marked processed, so a redelivery after restart
    /// is bridged again.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No mapping for the operator's message, or input that cannot be
    /// bridged (invalid JID, unsupported sticker, ...).
    ///
    /// The message is a friendly notice for the operator.
    #[error("{0}")]
    Routing(String),

    /// Sender is not the configured operator.
    #[error("unauthorized sender")]
    Unauthorized,

    /// The bridge cannot continue without operator action (logged out,
    /// pairing failed, missing configuration).
    #[error("fatal: {0}")]
    Fatal(String),

    /// The engine is shutting down; the handler stopped at a suspension
    /// point without writing partial state.
    #[error("cancelled by shutdown")]
    Cancelled,
}

impl BridgeError {
    /// Routing error with a formatted notice.
    pub fn routing(notice: impl Into<String>) -> Self {
        Self::Routing(notice.into())
    }

    /// Whether the operator should see this error in the chat.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::Unauthorized | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn silent_variants_are_not_reported() {
        assert!(!BridgeError::Unauthorized.is_reportable());
        assert!(!BridgeError::Cancelled.is_reportable());
        assert!(BridgeError::routing("no topic").is_reportable());
        assert!(BridgeError::Fatal("logged out".into()).is_reportable());
    }

    #[test]
    fn client_errors_convert() {
        let err: BridgeError =
            ApiError::RateLimited { retry_after: Duration::from_secs(3) }.into();
        assert!(matches!(err, BridgeError::Transport(ApiError::RateLimited { .. })));

        let err: BridgeError = StorageError::Io("disk full".into()).into();
        assert_eq!(err.to_string(), "storage error: I/O error: disk full");
    }

    #[test]
    fn routing_displays_notice_verbatim() {
        assert_eq!(BridgeError::routing("No topic bound").to_string(), "No topic bound");
    }
}
