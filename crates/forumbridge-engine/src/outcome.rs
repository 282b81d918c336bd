//! Handler results that are not failures.

use std::fmt;

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Content was posted to the other network.
    Bridged,
    /// Only local state changed (read markers, disappearing settings,
    /// contact names).
    Updated,
    /// Dropped by policy; logged at INFO and otherwise silent.
    Dropped(DropReason),
}

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The message was already bridged.
    Duplicate,
    /// Sent by the operator from another device.
    OwnMessage,
    /// Chat is on the ignore list.
    IgnoredChat,
    /// Status update skipped or its sender ignored.
    StatusSkipped,
    /// Edit, revoke or reaction for a message that was never bridged.
    UnknownOriginal,
    /// The notice kind is switched off in the config.
    Disabled,
    /// Info update for a conversation without a topic.
    NoTopic,
    /// Receipt kinds other than the operator's own read receipts.
    IrrelevantReceipt,
    /// Sender is not the operator.
    Unauthorized,
    /// Message outside the target chat that is not a command.
    OutsideTargetChat,
    /// Service messages and payloads with no Network-A counterpart.
    Unsupported,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Duplicate => "duplicate",
            Self::OwnMessage => "own message",
            Self::IgnoredChat => "ignored chat",
            Self::StatusSkipped => "status skipped",
            Self::UnknownOriginal => "unknown original",
            Self::Disabled => "disabled by config",
            Self::NoTopic => "no topic",
            Self::IrrelevantReceipt => "irrelevant receipt",
            Self::Unauthorized => "unauthorized",
            Self::OutsideTargetChat => "outside target chat",
            Self::Unsupported => "unsupported",
        };
        f.write_str(reason)
    }
}
