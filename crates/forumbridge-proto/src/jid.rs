//! Network-A identifiers.
//!
//! A JID is `user[:device]@server`. Users live on [`USER_SERVER`] (or
//! [`HIDDEN_USER_SERVER`] for privacy-masked ids), groups on
//! [`GROUP_SERVER`], broadcast lists and the status feed on
//! [`BROADCAST_SERVER`].
//!
//! Multi-device senders carry a device suffix. Everything the bridge stores
//! or looks up is keyed by the device-less form ([`Jid::to_non_device`]).

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Server for regular user accounts.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server for privacy-masked user ids.
pub const HIDDEN_USER_SERVER: &str = "lid";

/// Server for groups.
pub const GROUP_SERVER: &str = "g.us";

/// Server for broadcast lists and the status feed.
pub const BROADCAST_SERVER: &str = "broadcast";

/// User part of the status feed JID.
pub const STATUS_USER: &str = "status";

/// Network-A identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Jid {
    user: String,
    server: String,
    device: u16,
}

impl Jid {
    /// Create a device-less JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self { user: user.into(), server: server.into(), device: 0 }
    }

    /// Regular user account on [`USER_SERVER`].
    pub fn user(user: impl Into<String>) -> Self {
        Self::new(user, USER_SERVER)
    }

    /// Group on [`GROUP_SERVER`].
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, GROUP_SERVER)
    }

    /// The status feed (`status@broadcast`).
    pub fn status_broadcast() -> Self {
        Self::new(STATUS_USER, BROADCAST_SERVER)
    }

    /// Same JID with a device suffix.
    #[must_use]
    pub fn with_device(mut self, device: u16) -> Self {
        self.device = device;
        self
    }

    /// Parse `user[.agent][:device]@server`.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let input = input.trim();
        let (user_part, server) =
            input.rsplit_once('@').ok_or_else(|| ProtocolError::InvalidJid(input.to_string()))?;

        if server.is_empty() || server.contains(char::is_whitespace) {
            return Err(ProtocolError::InvalidJid(input.to_string()));
        }

        let (user_agent, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device =
                    device.parse::<u16>().map_err(|_| ProtocolError::InvalidJid(input.to_string()))?;
                (user, device)
            },
            None => (user_part, 0),
        };

        // Agent suffix only appears on user accounts ("123.0:4@s.whatsapp.net")
        let user = match user_agent.split_once('.') {
            Some((user, agent))
                if server == USER_SERVER && agent.chars().all(|c| c.is_ascii_digit()) =>
            {
                user
            },
            _ => user_agent,
        };

        if user.is_empty() || user.contains(char::is_whitespace) {
            return Err(ProtocolError::InvalidJid(input.to_string()));
        }

        Ok(Self { user: user.to_string(), server: server.to_string(), device })
    }

    /// User portion (phone number, group id, or `status`).
    pub fn user_part(&self) -> &str {
        &self.user
    }

    /// Server portion.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Device number, `0` for the primary device or non-user JIDs.
    pub fn device(&self) -> u16 {
        self.device
    }

    /// Device-less form used as the canonical key for storage and lookups.
    #[must_use]
    pub fn to_non_device(&self) -> Self {
        Self { user: self.user.clone(), server: self.server.clone(), device: 0 }
    }

    /// Whether this is a group conversation.
    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// Whether this is a broadcast list or the status feed.
    pub fn is_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER
    }

    /// Whether this is the status feed.
    pub fn is_status_broadcast(&self) -> bool {
        self.is_broadcast() && self.user == STATUS_USER
    }

    /// Whether this identifies a single user account.
    pub fn is_user(&self) -> bool {
        self.server == USER_SERVER || self.server == HIDDEN_USER_SERVER
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl FromStr for Jid {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
