//! Operator configuration.
//!
//! Loaded from TOML and validated once at startup. Everything except the
//! Network-B credentials and the two chat ids has a default, so a minimal
//! file is:
//!
//! ```toml
//! [telegram]
//! bot_token = "123:abc"
//! owner_id = 42
//! target_chat_id = -1001234567890
//! ```
//!
//! `time_zone` takes `UTC` or a fixed offset such as `+05:30`. Zone names
//! like `Asia/Kolkata` are rejected; daylight-saving zones must pick the
//! offset they want headers rendered in.

use std::{path::Path, time::Duration};

use chrono::{
    FixedOffset, Offset, Utc,
    format::{Item, StrftimeItems},
};
use forumbridge_proto::{Jid, MediaKind};
use serde::Deserialize;

use crate::ConfigError;

/// Default timestamp pattern.
pub const DEFAULT_TIME_FORMAT: &str = "%d %b %Y %H:%M:%S";

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `UTC` or a fixed offset `+HH:MM` / `-HH:MM`. Zone names are not
    /// accepted.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// strftime pattern for header timestamps.
    #[serde(default = "default_time_format")]
    pub time_format: String,
    /// Network-B client and routing.
    pub telegram: TelegramConfig,
    /// Network-A client and filters.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    /// Identity Store backend.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// How a successful B→A send is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationType {
    /// React on the operator's message.
    Emoji,
    /// Reply with a short text.
    Text,
}

/// `[telegram]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot credential.
    #[serde(default)]
    pub bot_token: String,
    /// Bot API endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Self-hosted API server (lifts the media size caps).
    #[serde(default)]
    pub self_hosted_api: bool,
    /// Sole authorised operator.
    #[serde(default)]
    pub owner_id: i64,
    /// Forum chat receiving all bridged content.
    #[serde(default)]
    pub target_chat_id: i64,
    /// Post a notice for Network-A reactions.
    #[serde(default = "yes")]
    pub reactions: bool,
    /// Acknowledgement for B→A sends.
    #[serde(default = "default_confirmation")]
    pub confirmation_type: ConfirmationType,
}

/// `[whatsapp.login_database]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoginDatabase {
    /// Backend name understood by the Network-A client.
    #[serde(rename = "type", default = "default_login_type")]
    pub kind: String,
    /// Connection string or path.
    #[serde(default = "default_login_url")]
    pub url: String,
}

impl Default for LoginDatabase {
    fn default() -> Self {
        Self { kind: default_login_type(), url: default_login_url() }
    }
}

/// `[whatsapp]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools)]
pub struct WhatsAppConfig {
    /// Label on the linked-devices list.
    pub session_name: String,
    /// Where the Network-A session is persisted.
    pub login_database: LoginDatabase,
    /// Drop the status feed entirely.
    pub skip_status: bool,
    /// Skip photos.
    pub skip_images: bool,
    /// Skip GIFs.
    pub skip_gifs: bool,
    /// Skip videos and video notes.
    pub skip_videos: bool,
    /// Skip voice notes.
    pub skip_voice_notes: bool,
    /// Skip music and other audio.
    pub skip_audios: bool,
    /// Skip files.
    pub skip_documents: bool,
    /// Skip stickers.
    pub skip_stickers: bool,
    /// Skip contact cards.
    pub skip_contacts: bool,
    /// Skip location pins.
    pub skip_locations: bool,
    /// Omit the chat label line from headers.
    pub skip_chat_details: bool,
    /// Silence profile picture notices.
    pub skip_profile_picture_updates: bool,
    /// Silence group setting notices.
    pub skip_group_settings_updates: bool,
    /// User portions of chats to drop.
    pub ignore_chats: Vec<String>,
    /// User portions whose status posts are dropped.
    pub status_ignored_chats: Vec<String>,
    /// Group user portions where `@all` mentions everyone.
    pub tag_all_allowed_groups: Vec<String>,
    /// Bridge messages the operator sent from other devices.
    pub send_my_messages_from_other_devices: bool,
    /// Create topics for info-only events in unbound conversations.
    pub create_thread_for_info_updates: bool,
    /// Post a notice when a bridged message is deleted.
    pub send_revoked_message_updates: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            session_name: "forumbridge".into(),
            login_database: LoginDatabase::default(),
            skip_status: false,
            skip_images: false,
            skip_gifs: false,
            skip_videos: false,
            skip_voice_notes: false,
            skip_audios: false,
            skip_documents: false,
            skip_stickers: false,
            skip_contacts: false,
            skip_locations: false,
            skip_chat_details: false,
            skip_profile_picture_updates: false,
            skip_group_settings_updates: false,
            ignore_chats: Vec::new(),
            status_ignored_chats: Vec::new(),
            tag_all_allowed_groups: Vec::new(),
            send_my_messages_from_other_devices: false,
            create_thread_for_info_updates: false,
            send_revoked_message_updates: true,
        }
    }
}

impl WhatsAppConfig {
    /// Whether `kind` is configured to be skipped.
    pub fn skips(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.skip_images,
            MediaKind::Gif => self.skip_gifs,
            MediaKind::Video => self.skip_videos,
            MediaKind::VoiceNote => self.skip_voice_notes,
            MediaKind::Audio => self.skip_audios,
            MediaKind::Document => self.skip_documents,
            MediaKind::Sticker => self.skip_stickers,
            MediaKind::Contact => self.skip_contacts,
            MediaKind::Location => self.skip_locations,
        }
    }

    /// Whether the conversation is on the ignore list.
    pub fn ignores_chat(&self, chat: &Jid) -> bool {
        self.ignore_chats.iter().any(|user| user == chat.user_part())
    }

    /// Whether status posts from `sender` are dropped.
    pub fn ignores_status_from(&self, sender: &Jid) -> bool {
        self.skip_status || self.status_ignored_chats.iter().any(|user| user == sender.user_part())
    }

    /// Whether `@all` is honoured in `group`.
    pub fn allows_tag_all(&self, group: &Jid) -> bool {
        self.tag_all_allowed_groups.iter().any(|user| user == group.user_part())
    }
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// SQLite file.
    Sqlite {
        /// Database file.
        #[serde(default)]
        path: String,
    },
    /// PostgreSQL server.
    Postgres {
        /// Host.
        #[serde(default)]
        host: String,
        /// User.
        #[serde(default)]
        user: String,
        /// Password.
        #[serde(default)]
        password: String,
        /// Database name.
        #[serde(default)]
        dbname: String,
        /// Port.
        #[serde(default)]
        port: u16,
        /// Session time zone.
        #[serde(default)]
        time_zone: String,
    },
    /// MySQL server.
    Mysql {
        /// Host.
        #[serde(default)]
        host: String,
        /// User.
        #[serde(default)]
        user: String,
        /// Password.
        #[serde(default)]
        password: String,
        /// Database name.
        #[serde(default)]
        dbname: String,
        /// Port.
        #[serde(default)]
        port: u16,
    },
    /// Embedded redb file.
    Redb {
        /// Database file.
        #[serde(default)]
        path: String,
    },
    /// In-process only; lost on restart.
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Redb { path: "forumbridge.redb".into() }
    }
}

impl DatabaseConfig {
    /// Backend name as written in the config.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::Postgres { .. } => "postgres",
            Self::Mysql { .. } => "mysql",
            Self::Redb { .. } => "redb",
            Self::Memory => "memory",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Sqlite { path } | Self::Redb { path } => require(path, "database.path"),
            Self::Postgres { host, user, password, dbname, port, time_zone } => {
                require(host, "database.host")?;
                require(user, "database.user")?;
                require(password, "database.password")?;
                require(dbname, "database.dbname")?;
                require_port(*port)?;
                require(time_zone, "database.time_zone")
            },
            Self::Mysql { host, user, password, dbname, port } => {
                require(host, "database.host")?;
                require(user, "database.user")?;
                require(password, "database.password")?;
                require(dbname, "database.dbname")?;
                require_port(*port)
            },
            Self::Memory => Ok(()),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How long shutdown waits for in-flight handlers before cancelling.
    pub shutdown_grace_secs: u64,
    /// Retries of a single request after rate-limit responses.
    pub max_rate_limit_retries: u32,
    /// Unfinished events per conversation before a backlog warning is
    /// logged. Intake never waits on a busy conversation.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { shutdown_grace_secs: 10, max_rate_limit_retries: 5, queue_capacity: 256 }
    }
}

impl EngineConfig {
    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Config {
    /// Minimal valid configuration; the rest takes defaults.
    pub fn new(bot_token: impl Into<String>, owner_id: i64, target_chat_id: i64) -> Self {
        Self {
            time_zone: default_time_zone(),
            time_format: default_time_format(),
            telegram: TelegramConfig {
                bot_token: bot_token.into(),
                api_url: default_api_url(),
                self_hosted_api: false,
                owner_id,
                target_chat_id,
                reactions: true,
                confirmation_type: ConfirmationType::Emoji,
            },
            whatsapp: WhatsAppConfig::default(),
            database: DatabaseConfig::Memory,
            engine: EngineConfig::default(),
        }
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_toml_str(&text)
    }

    /// Check required keys and value sets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.telegram.bot_token, "telegram.bot_token")?;
        if self.telegram.owner_id == 0 {
            return Err(ConfigError::Missing("telegram.owner_id"));
        }
        if self.telegram.target_chat_id == 0 {
            return Err(ConfigError::Missing("telegram.target_chat_id"));
        }
        parse_time_zone(&self.time_zone)?;
        if StrftimeItems::new(&self.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid {
                key: "time_format",
                reason: format!("not a strftime pattern: {:?}", self.time_format),
            });
        }
        require(&self.whatsapp.login_database.url, "whatsapp.login_database.url")?;
        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "engine.queue_capacity",
                reason: "must be at least 1".into(),
            });
        }
        self.database.validate()
    }

    /// Offset used when rendering timestamps.
    pub fn time_offset(&self) -> FixedOffset {
        parse_time_zone(&self.time_zone).unwrap_or_else(|_| utc())
    }

    /// Media size caps in bytes, `None` when self-hosted.
    pub fn upload_limit(&self) -> Option<u64> {
        (!self.telegram.self_hosted_api).then_some(UPLOAD_LIMIT)
    }

    /// Largest file the bot may download, `None` when self-hosted.
    pub fn download_limit(&self) -> Option<u64> {
        (!self.telegram.self_hosted_api).then_some(DOWNLOAD_LIMIT)
    }
}

/// Largest upload accepted by the hosted bot API.
pub const UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;

/// Largest download served by the hosted bot API.
pub const DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

/// Parse `UTC` or `±HH:MM`.
pub fn parse_time_zone(zone: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "time_zone",
        reason: format!(
            "expected UTC or a fixed offset like +05:30 (zone names are not supported), got {zone:?}"
        ),
    };

    let zone = zone.trim();
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return Ok(utc());
    }

    let (sign, rest) = match zone.as_bytes().first() {
        Some(b'+') => (1, &zone[1..]),
        Some(b'-') => (-1, &zone[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn require(value: &str, key: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() { Err(ConfigError::Missing(key)) } else { Ok(()) }
}

fn require_port(port: u16) -> Result<(), ConfigError> {
    if port == 0 { Err(ConfigError::Missing("database.port")) } else { Ok(()) }
}

fn default_time_zone() -> String {
    "UTC".into()
}

fn default_time_format() -> String {
    DEFAULT_TIME_FORMAT.into()
}

fn default_api_url() -> String {
    "https://api.telegram.org".into()
}

fn default_confirmation() -> ConfirmationType {
    ConfirmationType::Emoji
}

fn default_login_type() -> String {
    "sqlite3".into()
}

fn default_login_url() -> String {
    "file:wawebstore.db?_foreign_keys=on".into()
}

fn yes() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "123:abc"
        owner_id = 42
        target_chat_id = -1001
    "#;

    #[test]
    fn minimal_file_takes_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.time_zone, "UTC");
        assert_eq!(config.telegram.confirmation_type, ConfirmationType::Emoji);
        assert!(config.telegram.reactions);
        assert!(config.whatsapp.send_revoked_message_updates);
        assert_eq!(config.database, DatabaseConfig::Redb { path: "forumbridge.redb".into() });
        assert_eq!(config.engine.max_rate_limit_retries, 5);
        assert_eq!(config.upload_limit(), Some(UPLOAD_LIMIT));
    }

    #[test]
    fn missing_owner_is_rejected() {
        let text = r#"
            [telegram]
            bot_token = "123:abc"
            target_chat_id = -1001
        "#;
        assert!(matches!(
            Config::from_toml_str(text),
            Err(ConfigError::Missing("telegram.owner_id"))
        ));
    }

    #[test]
    fn unknown_confirmation_type_is_rejected() {
        let text = format!("{MINIMAL}\nconfirmation_type = \"carrier-pigeon\"");
        assert!(matches!(Config::from_toml_str(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn postgres_requires_every_key() {
        let text = format!(
            "{MINIMAL}\n[database]\ntype = \"postgres\"\nhost = \"db\"\nuser = \"u\"\n\
             password = \"p\"\ndbname = \"bridge\"\nport = 5432\n"
        );
        assert!(matches!(
            Config::from_toml_str(&text),
            Err(ConfigError::Missing("database.time_zone"))
        ));

        let text = format!("{text}time_zone = \"UTC\"\n");
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.database.kind(), "postgres");
    }

    #[test]
    fn sqlite_requires_path() {
        let text = format!("{MINIMAL}\n[database]\ntype = \"sqlite\"\n");
        assert!(matches!(
            Config::from_toml_str(&text),
            Err(ConfigError::Missing("database.path"))
        ));
    }

    #[test]
    fn time_zone_offsets() {
        assert_eq!(parse_time_zone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_time_zone("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_time_zone("-03:00").unwrap().local_minus_utc(), -10_800);
        assert!(parse_time_zone("Asia/Kolkata").is_err());
        assert!(parse_time_zone("+25:00").is_err());
    }

    #[test]
    fn zone_names_are_rejected_with_the_accepted_forms() {
        let text = format!("time_zone = \"Asia/Kolkata\"\n{MINIMAL}");
        let err = Config::from_toml_str(&text).unwrap_err();

        assert!(
            matches!(
                &err,
                ConfigError::Invalid { key: "time_zone", reason }
                    if reason.contains("+05:30") && reason.contains("Asia/Kolkata")
            ),
            "{err:?}"
        );
    }

    #[test]
    fn bad_time_format_is_rejected() {
        let text = format!("time_format = \"%Q\"\n{MINIMAL}");
        assert!(matches!(
            Config::from_toml_str(&text),
            Err(ConfigError::Invalid { key: "time_format", .. })
        ));
    }

    #[test]
    fn skip_flags_map_to_media_kinds() {
        let mut config = Config::new("t", 1, 2);
        config.whatsapp.skip_voice_notes = true;
        assert!(config.whatsapp.skips(MediaKind::VoiceNote));
        assert!(!config.whatsapp.skips(MediaKind::Audio));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.telegram.owner_id, 42);

        let missing = Config::load("/nonexistent/forumbridge.toml");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
