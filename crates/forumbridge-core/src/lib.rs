//! Shared plumbing for the forum bridge.
//!
//! Nothing in here talks to a network directly. The engine is written
//! against these seams so that production clients and simulation doubles are
//! interchangeable:
//!
//! - [`env::Environment`]: time and sleeping
//! - [`api::SourceApi`] / [`api::ForumApi`]: the two network clients
//! - [`config::Config`]: operator configuration
//! - [`format`]: HTML escaping, truncation and header composition
//! - [`emoji`]: single-emoji detection for the reaction shortcut

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod emoji;
pub mod env;
pub mod error;
pub mod format;

pub use api::{ForumApi, MediaTranscoder, NoTranscoder, PairingDisplay, SourceApi};
pub use config::{Config, ConfirmationType, DatabaseConfig};
pub use env::Environment;
pub use error::{ApiError, ConfigError, TranscodeError};
