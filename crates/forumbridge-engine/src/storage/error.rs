//! Storage error types.
//!
//! A lookup that finds no row is not an error: read operations return
//! `Ok(None)`. Only failures of the backing store surface here.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Row could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Database was written by a newer build
    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaVersion {
        /// Version recorded in the database
        found: u64,
        /// Highest version this build can migrate to
        supported: u64,
    },

    /// Backend is recognised by the config but not built in
    #[error("storage backend `{0}` is not available in this build")]
    Unsupported(&'static str),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
