//! Forum bridge operator CLI.
//!
//! Maintenance commands against the configured Identity Store. The bridge
//! itself is embedded by a binary that links the two network clients and
//! runs [`forumbridge_engine::Engine`].
//!
//! # Usage
//!
//! ```bash
//! # Validate config.toml
//! forumbridge --config config.toml check-config
//!
//! # Row counts per table
//! forumbridge stats
//!
//! # Forget every bridged message
//! forumbridge clear-pairs
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use forumbridge_core::{Config, DatabaseConfig};
use forumbridge_engine::{MemoryStorage, RedbStorage, Storage, StorageError, logging};

/// Forum bridge maintenance tool
#[derive(Parser, Debug)]
#[command(name = "forumbridge")]
#[command(about = "Maintenance commands for the forum bridge")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Cmd {
    /// Validate the configuration and open the store
    CheckConfig,
    /// Print row counts per table
    Stats,
    /// Delete every message pair
    ClearPairs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    let config = Config::load(&args.config)?;
    tracing::info!(
        path = %args.config.display(),
        database = config.database.kind(),
        target_chat = config.telegram.target_chat_id,
        "configuration valid"
    );
    match &config.database {
        DatabaseConfig::Redb { path } => execute(&RedbStorage::open(path)?, args.command)?,
        DatabaseConfig::Memory => execute(&MemoryStorage::new(), args.command)?,
        other => return Err(StorageError::Unsupported(other.kind()).into()),
    }
    Ok(())
}

fn execute<S: Storage>(store: &S, command: Cmd) -> Result<(), StorageError> {
    tracing::info!(schema_version = store.schema_version()?, "identity store open");
    match command {
        Cmd::CheckConfig => {},
        Cmd::Stats => {
            let stats = store.stats()?;
            println!("message pairs:   {}", stats.message_pairs);
            println!("chat threads:    {}", stats.chat_threads);
            println!("contacts:        {}", stats.contacts);
            println!("ephemeral chats: {}", stats.ephemeral_chats);
        },
        Cmd::ClearPairs => {
            let removed = store.delete_all_msg_pairs()?;
            tracing::info!(removed, "message pairs cleared");
        },
    }
    Ok(())
}
