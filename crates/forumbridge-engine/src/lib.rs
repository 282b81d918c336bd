//! Forum bridge engine.
//!
//! Bridges a Network-A account (one-to-one chats, groups, status updates)
//! into a Network-B forum chat, one forum topic per conversation, and sends
//! the operator's replies back.
//!
//! # Architecture
//!
//! The engine is written against the client seams in [`forumbridge_core`];
//! it never performs network I/O itself. [`Engine`] reads both event
//! streams and hands each event to a translator on the queue for its
//! conversation:
//!
//! - [`inbound`]: Network A → forum posts (A→B translator)
//! - [`outbound`]: operator posts → Network A (B→A translator)
//! - [`commands`]: slash commands and inline buttons
//!
//! Both translators share a [`Bridge`]: the Identity Store ([`storage`]),
//! the name resolver ([`names`]), the topic allocator ([`topics`]) and the
//! decorated Network-B client ([`pipeline`]).
//!
//! # Components
//!
//! - [`Storage`]: Identity Store trait, with [`MemoryStorage`],
//!   [`RedbStorage`] and the fault-injecting [`ChaoticStorage`]
//! - [`Bridge`]: shared handler context
//! - [`Engine`]: lifecycle and dispatch
//! - [`SystemEnv`]: production environment (system clock, tokio timers)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
mod context;
mod engine;
mod error;
pub mod inbound;
mod locks;
pub mod logging;
pub mod names;
pub mod outbound;
mod outcome;
pub mod pipeline;
mod queues;
pub mod storage;
mod system_env;
pub mod topics;

pub use commands::Command;
pub use context::Bridge;
pub use engine::{Engine, Phase};
pub use error::BridgeError;
pub use locks::KeyedLocks;
pub use outcome::{DropReason, Outcome};
pub use pipeline::{ForumPipeline, RequestLayer};
pub use queues::{ConversationQueues, Job};
pub use storage::{
    ChaoticStorage, ChatThreadPair, ContactName, EphemeralSettings, MemoryStorage, MessagePair,
    RedbStorage, Storage, StorageError, StoreStats,
};
pub use system_env::SystemEnv;
