//! Deterministic simulation harness for the forum bridge.
//!
//! In-memory implementations of the engine's seams: a virtual clock
//! ([`SimEnv`]), a scripted Network-A client ([`SimSource`]) and a scripted
//! bot client ([`SimForum`]) that records every request and can inject
//! failures such as 429 rate limits. [`TestBridge`] wires them to a
//! [`forumbridge_engine::Bridge`] for handler-level tests; [`TestEngine`]
//! does the same for the full engine loop.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks Identity Store properties that must hold
//! after any sequence of events. Use [`InvariantRegistry::standard()`] for
//! the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod invariants;
pub mod sim_env;
pub mod sim_forum;
pub mod sim_source;
pub mod test_bridge;

pub use invariants::{
    BindingBijection, BindingsUseTopics, Invariant, InvariantRegistry, InvariantResult,
    PairRoundTrip, StoreSnapshot, UniqueForumKeys, Violation,
};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_forum::{PostedText, SimForum};
pub use sim_source::{ReactionRecord, ReadRecord, SentRecord, SimSource};
pub use test_bridge::{RecordingPairing, TestBridge, TestBridgeBuilder, TestEngine, wait_until};
