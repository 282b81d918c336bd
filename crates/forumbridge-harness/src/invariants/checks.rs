//! Standard store invariants.

use std::collections::{HashMap, HashSet};

use forumbridge_proto::GENERAL_THREAD;

use super::{Invariant, InvariantResult, StoreSnapshot, Violation};

/// Both lookups of a stored pair return that pair.
///
/// `lookup_b_from_a ∘ lookup_a_from_b` is the identity on every bridged
/// message.
pub struct PairRoundTrip;

impl Invariant for PairRoundTrip {
    fn name(&self) -> &'static str {
        "pair_round_trip"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        for (pair, (by_a, by_b)) in state.pairs.iter().zip(&state.pair_lookups) {
            if by_a.as_ref() != Some(pair) || by_b.as_ref() != Some(pair) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "pair {}/{} looked up as {by_a:?} by A and {by_b:?} by B",
                        pair.a_chat, pair.a_msg_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No two pairs share `(b_chat, b_thread, b_msg)`.
pub struct UniqueForumKeys;

impl Invariant for UniqueForumKeys {
    fn name(&self) -> &'static str {
        "unique_forum_keys"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for pair in &state.pairs {
            if !seen.insert((pair.b_chat, pair.b_thread, pair.b_msg)) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "forum message {}/{}/{} mapped twice",
                        pair.b_chat, pair.b_thread, pair.b_msg
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Within one forum chat, conversations and topics pair up one to one.
pub struct BindingBijection;

impl Invariant for BindingBijection {
    fn name(&self) -> &'static str {
        "binding_bijection"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        let mut by_thread: HashMap<(i64, i64), &str> = HashMap::new();
        let mut by_chat: HashSet<(i64, &str)> = HashSet::new();

        for (binding, (by_a, by_b)) in state.threads.iter().zip(&state.thread_lookups) {
            let violation = |message: String| Violation { invariant: self.name(), message };

            if !by_chat.insert((binding.b_chat, binding.a_chat.as_str())) {
                return Err(violation(format!("{} bound twice", binding.a_chat)));
            }
            if let Some(other) =
                by_thread.insert((binding.b_chat, binding.b_thread), binding.a_chat.as_str())
            {
                return Err(violation(format!(
                    "topic {} bound to both {other} and {}",
                    binding.b_thread, binding.a_chat
                )));
            }
            if by_a.as_ref() != Some(binding) || by_b.as_ref() != Some(binding) {
                return Err(violation(format!(
                    "binding {} ↔ {} looked up as {by_a:?} / {by_b:?}",
                    binding.a_chat, binding.b_thread
                )));
            }
        }
        Ok(())
    }
}

/// Conversations are never bound to the General thread.
pub struct BindingsUseTopics;

impl Invariant for BindingsUseTopics {
    fn name(&self) -> &'static str {
        "bindings_use_topics"
    }

    fn check(&self, state: &StoreSnapshot) -> InvariantResult {
        match state.threads.iter().find(|binding| binding.b_thread == GENERAL_THREAD) {
            Some(binding) => Err(Violation {
                invariant: self.name(),
                message: format!("{} bound to the General thread", binding.a_chat),
            }),
            None => Ok(()),
        }
    }
}
