//! Topic Allocator.
//!
//! Each Network-A conversation gets one forum topic in the target chat.
//! The binding is created on first use under a per-`(b_chat, a_chat)` lock,
//! so concurrent first messages create a single topic, and the row is only
//! written after the topic exists.

use forumbridge_core::Environment;
use forumbridge_proto::{CALLS_KEY, Jid};

use crate::{
    context::Bridge,
    error::BridgeError,
    storage::{ChatThreadPair, Storage},
};

/// Binding key for status updates.
pub const STATUS_KEY: &str = "status@broadcast";

/// Binding key for the mentions digest.
pub const MENTIONS_KEY: &str = "mentions";

/// Longest topic title Network B accepts.
pub const TITLE_LIMIT: usize = 128;

/// Fixed title for a reserved binding key.
pub fn reserved_title(a_chat: &str) -> Option<&'static str> {
    match a_chat {
        STATUS_KEY => Some("Status"),
        CALLS_KEY => Some("Calls"),
        MENTIONS_KEY => Some("Mentions"),
        _ => None,
    }
}

/// Whether `a_chat` is a reserved key rather than a conversation.
pub fn is_reserved(a_chat: &str) -> bool {
    matches!(a_chat, CALLS_KEY | MENTIONS_KEY)
}

pub(crate) fn clamp_title(title: &str) -> String {
    let title = title.trim();
    let title = if title.is_empty() { "Unknown" } else { title };
    title.chars().take(TITLE_LIMIT).collect()
}

impl<E: Environment, S: Storage> Bridge<E, S> {
    /// Thread bound to `a_chat`, creating the topic on first use.
    ///
    /// Reserved keys ignore `proposed_title` and use their fixed title.
    pub async fn ensure_thread(
        &self,
        a_chat: &str,
        proposed_title: &str,
    ) -> Result<i64, BridgeError> {
        let b_chat = self.target_chat();
        let _guard = self.topic_locks.lock(&format!("{b_chat}:{a_chat}")).await;

        if let Some(pair) = self.store.chat_thread_by_a(a_chat, b_chat)? {
            return Ok(pair.b_thread);
        }

        let title = clamp_title(reserved_title(a_chat).unwrap_or(proposed_title));
        let b_thread = self.forum.create_topic(b_chat, &title).await?;
        self.store.record_chat_thread(&ChatThreadPair {
            a_chat: a_chat.to_string(),
            b_chat,
            b_thread,
        })?;

        tracing::info!(a_chat, b_thread, title = %title, "topic created");
        Ok(b_thread)
    }

    /// Thread for a Network-A conversation, titled after the contact or
    /// group when it has to be created.
    ///
    /// The title is only resolved on a miss, so bound conversations cost a
    /// single store read.
    pub async fn ensure_conversation_thread(&self, chat: &Jid) -> Result<i64, BridgeError> {
        let chat = chat.to_non_device();
        let key = chat.to_string();
        if let Some(b_thread) = self.existing_thread(&key)? {
            return Ok(b_thread);
        }
        let title = self.conversation_title(&chat).await?;
        self.ensure_thread(&key, &title).await
    }

    /// Thread bound to `a_chat`, if any. Never creates a topic.
    pub fn existing_thread(&self, a_chat: &str) -> Result<Option<i64>, BridgeError> {
        Ok(self.store.chat_thread_by_a(a_chat, self.target_chat())?.map(|pair| pair.b_thread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_have_fixed_titles() {
        assert_eq!(reserved_title("status@broadcast"), Some("Status"));
        assert_eq!(reserved_title("calls"), Some("Calls"));
        assert_eq!(reserved_title("mentions"), Some("Mentions"));
        assert_eq!(reserved_title("447700900123@s.whatsapp.net"), None);
    }

    #[test]
    fn titles_are_clamped() {
        assert_eq!(clamp_title("  "), "Unknown");
        assert_eq!(clamp_title(&"é".repeat(200)).chars().count(), TITLE_LIMIT);
    }
}
