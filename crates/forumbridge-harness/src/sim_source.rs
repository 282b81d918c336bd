//! Scripted Network-A client.
//!
//! Records every action the engine takes and answers queries from tables
//! the test fills in (contacts, groups, media blobs, profile pictures).

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use forumbridge_core::{ApiError, SourceApi};
use forumbridge_proto::{
    DirectoryEntry, GroupParticipant, GroupSummary, Jid, MediaRef, MessageKey, OutgoingMessage,
    PairingEvent, SentMessage,
};
use tokio::sync::mpsc;

/// A message the engine sent.
#[derive(Debug, Clone)]
pub struct SentRecord {
    /// Destination chat.
    pub chat: Jid,
    /// Payload as handed to the client.
    pub message: OutgoingMessage,
    /// Id the client assigned.
    pub id: String,
}

/// A reaction the engine sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionRecord {
    /// Chat.
    pub chat: Jid,
    /// Message reacted to.
    pub target: MessageKey,
    /// Emoji.
    pub emoji: String,
}

/// A read receipt the engine sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// Chat.
    pub chat: Jid,
    /// Sender whose messages were read.
    pub sender: Jid,
    /// Message ids.
    pub message_ids: Vec<String>,
}

#[derive(Default)]
struct SourceState {
    own_id: Option<Jid>,
    has_session: bool,
    connected: bool,
    connects: usize,
    disconnects: usize,
    pairing_script: Vec<PairingEvent>,
    next_id: u64,
    sent: Vec<SentRecord>,
    reactions: Vec<ReactionRecord>,
    revoked: Vec<(Jid, String)>,
    reads: Vec<ReadRecord>,
    joined_links: Vec<String>,
    media: HashMap<String, Bytes>,
    contacts: HashMap<Jid, DirectoryEntry>,
    groups: HashMap<Jid, GroupSummary>,
    pictures: HashMap<Jid, Bytes>,
    send_failures: VecDeque<ApiError>,
    connect_failures: VecDeque<ApiError>,
}

/// In-memory [`SourceApi`].
///
/// Clones share state, so a test keeps one handle while the bridge holds
/// another.
#[derive(Clone, Default)]
pub struct SimSource {
    state: Arc<Mutex<SourceState>>,
}

impl SimSource {
    /// Paired client for `own_id` with a saved session.
    pub fn new(own_id: Jid) -> Self {
        let source = Self::default();
        {
            let mut state = source.state();
            state.own_id = Some(own_id);
            state.has_session = true;
        }
        source
    }

    /// Client with no saved session; pairing replays `script`.
    pub fn unpaired(script: Vec<PairingEvent>) -> Self {
        let source = Self::default();
        source.state().pairing_script = script;
        source
    }

    #[allow(clippy::expect_used)]
    fn state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().expect("SimSource mutex poisoned")
    }

    /// Add a directory entry.
    pub fn add_contact(&self, jid: Jid, entry: DirectoryEntry) {
        self.state().contacts.insert(jid, entry);
    }

    /// Add a group the operator is a member of.
    pub fn add_group(&self, jid: Jid, name: &str, participants: &[Jid]) {
        let summary = GroupSummary {
            jid: jid.clone(),
            name: name.to_string(),
            topic: String::new(),
            participants: participants
                .iter()
                .map(|jid| GroupParticipant { jid: jid.clone(), is_admin: false })
                .collect(),
        };
        self.state().groups.insert(jid, summary);
    }

    /// Serve `data` for downloads of `direct_path`.
    pub fn add_media(&self, direct_path: &str, data: Bytes) {
        self.state().media.insert(direct_path.to_string(), data);
    }

    /// Serve `data` as the profile picture of `jid`.
    pub fn add_picture(&self, jid: Jid, data: Bytes) {
        self.state().pictures.insert(jid, data);
    }

    /// Fail the next `send_message` with `err`.
    pub fn fail_next_send(&self, err: ApiError) {
        self.state().send_failures.push_back(err);
    }

    /// Fail the next `connect` with `err`.
    pub fn fail_next_connect(&self, err: ApiError) {
        self.state().connect_failures.push_back(err);
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.state().sent.clone()
    }

    /// Reactions sent so far.
    pub fn reactions(&self) -> Vec<ReactionRecord> {
        self.state().reactions.clone()
    }

    /// Revoked `(chat, message id)` pairs.
    pub fn revoked(&self) -> Vec<(Jid, String)> {
        self.state().revoked.clone()
    }

    /// Read receipts sent so far.
    pub fn reads(&self) -> Vec<ReadRecord> {
        self.state().reads.clone()
    }

    /// Invite codes joined so far.
    pub fn joined_links(&self) -> Vec<String> {
        self.state().joined_links.clone()
    }

    /// Whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// `(connects, disconnects)` performed so far.
    pub fn connection_counts(&self) -> (usize, usize) {
        let state = self.state();
        (state.connects, state.disconnects)
    }

    fn next_id(state: &mut SourceState) -> String {
        state.next_id += 1;
        format!("SIM{:04}", state.next_id)
    }
}

#[async_trait]
impl SourceApi for SimSource {
    fn own_id(&self) -> Option<Jid> {
        self.state().own_id.clone()
    }

    async fn has_session(&self) -> bool {
        self.state().has_session
    }

    async fn pairing_codes(&self) -> Result<mpsc::Receiver<PairingEvent>, ApiError> {
        let script = std::mem::take(&mut self.state().pairing_script);
        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            if let PairingEvent::Success { id } = &event {
                let mut state = self.state();
                state.own_id = Some(id.clone());
                state.has_session = true;
            }
            tx.send(event).await.map_err(|_| ApiError::Transport("pairing closed".into()))?;
        }
        Ok(rx)
    }

    async fn connect(&self) -> Result<(), ApiError> {
        let mut state = self.state();
        state.connects += 1;
        if let Some(err) = state.connect_failures.pop_front() {
            return Err(err);
        }
        if !state.has_session {
            return Err(ApiError::NotConnected);
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state();
        state.disconnects += 1;
        state.connected = false;
    }

    async fn send_message(
        &self,
        chat: &Jid,
        message: OutgoingMessage,
    ) -> Result<SentMessage, ApiError> {
        let mut state = self.state();
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        let id = Self::next_id(&mut state);
        state.sent.push(SentRecord { chat: chat.clone(), message, id: id.clone() });
        Ok(SentMessage { id, timestamp: 0 })
    }

    async fn send_reaction(
        &self,
        chat: &Jid,
        target: &MessageKey,
        emoji: &str,
    ) -> Result<SentMessage, ApiError> {
        let mut state = self.state();
        let id = Self::next_id(&mut state);
        state.reactions.push(ReactionRecord {
            chat: chat.clone(),
            target: target.clone(),
            emoji: emoji.to_string(),
        });
        Ok(SentMessage { id, timestamp: 0 })
    }

    async fn revoke_message(&self, chat: &Jid, message_id: &str) -> Result<(), ApiError> {
        self.state().revoked.push((chat.clone(), message_id.to_string()));
        Ok(())
    }

    async fn mark_read(
        &self,
        chat: &Jid,
        sender: &Jid,
        message_ids: &[String],
        _timestamp: i64,
    ) -> Result<(), ApiError> {
        self.state().reads.push(ReadRecord {
            chat: chat.clone(),
            sender: sender.clone(),
            message_ids: message_ids.to_vec(),
        });
        Ok(())
    }

    async fn download(&self, media: &MediaRef) -> Result<Bytes, ApiError> {
        self.state()
            .media
            .get(&media.direct_path)
            .cloned()
            .ok_or_else(|| ApiError::Download(format!("no blob at {}", media.direct_path)))
    }

    async fn contact(&self, jid: &Jid) -> Result<Option<DirectoryEntry>, ApiError> {
        Ok(self.state().contacts.get(jid).cloned())
    }

    async fn all_contacts(&self) -> Result<Vec<(Jid, DirectoryEntry)>, ApiError> {
        let mut contacts: Vec<_> =
            self.state().contacts.iter().map(|(jid, entry)| (jid.clone(), entry.clone())).collect();
        contacts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(contacts)
    }

    async fn group_info(&self, jid: &Jid) -> Result<GroupSummary, ApiError> {
        self.state()
            .groups
            .get(jid)
            .cloned()
            .ok_or_else(|| ApiError::Rejected { code: 404, description: format!("{jid} not found") })
    }

    async fn joined_groups(&self) -> Result<Vec<GroupSummary>, ApiError> {
        Ok(self.state().groups.values().cloned().collect())
    }

    async fn join_group_with_link(&self, code: &str) -> Result<Jid, ApiError> {
        let mut state = self.state();
        state.joined_links.push(code.to_string());
        Ok(Jid::group(format!("1203630{}", state.joined_links.len())))
    }

    async fn profile_picture(&self, jid: &Jid) -> Result<Option<Bytes>, ApiError> {
        Ok(self.state().pictures.get(jid).cloned())
    }
}
