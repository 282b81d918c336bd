//! Bridge wired to the simulated clients.

#![allow(clippy::disallowed_types, reason = "Recording pairing codes")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use forumbridge_core::{Config, PairingDisplay};
use forumbridge_engine::{
    Bridge, BridgeError, Command, Engine, MemoryStorage, Outcome, Storage, commands, inbound,
    outbound,
};
use forumbridge_proto::{ForumMessage, ForumUpdate, Jid, SourceEvent};
use tokio::sync::mpsc;

use crate::{
    fixtures::{OWNER_ID, TARGET_CHAT, own_jid},
    sim_env::SimEnv,
    sim_forum::SimForum,
    sim_source::SimSource,
};

/// Pairing display that keeps every code it was shown.
#[derive(Clone, Default)]
pub struct RecordingPairing {
    codes: Arc<Mutex<Vec<String>>>,
}

impl RecordingPairing {
    /// Codes shown so far.
    #[allow(clippy::expect_used)]
    pub fn codes(&self) -> Vec<String> {
        self.codes.lock().expect("RecordingPairing mutex poisoned").clone()
    }
}

impl PairingDisplay for RecordingPairing {
    #[allow(clippy::expect_used)]
    fn display_pairing_code(&self, code: &str) {
        self.codes.lock().expect("RecordingPairing mutex poisoned").push(code.to_string());
    }
}

/// Builder for [`TestBridge`] and [`TestEngine`].
pub struct TestBridgeBuilder<S: Storage> {
    config: Config,
    store: S,
    env: SimEnv,
    source: SimSource,
    forum: SimForum,
}

impl<S: Storage> TestBridgeBuilder<S> {
    /// Adjust the configuration.
    #[must_use]
    pub fn config(mut self, adjust: impl FnOnce(&mut Config)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Use a different store.
    pub fn store<T: Storage>(self, store: T) -> TestBridgeBuilder<T> {
        TestBridgeBuilder {
            config: self.config,
            store,
            env: self.env,
            source: self.source,
            forum: self.forum,
        }
    }

    /// Use a prepared Network-A client.
    #[must_use]
    pub fn source(mut self, source: SimSource) -> Self {
        self.source = source;
        self
    }

    /// Use a prepared forum client.
    #[must_use]
    pub fn forum(mut self, forum: SimForum) -> Self {
        self.forum = forum;
        self
    }

    fn bridge(&self) -> Bridge<SimEnv, S> {
        Bridge::new(
            self.env.clone(),
            self.config.clone(),
            self.store.clone(),
            Arc::new(self.source.clone()),
            Arc::new(self.forum.clone()),
        )
    }

    /// Bridge for calling handlers directly.
    pub fn build(self) -> TestBridge<S> {
        TestBridge {
            bridge: self.bridge(),
            env: self.env,
            source: self.source,
            forum: self.forum,
            store: self.store,
        }
    }

    /// Full engine fed through channels.
    pub fn build_engine(self) -> TestEngine<S> {
        let (source_tx, source_rx) = mpsc::channel(64);
        let (forum_tx, forum_rx) = mpsc::channel(64);
        let pairing = RecordingPairing::default();
        let engine = Engine::new(self.bridge(), source_rx, forum_rx, Arc::new(pairing.clone()));
        TestEngine {
            engine: Some(engine),
            source_tx,
            forum_tx,
            pairing,
            env: self.env,
            source: self.source,
            forum: self.forum,
            store: self.store,
        }
    }
}

/// Bridge over simulated clients, plus handles on each of them.
pub struct TestBridge<S: Storage = MemoryStorage> {
    /// The bridge under test.
    pub bridge: Bridge<SimEnv, S>,
    /// Shared virtual clock.
    pub env: SimEnv,
    /// Network-A double.
    pub source: SimSource,
    /// Network-B double.
    pub forum: SimForum,
    /// The bridge's store.
    pub store: S,
}

impl TestBridge<MemoryStorage> {
    /// Builder with the default test configuration and an empty store.
    pub fn builder() -> TestBridgeBuilder<MemoryStorage> {
        TestBridgeBuilder {
            config: Config::new("test-token", OWNER_ID, TARGET_CHAT),
            store: MemoryStorage::new(),
            env: SimEnv::new(),
            source: SimSource::new(own_jid()),
            forum: SimForum::new(),
        }
    }

    /// Default bridge.
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for TestBridge<MemoryStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Storage> TestBridge<S> {
    /// Run the A→B translator on `event`.
    pub async fn inbound(&self, event: &SourceEvent) -> Result<Outcome, BridgeError> {
        inbound::handle_source_event(&self.bridge, event).await
    }

    /// Run the B→A translator on `message`.
    pub async fn outbound(&self, message: &ForumMessage) -> Result<Outcome, BridgeError> {
        outbound::handle_operator_message(&self.bridge, message).await
    }

    /// Parse and run the command in `message`.
    pub async fn command(&self, message: &ForumMessage) -> Result<Outcome, BridgeError> {
        match message.text().and_then(Command::parse) {
            Some(Ok(command)) => commands::handle_command(&self.bridge, message, command).await,
            Some(Err(usage)) => Err(BridgeError::Routing(usage)),
            None => Err(BridgeError::routing("not a command")),
        }
    }

    /// Topic bound to `chat` in the target chat.
    pub fn thread_of(&self, chat: &Jid) -> Option<i64> {
        self.store
            .chat_thread_by_a(&chat.to_non_device().to_string(), TARGET_CHAT)
            .ok()
            .flatten()
            .map(|binding| binding.b_thread)
    }

    /// Forum message id bridged for `a_msg_id` in `chat`.
    pub fn b_msg_of(&self, chat: &Jid, a_msg_id: &str) -> Option<i64> {
        self.store
            .lookup_b_from_a(a_msg_id, &chat.to_non_device().to_string())
            .ok()
            .flatten()
            .map(|pair| pair.b_msg)
    }
}

/// Engine over simulated clients, with the senders feeding it.
pub struct TestEngine<S: Storage = MemoryStorage> {
    engine: Option<Engine<SimEnv, S>>,
    /// Network-A event stream.
    pub source_tx: mpsc::Sender<SourceEvent>,
    /// Network-B update stream.
    pub forum_tx: mpsc::Sender<ForumUpdate>,
    /// Codes shown during pairing.
    pub pairing: RecordingPairing,
    /// Shared virtual clock.
    pub env: SimEnv,
    /// Network-A double.
    pub source: SimSource,
    /// Network-B double.
    pub forum: SimForum,
    /// The engine's store.
    pub store: S,
}

impl<S: Storage> TestEngine<S> {
    /// Take the engine out to run it. Returns `None` the second time.
    pub fn take_engine(&mut self) -> Option<Engine<SimEnv, S>> {
        self.engine.take()
    }

    /// Send a Network-A event into the engine.
    pub async fn push_source(&self, event: SourceEvent) {
        if self.source_tx.send(event).await.is_err() {
            tracing::warn!("engine no longer reads whatsapp events");
        }
    }

    /// Send a Network-B update into the engine.
    pub async fn push_forum(&self, update: ForumUpdate) {
        if self.forum_tx.send(update).await.is_err() {
            tracing::warn!("engine no longer reads telegram updates");
        }
    }
}

/// Poll `condition` on real time until it holds or `timeout` passes.
///
/// Engine handlers run on spawned tasks; tests use this to wait for their
/// effects before asserting or shutting down.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
