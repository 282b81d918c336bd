//! Engine context.
//!
//! One [`Bridge`] value holds everything a handler needs: config, the
//! Identity Store, both network clients and the per-key topic locks. It is
//! shared behind an `Arc` by every handler task; only the store and the
//! clients carry long-lived state.

use std::sync::Arc;

use forumbridge_core::{
    Config, Environment, ForumApi, MediaTranscoder, NoTranscoder, SourceApi,
    format::{Header, stale_timestamp},
};
use forumbridge_proto::Jid;
use tokio::sync::watch;

use crate::{
    engine::Phase,
    locks::KeyedLocks,
    pipeline::{ForumPipeline, RequestLayer},
    storage::Storage,
};

/// Shared state for every handler.
pub struct Bridge<E: Environment, S: Storage> {
    pub(crate) env: E,
    pub(crate) config: Arc<Config>,
    pub(crate) store: S,
    pub(crate) source: Arc<dyn SourceApi>,
    pub(crate) forum: ForumPipeline<E>,
    pub(crate) transcoder: Arc<dyn MediaTranscoder>,
    pub(crate) topic_locks: KeyedLocks,
    phase: watch::Sender<Phase>,
}

impl<E: Environment, S: Storage> Bridge<E, S> {
    /// Assemble a bridge from its parts.
    pub fn new(
        env: E,
        config: Config,
        store: S,
        source: Arc<dyn SourceApi>,
        forum: Arc<dyn ForumApi>,
    ) -> Self {
        let forum = ForumPipeline::new(forum, env.clone(), config.engine.max_rate_limit_retries);
        let (phase, _) = watch::channel(Phase::Init);
        Self {
            env,
            config: Arc::new(config),
            store,
            source,
            forum,
            transcoder: Arc::new(NoTranscoder),
            topic_locks: KeyedLocks::new(),
            phase,
        }
    }

    /// Use `transcoder` for sticker conversion.
    #[must_use]
    pub fn with_transcoder(mut self, transcoder: Arc<dyn MediaTranscoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Add a transform to the Network-B request pipeline.
    #[must_use]
    pub fn with_request_layer(mut self, layer: impl RequestLayer + 'static) -> Self {
        self.forum = self.forum.with_layer(layer);
        self
    }

    /// Environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identity Store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Network-B forum chat receiving all bridged content.
    pub fn target_chat(&self) -> i64 {
        self.config.telegram.target_chat_id
    }

    /// The sole authorised Network-B user.
    pub fn owner_id(&self) -> i64 {
        self.config.telegram.owner_id
    }

    /// Operator's own Network-A account, device stripped.
    pub fn own_id(&self) -> Option<Jid> {
        self.source.own_id().map(|jid| jid.to_non_device())
    }

    /// Whether `jid` is the operator's own Network-A account.
    pub fn is_own(&self, jid: &Jid) -> bool {
        self.own_id().is_some_and(|own| own.user_part() == jid.user_part())
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::info!(from = ?previous, to = ?phase, "engine phase changed");
        }
    }

    /// Header timestamp for an event sent at `secs`, `None` while fresh.
    pub(crate) fn stale_timestamp(&self, secs: i64) -> Option<String> {
        stale_timestamp(
            secs,
            self.env.wall_clock_secs(),
            self.config.time_offset(),
            &self.config.time_format,
        )
    }

    /// Header with only the sender line, and a timestamp when stale.
    pub(crate) fn sender_header(&self, sender: String, timestamp: i64) -> Header {
        Header { sender, timestamp: self.stale_timestamp(timestamp), ..Header::default() }
    }
}
