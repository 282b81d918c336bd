//! Engine Loop.
//!
//! Owns both event streams and the lifecycle. Events are never handled on
//! the loop itself (apart from `LoggedOut`, which must flip the phase
//! before anything else runs); each one becomes a job on the queue for
//! its conversation. Submitting a job never waits, so one stalled
//! conversation never holds up the loop.
//!
//! # Lifecycle
//!
//! ```text
//! Init ──► Connecting ──► Running ──► Shutdown
//!                            │ ▲
//!              LoggedOut ────┘ └──── /restartwa
//!                        Reconnecting
//! ```
//!
//! Shutdown stops intake, lets queued jobs finish within the configured
//! grace period, then cancels whatever is still running. A cancelled
//! handler stops at a suspension point; store writes are synchronous, so
//! no partial row is left behind.

use std::{sync::Arc, time::Duration};

use forumbridge_core::{Environment, PairingDisplay};
use forumbridge_proto::{
    CallbackQuery, ForumMessage, ForumUpdate, GENERAL_THREAD, PairingEvent, SourceEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    commands::{self, Command},
    context::Bridge,
    error::BridgeError,
    inbound, outbound,
    outcome::{DropReason, Outcome},
    queues::ConversationQueues,
    storage::{SCHEMA_VERSION, Storage},
};

/// Queue key shared by every command and button press.
const COMMANDS_KEY: &str = "commands";

/// Queue key for source events without a conversation.
const SOURCE_KEY: &str = "source";

/// How long cancelled handlers get to unwind before their tasks are aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening the store.
    Init,
    /// Pairing or connecting the Network-A client.
    Connecting,
    /// Bridging in both directions.
    Running,
    /// Network-A session lost; Network B still serves commands.
    Reconnecting,
    /// Draining and stopping.
    Shutdown,
}

/// The bridge's main loop.
pub struct Engine<E: Environment, S: Storage> {
    bridge: Arc<Bridge<E, S>>,
    source_events: mpsc::Receiver<SourceEvent>,
    forum_updates: mpsc::Receiver<ForumUpdate>,
    pairing: Arc<dyn PairingDisplay>,
    shutdown: CancellationToken,
    work: CancellationToken,
}

impl<E: Environment, S: Storage> Engine<E, S> {
    /// Create an engine reading from the two client event streams.
    pub fn new(
        bridge: Bridge<E, S>,
        source_events: mpsc::Receiver<SourceEvent>,
        forum_updates: mpsc::Receiver<ForumUpdate>,
        pairing: Arc<dyn PairingDisplay>,
    ) -> Self {
        Self {
            bridge: Arc::new(bridge),
            source_events,
            forum_updates,
            pairing,
            shutdown: CancellationToken::new(),
            work: CancellationToken::new(),
        }
    }

    /// Shared bridge state.
    pub fn bridge(&self) -> Arc<Bridge<E, S>> {
        Arc::clone(&self.bridge)
    }

    /// Token that stops the engine when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested or both event streams close.
    ///
    /// Only Init failures are returned; once running, handler errors are
    /// reported to the operator and never end the loop.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        if let Err(err) = self.init().await {
            self.bridge.set_phase(Phase::Shutdown);
            return Err(err);
        }
        self.bridge.set_phase(Phase::Running);

        let mut queues = ConversationQueues::new(self.bridge.config.engine.queue_capacity);
        let mut source_open = true;
        let mut forum_open = true;

        while source_open || forum_open {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                event = self.source_events.recv(), if source_open => match event {
                    Some(event) => self.dispatch_source(&mut queues, event).await,
                    None => {
                        tracing::warn!("whatsapp event stream closed");
                        source_open = false;
                    },
                },
                update = self.forum_updates.recv(), if forum_open => match update {
                    Some(update) => self.dispatch_forum(&mut queues, update),
                    None => {
                        tracing::warn!("telegram update stream closed");
                        forum_open = false;
                    },
                },
            }
        }

        self.stop(queues).await;
        Ok(())
    }

    async fn init(&self) -> Result<(), BridgeError> {
        let version = self.bridge.store.schema_version()?;
        if version != SCHEMA_VERSION {
            return Err(BridgeError::Fatal(format!(
                "identity store schema {version} does not match {SCHEMA_VERSION}"
            )));
        }
        tracing::info!(schema_version = version, "identity store ready");

        self.bridge.set_phase(Phase::Connecting);
        if !self.bridge.source.has_session().await {
            self.pair().await?;
        }
        tokio::select! {
            () = self.shutdown.cancelled() => return Err(BridgeError::Cancelled),
            result = self.bridge.source.connect() => result?,
        }
        tracing::info!(own_id = ?self.bridge.own_id(), "whatsapp connected");
        Ok(())
    }

    /// Drive the pairing flow until the device is linked.
    async fn pair(&self) -> Result<(), BridgeError> {
        tracing::info!("no saved whatsapp session, starting pairing");
        let mut codes = self.bridge.source.pairing_codes().await?;
        loop {
            let event = tokio::select! {
                () = self.shutdown.cancelled() => return Err(BridgeError::Cancelled),
                event = codes.recv() => event,
            };
            match event {
                Some(PairingEvent::Code(code)) => self.pairing.display_pairing_code(&code),
                Some(PairingEvent::Success { id }) => {
                    tracing::info!(%id, "device paired");
                    return Ok(());
                },
                Some(PairingEvent::Timeout) => {
                    return Err(BridgeError::Fatal("pairing timed out".into()));
                },
                Some(PairingEvent::Error(reason)) => {
                    return Err(BridgeError::Fatal(format!("pairing failed: {reason}")));
                },
                None => {
                    return Err(BridgeError::Fatal("pairing ended without linking".into()));
                },
            }
        }
    }

    async fn dispatch_source(&self, queues: &mut ConversationQueues, event: SourceEvent) {
        if matches!(event, SourceEvent::LoggedOut(_)) {
            let handled = async {
                let result = inbound::handle_source_event(&self.bridge, &event).await;
                finish_source(&self.bridge, &event, result).await;
            };
            tokio::select! {
                () = self.shutdown.cancelled() => {},
                () = handled => {},
            }
            return;
        }

        let key = event.conversation_key().unwrap_or_else(|| SOURCE_KEY.to_string());
        let bridge = Arc::clone(&self.bridge);
        let work = self.work.clone();
        queues.push(
            &key,
            Box::pin(async move {
                let result = tokio::select! {
                    () = work.cancelled() => Err(BridgeError::Cancelled),
                    result = inbound::handle_source_event(&bridge, &event) => result,
                };
                finish_source(&bridge, &event, result).await;
            }),
        );
    }

    fn dispatch_forum(&self, queues: &mut ConversationQueues, update: ForumUpdate) {
        match update {
            ForumUpdate::Message(message) => self.dispatch_message(queues, message),
            ForumUpdate::CallbackQuery(query) => {
                let bridge = Arc::clone(&self.bridge);
                let work = self.work.clone();
                queues.push(
                    COMMANDS_KEY,
                    Box::pin(async move {
                        let result = tokio::select! {
                            () = work.cancelled() => Err(BridgeError::Cancelled),
                            result = commands::handle_callback(&bridge, &query) => result,
                        };
                        finish_callback(&bridge, &query, result).await;
                    }),
                );
            },
        }
    }

    fn dispatch_message(&self, queues: &mut ConversationQueues, message: ForumMessage) {
        if commands::authorize(&self.bridge, message.sender_id()).is_err() {
            tracing::debug!(user = message.sender_id(), "{}", DropReason::Unauthorized);
            return;
        }

        let command = message.text().and_then(Command::parse);
        let key = match &command {
            Some(_) => COMMANDS_KEY.to_string(),
            None if message.chat_id != self.bridge.target_chat() => {
                tracing::debug!(b_chat = message.chat_id, "{}", DropReason::OutsideTargetChat);
                return;
            },
            None if message.is_topic_created()
                || !message.is_topic_message
                || message.thread_id == GENERAL_THREAD =>
            {
                tracing::debug!(b_msg = message.message_id, "ignoring message outside topics");
                return;
            },
            None => format!("b:{}:{}", message.chat_id, message.thread_id),
        };

        let bridge = Arc::clone(&self.bridge);
        let work = self.work.clone();
        queues.push(
            &key,
            Box::pin(async move {
                let handler = async {
                    match command {
                        Some(Ok(command)) => {
                            commands::handle_command(&bridge, &message, command).await
                        },
                        Some(Err(usage)) => Err(BridgeError::Routing(usage)),
                        None => outbound::handle_operator_message(&bridge, &message).await,
                    }
                };
                let result = tokio::select! {
                    () = work.cancelled() => Err(BridgeError::Cancelled),
                    result = handler => result,
                };
                finish_operator(&bridge, &message, result).await;
            }),
        );
    }

    async fn stop(&self, mut queues: ConversationQueues) {
        self.bridge.set_phase(Phase::Shutdown);

        let grace = self.bridge.config.engine.shutdown_grace();
        if !queues.close(self.bridge.env.sleep(grace)).await {
            tracing::warn!(grace_secs = grace.as_secs(), "handlers still running, cancelling");
            self.work.cancel();
            if !queues.close(self.bridge.env.sleep(CANCEL_GRACE)).await {
                let aborted = queues.abort();
                tracing::warn!(aborted, "aborted conversation workers");
            }
        }

        self.bridge.source.disconnect().await;
        tracing::info!("engine stopped");
    }
}

fn log_outcome(kind: &str, outcome: Outcome) {
    match outcome {
        Outcome::Dropped(reason) => tracing::info!(event = kind, %reason, "event dropped"),
        Outcome::Bridged | Outcome::Updated => tracing::debug!(event = kind, ?outcome, "handled"),
    }
}

fn log_failure(kind: &str, err: &BridgeError) {
    match err {
        BridgeError::Cancelled => tracing::debug!(event = kind, "handler cancelled"),
        BridgeError::Unauthorized => tracing::debug!(event = kind, "unauthorized"),
        BridgeError::Routing(notice) => tracing::warn!(event = kind, %notice, "routing failed"),
        _ => tracing::error!(event = kind, error = %err, "handler failed"),
    }
}

async fn finish_source<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    event: &SourceEvent,
    result: Result<Outcome, BridgeError>,
) {
    match result {
        Ok(outcome) => log_outcome(event.kind(), outcome),
        Err(err) => {
            log_failure(event.kind(), &err);
            inbound::report_source_failure(bridge, event, &err).await;
        },
    }
}

async fn finish_operator<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    message: &ForumMessage,
    result: Result<Outcome, BridgeError>,
) {
    match result {
        Ok(outcome) => log_outcome("operator_message", outcome),
        Err(err) => {
            log_failure("operator_message", &err);
            outbound::report_operator_failure(bridge, message, &err).await;
        },
    }
}

async fn finish_callback<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    query: &CallbackQuery,
    result: Result<Outcome, BridgeError>,
) {
    match result {
        Ok(outcome) => log_outcome("callback", outcome),
        Err(err) => {
            log_failure("callback", &err);
            if err.is_reportable()
                && let Err(answer_err) =
                    bridge.forum.answer_callback(&query.id, &err.to_string(), true).await
            {
                tracing::warn!(error = %answer_err, "failed to answer button press");
            }
        },
    }
}
