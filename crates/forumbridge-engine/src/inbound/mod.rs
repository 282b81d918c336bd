//! A→B Translator.
//!
//! Turns Network-A events into posts in the target forum chat. Messages go
//! through the bridging pipeline in [`message`]; every other event kind
//! posts a short notice (see [`notices`]).

mod media;
mod message;
mod notices;

use forumbridge_core::{Environment, format::escape_html};
use forumbridge_proto::{GENERAL_THREAD, SourceEvent};

use crate::{context::Bridge, error::BridgeError, outcome::Outcome, storage::Storage};

/// Bridge one Network-A event.
pub async fn handle_source_event<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    event: &SourceEvent,
) -> Result<Outcome, BridgeError> {
    match event {
        SourceEvent::Message(message) => message::bridge_message(bridge, message).await,
        SourceEvent::Receipt(receipt) => notices::receipt(bridge, receipt),
        SourceEvent::Picture(change) => notices::picture(bridge, change).await,
        SourceEvent::GroupInfo(change) => notices::group_info(bridge, change).await,
        SourceEvent::PushName(change) => notices::push_name(bridge, change).await,
        SourceEvent::UserAbout(about) => notices::user_about(bridge, about).await,
        SourceEvent::CallOffer(offer) => notices::call_offer(bridge, offer).await,
        SourceEvent::LoggedOut(logged_out) => notices::logged_out(bridge, logged_out).await,
    }
}

/// Tell the operator that bridging `event` failed.
///
/// Posted into the conversation's topic when it has one, the General
/// thread otherwise. A failure to report is only logged.
pub async fn report_source_failure<E: Environment, S: Storage>(
    bridge: &Bridge<E, S>,
    event: &SourceEvent,
    err: &BridgeError,
) {
    if !err.is_reportable() {
        return;
    }

    let b_thread = event
        .conversation_key()
        .and_then(|key| bridge.existing_thread(&key).ok().flatten())
        .unwrap_or(GENERAL_THREAD);
    let text = match err {
        BridgeError::Fatal(reason) => format!("<b>⚠️ {}</b>", escape_html(reason)),
        _ => format!(
            "<b>Failed to bridge a {}</b>\n<code>{}</code>",
            event.kind().replace('_', " "),
            escape_html(&err.to_string())
        ),
    };

    if let Err(report_err) =
        bridge.forum.send_text(bridge.target_chat(), b_thread, text, None).await
    {
        tracing::error!(
            event = event.kind(),
            error = %report_err,
            "failed to report bridge failure to operator"
        );
    }
}
