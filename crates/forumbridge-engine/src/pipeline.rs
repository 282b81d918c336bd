//! Request middleware for the Network-B client.
//!
//! Every request passes through an ordered list of [`RequestLayer`]s and
//! then the rate-limit retry loop before reaching the client. The default
//! layers set HTML parse mode, disable link previews and allow sending
//! when the reply target is gone. [`ForumPipeline::with_layer`] is the one
//! insertion point for further transforms.

use std::sync::Arc;

use bytes::Bytes;
use forumbridge_core::{ApiError, Environment, ForumApi};
use forumbridge_proto::{ForumRequest, ForumResponse, ParseMode, SendOptions};

/// Rewrites a request before it is sent.
pub trait RequestLayer: Send + Sync {
    /// Layer name, for logs.
    fn name(&self) -> &'static str;

    /// Adjust `request` in place.
    fn apply(&self, request: &mut ForumRequest);
}

/// Formats text and captions as HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParseMode;

impl RequestLayer for HtmlParseMode {
    fn name(&self) -> &'static str {
        "parse_mode_html"
    }

    fn apply(&self, request: &mut ForumRequest) {
        let carries_text = request.carries_text();
        if let Some(options) = request.options_mut()
            && carries_text
        {
            options.parse_mode = Some(ParseMode::Html);
        }
    }
}

/// Turns off link previews.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisableLinkPreview;

impl RequestLayer for DisableLinkPreview {
    fn name(&self) -> &'static str {
        "disable_link_preview"
    }

    fn apply(&self, request: &mut ForumRequest) {
        if let ForumRequest::SendMessage { options, .. } = request {
            options.disable_link_preview = true;
        }
    }
}

/// Sends replies even when the anchor was deleted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowSendingWithoutReply;

impl RequestLayer for AllowSendingWithoutReply {
    fn name(&self) -> &'static str {
        "allow_sending_without_reply"
    }

    fn apply(&self, request: &mut ForumRequest) {
        if let Some(options) = request.options_mut()
            && options.reply_to.is_some()
        {
            options.allow_sending_without_reply = true;
        }
    }
}

/// Decorated Network-B client.
///
/// Cloning shares the underlying client and layers.
#[derive(Clone)]
pub struct ForumPipeline<E: Environment> {
    client: Arc<dyn ForumApi>,
    env: E,
    layers: Vec<Arc<dyn RequestLayer>>,
    max_retries: u32,
}

impl<E: Environment> ForumPipeline<E> {
    /// Wrap `client` with the default layers.
    pub fn new(client: Arc<dyn ForumApi>, env: E, max_retries: u32) -> Self {
        let layers: Vec<Arc<dyn RequestLayer>> = vec![
            Arc::new(HtmlParseMode),
            Arc::new(DisableLinkPreview),
            Arc::new(AllowSendingWithoutReply),
        ];
        Self { client, env, layers, max_retries }
    }

    /// Append a layer, run after the existing ones.
    #[must_use]
    pub fn with_layer(mut self, layer: impl RequestLayer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    /// Names of the installed layers, in order.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Send `request` through the layers, retrying on rate limits.
    ///
    /// Sleeps for the interval the server asked for, at most
    /// `max_retries` times; the last error is returned after that.
    pub async fn call(&self, mut request: ForumRequest) -> Result<ForumResponse, ApiError> {
        for layer in &self.layers {
            layer.apply(&mut request);
        }

        let method = request.method();
        let mut attempt = 0;
        loop {
            match self.client.call(request.clone()).await {
                Err(ApiError::RateLimited { retry_after }) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        method,
                        attempt,
                        retry_after_secs = retry_after.as_secs(),
                        "rate limited, backing off"
                    );
                    self.env.sleep(retry_after).await;
                },
                result => return result,
            }
        }
    }

    /// Send a request that posts a message and return the new message id.
    pub async fn post(&self, request: ForumRequest) -> Result<i64, ApiError> {
        let method = request.method();
        self.call(request)
            .await?
            .message_id()
            .ok_or_else(|| ApiError::Transport(format!("{method} returned no message id")))
    }

    /// Post HTML `text` into a topic.
    pub async fn send_text(
        &self,
        chat_id: i64,
        thread_id: i64,
        text: impl Into<String>,
        reply_to: Option<i64>,
    ) -> Result<i64, ApiError> {
        self.post(ForumRequest::SendMessage {
            chat_id,
            thread_id,
            text: text.into(),
            options: SendOptions::reply_to(reply_to),
        })
        .await
    }

    /// Create a forum topic and return its thread id.
    pub async fn create_topic(&self, chat_id: i64, name: &str) -> Result<i64, ApiError> {
        self.call(ForumRequest::CreateForumTopic { chat_id, name: name.to_string() })
            .await?
            .thread_id()
            .ok_or_else(|| ApiError::Transport("createForumTopic returned no thread id".into()))
    }

    /// Rename a forum topic.
    pub async fn edit_topic(&self, chat_id: i64, thread_id: i64, name: &str) -> Result<(), ApiError> {
        self.call(ForumRequest::EditForumTopic { chat_id, thread_id, name: name.to_string() })
            .await
            .map(drop)
    }

    /// Download a file the operator posted.
    pub async fn download(&self, file_id: &str) -> Result<Bytes, ApiError> {
        match self.call(ForumRequest::GetFile { file_id: file_id.to_string() }).await? {
            ForumResponse::File { data } => Ok(data),
            _ => Err(ApiError::Download(format!("getFile returned no data for {file_id}"))),
        }
    }

    /// React to a message.
    pub async fn set_reaction(
        &self,
        chat_id: i64,
        message_id: i64,
        emoji: &str,
    ) -> Result<(), ApiError> {
        self.call(ForumRequest::SetReaction { chat_id, message_id, emoji: emoji.to_string() })
            .await
            .map(drop)
    }

    /// Answer an inline button press.
    pub async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<(), ApiError> {
        self.call(ForumRequest::AnswerCallbackQuery {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
            show_alert,
        })
        .await
        .map(drop)
    }

    /// Delete a message.
    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        self.call(ForumRequest::DeleteMessage { chat_id, message_id }).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use forumbridge_proto::{ForumMedia, InputFile};

    use super::*;

    fn text_request(reply_to: Option<i64>) -> ForumRequest {
        ForumRequest::SendMessage {
            chat_id: -100,
            thread_id: 7,
            text: "<b>hi</b>".into(),
            options: SendOptions::reply_to(reply_to),
        }
    }

    #[test]
    fn html_layer_only_touches_text() {
        let mut request = text_request(None);
        HtmlParseMode.apply(&mut request);
        assert_eq!(request.options_mut().unwrap().parse_mode, Some(ParseMode::Html));

        let mut sticker = ForumRequest::SendMedia {
            chat_id: -100,
            thread_id: 7,
            kind: ForumMedia::Sticker,
            file: InputFile { data: Bytes::from_static(b"webp"), file_name: "s.webp".into() },
            caption: None,
            spoiler: false,
            options: SendOptions::default(),
        };
        HtmlParseMode.apply(&mut sticker);
        assert_eq!(sticker.options_mut().unwrap().parse_mode, None);
    }

    #[test]
    fn allow_without_reply_needs_anchor() {
        let mut plain = text_request(None);
        AllowSendingWithoutReply.apply(&mut plain);
        assert!(!plain.options_mut().unwrap().allow_sending_without_reply);

        let mut reply = text_request(Some(3));
        AllowSendingWithoutReply.apply(&mut reply);
        assert!(reply.options_mut().unwrap().allow_sending_without_reply);
    }

    #[test]
    fn link_preview_layer_ignores_non_messages() {
        let mut topic = ForumRequest::CreateForumTopic { chat_id: -100, name: "Alice".into() };
        let before = topic.clone();
        DisableLinkPreview.apply(&mut topic);
        assert_eq!(topic, before);
    }
}
