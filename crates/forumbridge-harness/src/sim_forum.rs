//! Scripted Network-B bot client.
//!
//! Assigns message and thread ids, serves uploaded-file downloads, and
//! records every request after the pipeline layers ran. Failures (including
//! 429 rate limits) can be queued per bot API method, and a method can be
//! made to hang to freeze the handler calling it.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use forumbridge_core::{ApiError, ForumApi};
use forumbridge_proto::{ForumRequest, ForumResponse};

/// First message id handed out.
pub const FIRST_MESSAGE_ID: i64 = 1000;

/// First thread id handed out.
pub const FIRST_THREAD_ID: i64 = 10;

/// A text post recorded by [`SimForum::texts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedText {
    /// Assigned message id.
    pub message_id: i64,
    /// Topic.
    pub thread_id: i64,
    /// HTML body.
    pub text: String,
    /// Reply anchor.
    pub reply_to: Option<i64>,
}

struct ForumState {
    next_message_id: i64,
    next_thread_id: i64,
    /// Every request that reached the client, with the id it produced.
    requests: Vec<(ForumRequest, Option<i64>)>,
    /// Every attempt, including failed ones.
    attempts: Vec<&'static str>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    /// Calls per method that never return.
    stalls: HashMap<&'static str, usize>,
    files: HashMap<String, Bytes>,
}

impl Default for ForumState {
    fn default() -> Self {
        Self {
            next_message_id: FIRST_MESSAGE_ID,
            next_thread_id: FIRST_THREAD_ID,
            requests: Vec::new(),
            attempts: Vec::new(),
            failures: HashMap::new(),
            stalls: HashMap::new(),
            files: HashMap::new(),
        }
    }
}

/// In-memory [`ForumApi`].
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct SimForum {
    state: Arc<Mutex<ForumState>>,
}

impl SimForum {
    /// Empty forum.
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)]
    fn state(&self) -> MutexGuard<'_, ForumState> {
        self.state.lock().expect("SimForum mutex poisoned")
    }

    /// Fail the next call to `method` (e.g. `"sendMessage"`) with `err`.
    pub fn fail_next(&self, method: &'static str, err: ApiError) {
        self.state().failures.entry(method).or_default().push_back(err);
    }

    /// Make the next call to `method` hang forever. The attempt is still
    /// recorded.
    pub fn stall_next(&self, method: &'static str) {
        *self.state().stalls.entry(method).or_default() += 1;
    }

    /// Serve `data` for `getFile` on `file_id`.
    pub fn add_file(&self, file_id: &str, data: Bytes) {
        self.state().files.insert(file_id.to_string(), data);
    }

    /// Successful requests in order.
    pub fn requests(&self) -> Vec<ForumRequest> {
        self.state().requests.iter().map(|(request, _)| request.clone()).collect()
    }

    /// Method names of every attempt, failed ones included.
    pub fn attempts(&self) -> Vec<&'static str> {
        self.state().attempts.clone()
    }

    /// Number of successful calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.state().requests.iter().filter(|(request, _)| request.method() == method).count()
    }

    /// Successful `sendMessage` posts in order.
    pub fn texts(&self) -> Vec<PostedText> {
        self.state()
            .requests
            .iter()
            .filter_map(|(request, id)| match request {
                ForumRequest::SendMessage { thread_id, text, options, .. } => Some(PostedText {
                    message_id: id.unwrap_or_default(),
                    thread_id: *thread_id,
                    text: text.clone(),
                    reply_to: options.reply_to,
                }),
                _ => None,
            })
            .collect()
    }

    /// Text posts in one topic.
    pub fn texts_in(&self, thread_id: i64) -> Vec<PostedText> {
        self.texts().into_iter().filter(|post| post.thread_id == thread_id).collect()
    }

    /// `(thread id, title)` of every topic created.
    pub fn topics(&self) -> Vec<(i64, String)> {
        self.state()
            .requests
            .iter()
            .filter_map(|(request, id)| match request {
                ForumRequest::CreateForumTopic { name, .. } => {
                    Some((id.unwrap_or_default(), name.clone()))
                },
                _ => None,
            })
            .collect()
    }

    /// Id the next posted message will get.
    pub fn peek_message_id(&self) -> i64 {
        self.state().next_message_id
    }
}

#[async_trait]
impl ForumApi for SimForum {
    async fn call(&self, request: ForumRequest) -> Result<ForumResponse, ApiError> {
        let method = request.method();
        let stalled = {
            let mut state = self.state();
            let left = state.stalls.entry(method).or_default();
            let stalled = *left > 0;
            if stalled {
                *left -= 1;
                state.attempts.push(method);
            }
            stalled
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        if matches!(request, ForumRequest::CreateForumTopic { .. }) {
            // Let concurrent handlers interleave around topic creation.
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        state.attempts.push(method);
        if let Some(err) = state.failures.get_mut(method).and_then(VecDeque::pop_front) {
            return Err(err);
        }

        let (response, id) = match &request {
            ForumRequest::SendMessage { .. }
            | ForumRequest::SendMedia { .. }
            | ForumRequest::SendContact { .. }
            | ForumRequest::SendLocation { .. } => {
                let message_id = state.next_message_id;
                state.next_message_id += 1;
                (ForumResponse::Message { message_id }, Some(message_id))
            },
            ForumRequest::CreateForumTopic { .. } => {
                let thread_id = state.next_thread_id;
                state.next_thread_id += 1;
                (ForumResponse::Topic { thread_id }, Some(thread_id))
            },
            ForumRequest::GetFile { file_id } => match state.files.get(file_id) {
                Some(data) => (ForumResponse::File { data: data.clone() }, None),
                None => {
                    return Err(ApiError::Rejected {
                        code: 400,
                        description: format!("Bad Request: file {file_id} not found"),
                    });
                },
            },
            ForumRequest::EditForumTopic { .. }
            | ForumRequest::SetReaction { .. }
            | ForumRequest::AnswerCallbackQuery { .. }
            | ForumRequest::DeleteMessage { .. } => (ForumResponse::Done, None),
        };
        state.requests.push((request, id));
        Ok(response)
    }
}
