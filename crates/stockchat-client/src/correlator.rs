//! Request correlator: one logical request over the shared connection.
//!
//! Each request gets a fresh [`RequestId`] and a frame sink registered with
//! the [`ConnectionManager`]. Inbound frames are cumulative, so every frame is
//! diffed against the previous one and the new suffix is handed to the chunk
//! callback. Interim frames (the backend's status phrases) keep the request
//! open; the first other frame is terminal and resolves it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stockchat_core::{ConversationId, InboundFrame, OutboundFrame, RequestId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::errors::ClientError;

/// Receives each new piece of streamed text.
pub type ChunkFn = Arc<dyn Fn(&str) + Send + Sync>;

/// What to ask the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    /// Numeric user id.
    pub user_id: i64,
    /// Conversation the request belongs to.
    pub thread_id: ConversationId,
    /// Prompt text.
    pub message: String,
    /// Answer to a confirmation question, when resuming after one.
    pub human_feedback: Option<bool>,
}

/// Runs one request to completion and returns its terminal frame.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send `request`, stream chunks to `on_chunk`, resolve on the terminal frame.
    async fn dispatch(
        &self,
        request: ChatRequest,
        on_chunk: Option<ChunkFn>,
    ) -> Result<InboundFrame, ClientError>;
}

/// Text `current` adds to `previous`.
///
/// Removes the first occurrence of `previous` from `current`. This is exact
/// for well-behaved cumulative streams; if the backend rewrites earlier text
/// the result is whatever remains after that single removal.
pub fn new_suffix(previous: &str, current: &str) -> String {
    if previous.is_empty() {
        current.to_owned()
    } else {
        current.replacen(previous, "", 1)
    }
}

/// Per-request accumulation state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    /// Correlation id.
    pub correlation_id: RequestId,
    /// Text of the last frame seen.
    pub accumulated_text: String,
    /// Length in bytes of the text already handed out as chunks.
    pub last_emitted_len: usize,
}

impl PendingRequest {
    /// Fresh state for `correlation_id`.
    pub fn new(correlation_id: RequestId) -> Self {
        Self {
            correlation_id,
            accumulated_text: String::new(),
            last_emitted_len: 0,
        }
    }

    /// Take in the next cumulative text and return its new suffix.
    pub fn absorb(&mut self, current: &str) -> String {
        let suffix = new_suffix(&self.accumulated_text, current);
        current.clone_into(&mut self.accumulated_text);
        self.last_emitted_len = current.len();
        suffix
    }
}

/// Unregisters the request's sink however the request ends.
struct Registration<'a> {
    connection: &'a ConnectionManager,
    id: RequestId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.connection.unregister(&self.id);
    }
}

/// [`Dispatcher`] over the shared backend connection.
pub struct Correlator {
    connection: Arc<ConnectionManager>,
    timeout: Duration,
}

impl Correlator {
    /// Correlator failing requests that see no terminal frame within `timeout`.
    pub fn new(connection: Arc<ConnectionManager>, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }
}

#[async_trait]
impl Dispatcher for Correlator {
    async fn dispatch(
        &self,
        request: ChatRequest,
        on_chunk: Option<ChunkFn>,
    ) -> Result<InboundFrame, ClientError> {
        let request_id = RequestId::new();
        let (sink, mut frames) = mpsc::unbounded_channel();
        self.connection.register(request_id.clone(), sink)?;
        let _registration = Registration {
            connection: &self.connection,
            id: request_id.clone(),
        };

        let frame = OutboundFrame {
            user_id: request.user_id,
            thread_id: request.thread_id,
            message: request.message,
            human_feedback: request.human_feedback,
            request_id: request_id.clone(),
        };
        let mut pending = PendingRequest::new(request_id.clone());

        let exchange = async {
            let _ = self.connection.send(&frame).await?;
            while let Some(inbound) = frames.recv().await {
                if !inbound.concerns(&request_id, &frame.thread_id) {
                    continue;
                }
                let chunk = pending.absorb(&inbound.message);
                if !chunk.is_empty() {
                    if let Some(on_chunk) = &on_chunk {
                        on_chunk(&chunk);
                    }
                }
                if inbound.is_interim() {
                    debug!(request_id = %request_id, status = %inbound.message, "interim frame");
                    continue;
                }
                debug!(request_id = %request_id, len = inbound.message.len(), "terminal frame");
                return Ok(inbound);
            }
            Err(ClientError::StreamClosed)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .unwrap_or_else(|_| {
                warn!(request_id = %request_id, "request timed out");
                Err(ClientError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }
}
