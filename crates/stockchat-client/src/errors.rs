//! Client error types.

use stockchat_core::GatewayError;
use thiserror::Error;

/// Failures of the backend connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The socket could not be opened.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Socket URL.
        url: String,
        /// Underlying error.
        reason: String,
    },

    /// A write was attempted while no socket is open.
    #[error("connection is not open")]
    NotConnected,

    /// Writing to the socket failed.
    #[error("failed to send frame: {0}")]
    Send(String),

    /// The outbound frame could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The connection manager has shut down.
    #[error("connection manager has shut down")]
    Closed,
}

/// Failures surfaced by the correlator and session controller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend connection failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// No terminal frame arrived in time.
    #[error("no response within {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The frame stream ended before a terminal frame.
    #[error("response stream closed before completion")]
    StreamClosed,

    /// Persistence gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Client-local storage failure.
    #[error("local storage error: {0}")]
    Storage(String),

    /// Referenced message is not in the transcript.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Referenced message is not a pending question.
    #[error("message {0} is not awaiting feedback")]
    NotAwaitingFeedback(String),
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
