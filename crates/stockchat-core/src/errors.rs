//! Error types for the gateway contracts.

use thiserror::Error;

/// Failure reported by a persistence gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The referenced conversation does not exist.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// The request was rejected as invalid.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Caller is not authenticated.
    #[error("unauthorized")]
    Unauthorized,

    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network or protocol failure reaching a remote gateway.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure reported by an auth gateway.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token unknown, malformed or expired.
    #[error("invalid or expired session token")]
    InvalidToken,

    /// Storage backend failure.
    #[error("auth storage error: {0}")]
    Storage(String),
}
