//! Error types for wirecall.

use thiserror::Error;

use crate::protocol::StatusCode;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum WirecallError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (default payload codec).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (oversized body, malformed response, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote side answered with a non-success status code.
    #[error("remote call failed ({code:?}): {message}")]
    Remote { code: StatusCode, message: String },

    /// No response arrived within the caller's deadline.
    #[error("call timed out")]
    Timeout,

    /// A pending call with this correlation id already exists.
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelationId(u32),

    /// The request could not be written to the connection.
    #[error("failed to send request: {0}")]
    SendFailure(String),

    /// Connection closed while calls were still pending.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using WirecallError.
pub type Result<T> = std::result::Result<T, WirecallError>;
