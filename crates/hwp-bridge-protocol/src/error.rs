//! Error types for the bridge wire protocol.

use thiserror::Error;

/// Errors that can occur while exchanging bridge messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent bytes that are not a valid message.
    #[error("Malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Connection closed")]
    Closed,

    /// The peer answered a challenge with the wrong digest, or rejected ours.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProtocolError {
    /// True when the error means the peer is gone or the stream is unusable.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Closed => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
