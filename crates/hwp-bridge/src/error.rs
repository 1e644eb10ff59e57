//! Errors surfaced to callers of the bridge.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use hwp_bridge_protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Helper executable not found (searched: {})", display_paths(.searched))]
    HelperNotFound { searched: Vec<PathBuf> },

    #[error("Failed to spawn helper process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed to allocate a local port: {0}")]
    PortAllocation(#[source] std::io::Error),

    #[error("Bridge at {addr} not reachable within {timeout:?}")]
    Unreachable { addr: SocketAddr, timeout: Duration },

    #[error("Bridge authentication failed: {0}")]
    Authentication(String),

    #[error("{method} failed: {message}")]
    Remote { method: String, message: String },

    #[error("{message}")]
    UnknownOperation { method: String, message: String },

    #[error("Bridge protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Bridge connection closed")]
    Closed,

    #[error("No automation object created; call create() first")]
    NotCreated,

    #[error("'{0}' is reserved for the session lifecycle")]
    ReservedName(String),

    #[error("Security module registration failed: {0}")]
    Registrar(String),
}

impl BridgeError {
    /// The message the helper reported, for remote failures.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            BridgeError::Remote { message, .. } | BridgeError::UnknownOperation { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, BridgeError>;
