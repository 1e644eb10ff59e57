//! Error types for the host process.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] hwp_bridge_protocol::ProtocolError),

    #[error("COM error: {0}")]
    Com(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
