//! The host loop: listen, authenticate, serve one connection at a time.
//!
//! ```text
//! Idle -> Listening -> Connected -> (request/response)* -> Disconnected
//!            ^                                                  |
//!            +--------------------------------------------------+
//!                                         (after `shutdown`) -> Terminated
//! ```
//!
//! Requests are handled strictly one after another on the calling thread,
//! since the automation object must only ever be touched from the thread that
//! created it.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use hwp_bridge_protocol::{accept_handshake, MessageChannel, ProtocolError, Request, BRIDGE_AUTH_KEY};

use crate::dispatcher::{Flow, RequestDispatcher};
use crate::error::{HostError, Result};
use crate::target::TargetFactory;

/// How long a freshly accepted peer gets to complete the handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Listening,
    Connected,
    Disconnected,
    Terminated,
}

pub struct HostLoop<F> {
    listener: TcpListener,
    dispatcher: RequestDispatcher<F>,
    auth_key: Vec<u8>,
    state: HostState,
}

impl<F: TargetFactory> HostLoop<F> {
    /// Bind the listening socket. Failing to bind is fatal for the host.
    pub fn bind(addr: SocketAddr, factory: F) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| HostError::Bind { addr, source })?;
        tracing::info!("listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            dispatcher: RequestDispatcher::new(factory),
            auth_key: BRIDGE_AUTH_KEY.to_vec(),
            state: HostState::Idle,
        })
    }

    /// Replace the shared key used to authenticate clients.
    pub fn with_auth_key(mut self, key: &[u8]) -> Self {
        self.auth_key = key.to_vec();
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// Serve connections until a client sends `shutdown`.
    ///
    /// A connection that ends for any other reason (clean close, malformed
    /// message, I/O error, failed handshake) only sends the loop back to
    /// listening. The target outlives such disconnects.
    pub fn serve(mut self) -> Result<()> {
        loop {
            self.transition(HostState::Listening);

            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    continue;
                }
            };

            self.transition(HostState::Connected);
            tracing::info!(%peer, "connection accepted");
            let flow = self.serve_connection(stream, peer);
            self.transition(HostState::Disconnected);

            if flow == Flow::Shutdown {
                break;
            }
        }

        self.transition(HostState::Terminated);
        Ok(())
    }

    fn serve_connection(&mut self, stream: TcpStream, peer: SocketAddr) -> Flow {
        let mut channel = match MessageChannel::new(stream) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(%peer, "failed to set up connection: {e}");
                return Flow::Continue;
            }
        };

        if let Err(e) = self.authenticate(&mut channel) {
            tracing::warn!(%peer, "rejected connection: {e}");
            return Flow::Continue;
        }
        tracing::info!(%peer, "client authenticated");

        loop {
            let request: Request = match channel.recv() {
                Ok(Some(request)) => request,
                Ok(None) => {
                    tracing::info!(%peer, "client closed the connection");
                    return Flow::Continue;
                }
                Err(ProtocolError::Decode(e)) => {
                    tracing::warn!(%peer, "malformed request, dropping connection: {e}");
                    return Flow::Continue;
                }
                Err(e) => {
                    tracing::warn!(%peer, "connection lost: {e}");
                    return Flow::Continue;
                }
            };

            let (response, flow) = self.dispatcher.dispatch(&request);

            if let Err(e) = channel.send(&response) {
                tracing::warn!(%peer, method = %request.method, "failed to send response: {e}");
                return flow;
            }

            if flow == Flow::Shutdown {
                return Flow::Shutdown;
            }
        }
    }

    fn authenticate(&self, channel: &mut MessageChannel) -> std::result::Result<(), ProtocolError> {
        channel.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        accept_handshake(channel, &self.auth_key)?;
        channel.set_read_timeout(None)
    }

    fn transition(&mut self, next: HostState) {
        tracing::debug!(from = ?self.state, to = ?next, "host state");
        self.state = next;
    }
}
