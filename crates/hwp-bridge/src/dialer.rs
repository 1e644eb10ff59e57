//! Client side of connection setup: connect, retrying until the helper is up.

use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use hwp_bridge_protocol::{initiate_handshake, MessageChannel, ProtocolError, BRIDGE_AUTH_KEY};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct Dialer {
    pub addr: SocketAddr,
    pub timeout: Duration,
    pub retry_interval: Duration,
    auth_key: Vec<u8>,
}

impl Dialer {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            retry_interval: Duration::from_millis(100),
            auth_key: BRIDGE_AUTH_KEY.to_vec(),
        }
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Replace the shared key presented to the host.
    pub fn auth_key(mut self, key: &[u8]) -> Self {
        self.auth_key = key.to_vec();
        self
    }

    /// Connect and authenticate, retrying until `timeout` has elapsed.
    ///
    /// Refused connections and transport errors are retried. A host that
    /// explicitly rejects the shared key is not, since retrying cannot help.
    pub fn connect(&self) -> Result<MessageChannel> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!(addr = %self.addr, attempts, "giving up");
                return Err(BridgeError::Unreachable {
                    addr: self.addr,
                    timeout: self.timeout,
                });
            }
            attempts += 1;

            match self.attempt(remaining) {
                Ok(channel) => {
                    tracing::info!(addr = %self.addr, attempts, "connected to helper");
                    return Ok(channel);
                }
                Err(ProtocolError::AuthenticationFailed(msg)) => {
                    return Err(BridgeError::Authentication(msg));
                }
                Err(e) => tracing::trace!(addr = %self.addr, "connect attempt failed: {e}"),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(self.retry_interval.min(remaining));
        }
    }

    fn attempt(&self, budget: Duration) -> std::result::Result<MessageChannel, ProtocolError> {
        let stream = TcpStream::connect_timeout(&self.addr, budget)?;
        let mut channel = MessageChannel::new(stream)?;
        channel.set_read_timeout(Some(budget))?;
        initiate_handshake(&mut channel, &self.auth_key)?;
        channel.set_read_timeout(None)?;
        Ok(channel)
    }
}
