//! One authenticated connection to a helper, plus the helper process if we own it.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use hwp_bridge_protocol::{FailureKind, MessageChannel, ProtocolError, Request, Response, Value};

use crate::error::{BridgeError, Result};
use crate::supervisor::HelperProcess;

/// Strictly alternating request/response over a single channel.
///
/// The channel sits behind a mutex, so a session may be shared between
/// threads; requests from different threads are serialized. Once the channel
/// fails (peer gone, undecodable reply) it is dropped and every later request
/// fails with [`BridgeError::Closed`].
#[derive(Debug)]
pub struct BridgeSession {
    channel: Mutex<Option<MessageChannel>>,
    helper: Mutex<Option<HelperProcess>>,
    shutdown_grace: Duration,
}

impl BridgeSession {
    pub fn new(
        channel: MessageChannel,
        helper: Option<HelperProcess>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            channel: Mutex::new(Some(channel)),
            helper: Mutex::new(helper),
            shutdown_grace,
        }
    }

    /// Whether requests can still be sent.
    pub fn is_open(&self) -> bool {
        lock(&self.channel).is_some()
    }

    /// Whether this session spawned (and will terminate) its helper.
    pub fn owns_helper(&self) -> bool {
        lock(&self.helper).is_some()
    }

    /// Send one request and wait for its response.
    pub fn request(&self, request: &Request) -> Result<Value> {
        request.validate()?;

        let mut guard = lock(&self.channel);
        let channel = guard.as_mut().ok_or(BridgeError::Closed)?;

        let outcome = channel
            .send(request)
            .and_then(|()| channel.recv_required::<Response>());

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(method = %request.method, "bridge channel failed: {e}");
                *guard = None;
                return Err(if e.is_disconnect() {
                    BridgeError::Closed
                } else {
                    BridgeError::Protocol(e)
                });
            }
        };

        match response {
            Response::Ok { value } => Ok(value),
            Response::Error {
                message,
                kind: FailureKind::UnknownMethod,
            } => Err(BridgeError::UnknownOperation {
                method: request.method.clone(),
                message,
            }),
            Response::Error { message, .. } => Err(BridgeError::Remote {
                method: request.method.clone(),
                message,
            }),
        }
    }

    /// Best-effort teardown: ask the helper to shut down, close the socket,
    /// terminate the helper. Every step runs regardless of the others; errors
    /// are only logged. Safe to call more than once.
    pub fn close(&self) {
        if let Some(mut channel) = lock(&self.channel).take() {
            if let Err(e) = self.say_goodbye(&mut channel) {
                tracing::debug!("shutdown request not acknowledged: {e}");
            }
            if let Err(e) = channel.shutdown() {
                tracing::debug!("closing bridge socket: {e}");
            }
        }

        if let Some(mut helper) = lock(&self.helper).take() {
            helper.terminate();
        }
    }

    fn say_goodbye(&self, channel: &mut MessageChannel) -> std::result::Result<(), ProtocolError> {
        channel.set_read_timeout(Some(self.shutdown_grace))?;
        channel.send(&Request::shutdown())?;
        channel.recv_required::<Response>()?;
        Ok(())
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
