//! Helper process side of the HWP bridge.
//!
//! The host binds a loopback TCP port, authenticates one client at a time and
//! answers each [`Request`](hwp_bridge_protocol::Request) against a single
//! live [`RemoteTarget`]. On Windows that target is the word processor's COM
//! automation object; everywhere else only the in-memory `memo` target exists.

pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod memo;
pub mod target;

#[cfg(windows)]
pub mod dispatch;
#[cfg(windows)]
pub mod hwp;

pub use dispatcher::{Flow, RequestDispatcher};
pub use error::{HostError, Result};
pub use listener::{HostLoop, HostState, HANDSHAKE_TIMEOUT};
pub use target::{Member, RemoteTarget, TargetError, TargetFactory, TargetResult};
