//! Shared protocol types for communication between the 64-bit client and the
//! 32-bit helper process that hosts the HWP automation object.
//!
//! The protocol is JSON-over-TCP: one JSON document per line in each direction.
//! A connection starts with a mutual challenge/response handshake keyed with
//! [`BRIDGE_AUTH_KEY`], after which the client sends [`Request`]s and the host
//! answers each one with exactly one [`Response`], in order.
//!
//! ```text
//! client                                host
//!   | <---------- challenge ------------- |
//!   | ----------- answer ---------------> |
//!   | <---------- welcome --------------- |
//!   | ----------- challenge ------------> |
//!   | <---------- answer ---------------- |
//!   | ----------- welcome --------------> |
//!   | ----------- request --------------> |
//!   | <---------- response -------------- |
//!   |                ...                  |
//! ```

pub mod auth;
pub mod codec;
pub mod error;
pub mod message;
pub mod value;

pub use auth::{accept_handshake, initiate_handshake, BRIDGE_AUTH_KEY};
pub use codec::MessageChannel;
pub use error::{ProtocolError, Result};
pub use message::{
    FailureKind, Kwargs, Request, Response, METHOD_CREATE, METHOD_DESTROY, METHOD_SHUTDOWN,
    RESERVED_METHODS,
};
pub use value::Value;
