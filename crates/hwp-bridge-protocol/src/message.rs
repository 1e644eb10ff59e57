//! Request and response messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::value::Value;

/// Builds the remote target from the request's arguments.
pub const METHOD_CREATE: &str = "create";
/// Drops the remote target, keeping the connection open.
pub const METHOD_DESTROY: &str = "destroy";
/// Drops the remote target and stops the host after the response is flushed.
pub const METHOD_SHUTDOWN: &str = "shutdown";

/// Names handled by the host itself. They never reach the remote target.
pub const RESERVED_METHODS: [&str; 3] = [METHOD_CREATE, METHOD_DESTROY, METHOD_SHUTDOWN];

/// Keyword arguments of a call.
pub type Kwargs = BTreeMap<String, Value>;

/// A call sent from the client to the host: `(method, args, kwargs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Member name on the remote target, or one of [`RESERVED_METHODS`].
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
        }
    }

    pub fn with_args(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            kwargs: Kwargs::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn create(args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            method: METHOD_CREATE.to_string(),
            args,
            kwargs,
        }
    }

    pub fn destroy() -> Self {
        Self::new(METHOD_DESTROY)
    }

    pub fn shutdown() -> Self {
        Self::new(METHOD_SHUTDOWN)
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_METHODS.contains(&self.method.as_str())
    }

    /// Check the invariants a request must satisfy before it is sent.
    pub fn validate(&self) -> Result<()> {
        if self.method.trim().is_empty() {
            return Err(ProtocolError::InvalidRequest(
                "method name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The target raised an error while resolving or running the member.
    #[default]
    Remote,
    /// No reserved name or target member matches the request.
    UnknownMethod,
    /// The request itself broke a protocol invariant.
    InvalidRequest,
}

/// The host's answer to exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok {
        #[serde(default)]
        value: Value,
    },
    Error {
        message: String,
        #[serde(default)]
        kind: FailureKind,
    },
}

impl Response {
    pub fn ok(value: impl Into<Value>) -> Self {
        Response::Ok {
            value: value.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
            kind: FailureKind::Remote,
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Response::Error {
            message: format!("Unknown method: {method}"),
            kind: FailureKind::UnknownMethod,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
            kind: FailureKind::InvalidRequest,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}
