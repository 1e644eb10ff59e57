//! The seam between the request dispatcher and whatever object it drives.
//!
//! The dispatcher knows nothing about the automation object's API. It asks the
//! live target whether a name is a method or a property and forwards the call;
//! everything else is up to the [`RemoteTarget`] implementation.

use hwp_bridge_protocol::{Kwargs, Value};
use thiserror::Error;

/// Errors raised by a target while running a member.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Property '{0}' is read-only")]
    ReadOnly(String),
}

pub type TargetResult<T> = std::result::Result<T, TargetError>;

impl From<String> for TargetError {
    fn from(message: String) -> Self {
        TargetError::Failed(message)
    }
}

/// What a name resolves to on the live target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Method,
    Property,
}

/// A stateful object whose members are looked up by name at call time.
pub trait RemoteTarget {
    /// Resolve `name` against the object, or `None` if it has no such member.
    fn resolve(&self, name: &str) -> Option<Member>;

    /// Call a method.
    fn invoke(&mut self, name: &str, args: &[Value], kwargs: &Kwargs) -> TargetResult<Value>;

    /// Read a property.
    fn get(&mut self, name: &str) -> TargetResult<Value>;

    /// Write a property.
    fn set(&mut self, name: &str, value: Value) -> TargetResult<()>;
}

/// Builds the target in answer to a `create` request.
pub trait TargetFactory {
    fn create(&mut self, args: &[Value], kwargs: &Kwargs) -> TargetResult<Box<dyn RemoteTarget>>;
}

impl<F> TargetFactory for F
where
    F: FnMut(&[Value], &Kwargs) -> TargetResult<Box<dyn RemoteTarget>>,
{
    fn create(&mut self, args: &[Value], kwargs: &Kwargs) -> TargetResult<Box<dyn RemoteTarget>> {
        self(args, kwargs)
    }
}

/// Look up an argument by position, falling back to its keyword name.
pub fn argument<'a>(
    args: &'a [Value],
    kwargs: &'a Kwargs,
    index: usize,
    name: &str,
) -> Option<&'a Value> {
    args.get(index).or_else(|| kwargs.get(name))
}

/// Optional boolean argument with a default.
pub fn bool_argument(
    args: &[Value],
    kwargs: &Kwargs,
    index: usize,
    name: &str,
    default: bool,
) -> TargetResult<bool> {
    match argument(args, kwargs, index, name) {
        None => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| {
            TargetError::InvalidArguments(format!("'{name}' must be a bool, got {}", v.type_name()))
        }),
    }
}

/// Required string argument.
pub fn str_argument<'a>(
    args: &'a [Value],
    kwargs: &'a Kwargs,
    index: usize,
    name: &str,
) -> TargetResult<&'a str> {
    match argument(args, kwargs, index, name) {
        Some(Value::String(s)) => Ok(s),
        Some(v) => Err(TargetError::InvalidArguments(format!(
            "'{name}' must be a string, got {}",
            v.type_name()
        ))),
        None => Err(TargetError::InvalidArguments(format!(
            "missing argument '{name}'"
        ))),
    }
}

/// Map a snake_case bridge name onto an automation member name
/// (`save_as` -> `SaveAs`). Names that already start upper-case pass through.
pub fn com_member_name(name: &str) -> String {
    if name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return name.to_string();
    }
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
