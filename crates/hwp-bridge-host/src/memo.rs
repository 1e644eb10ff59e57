//! `memo`: a plain-text document held in memory.
//!
//! Exposes a small slice of the word processor's surface so the whole bridge
//! (spawn, handshake, dispatch, teardown) can be exercised on machines without
//! the real application installed.

use hwp_bridge_protocol::{Kwargs, Value};

use crate::target::{
    bool_argument, str_argument, Member, RemoteTarget, TargetError, TargetResult,
};

const METHODS: &[&str] = &[
    "initialize",
    "is_initialized",
    "register_module",
    "insert_text",
    "get_text",
    "clear",
    "is_empty",
    "is_modified",
    "save_as",
    "set_visible",
    "quit",
];

const PROPERTIES: &[&str] = &[
    "version",
    "edit_mode",
    "visible",
    "page_count",
    "registered_modules",
];

#[derive(Debug, Default)]
pub struct MemoDocument {
    text: String,
    modified: bool,
    visible: bool,
    edit_mode: i64,
    /// `"<type>:<data>"` for every accepted `register_module`.
    modules: Vec<String>,
}

/// Factory for `create(visible=True, new_instance=True)`.
pub fn create(args: &[Value], kwargs: &Kwargs) -> TargetResult<Box<dyn RemoteTarget>> {
    let visible = bool_argument(args, kwargs, 0, "visible", true)?;
    // Accepted for signature parity; every memo document is a new instance.
    bool_argument(args, kwargs, 1, "new_instance", true)?;

    Ok(Box::new(MemoDocument {
        visible,
        edit_mode: 1,
        ..MemoDocument::default()
    }))
}

impl RemoteTarget for MemoDocument {
    fn resolve(&self, name: &str) -> Option<Member> {
        if METHODS.contains(&name) {
            Some(Member::Method)
        } else if PROPERTIES.contains(&name) {
            Some(Member::Property)
        } else {
            None
        }
    }

    fn invoke(&mut self, name: &str, args: &[Value], kwargs: &Kwargs) -> TargetResult<Value> {
        match name {
            "initialize" | "is_initialized" => Ok(Value::Bool(true)),
            "register_module" => {
                let module_type = str_argument(args, kwargs, 0, "module_type")?;
                let module_data = str_argument(args, kwargs, 1, "module_data")?;
                self.modules.push(format!("{module_type}:{module_data}"));
                Ok(Value::Bool(true))
            }
            "insert_text" => {
                let text = str_argument(args, kwargs, 0, "text")?;
                self.text.push_str(text);
                self.modified = true;
                Ok(Value::Bool(true))
            }
            "get_text" => Ok(Value::String(self.text.clone())),
            "clear" | "quit" => {
                self.text.clear();
                self.modified = false;
                Ok(Value::Bool(true))
            }
            "is_empty" => Ok(Value::Bool(self.text.is_empty())),
            "is_modified" => Ok(Value::Bool(self.modified)),
            "save_as" => {
                let path = str_argument(args, kwargs, 0, "filename")?;
                std::fs::write(path, &self.text)
                    .map_err(|e| TargetError::Failed(format!("cannot save to {path}: {e}")))?;
                self.modified = false;
                Ok(Value::Bool(true))
            }
            "set_visible" => {
                self.visible = bool_argument(args, kwargs, 0, "visible", true)?;
                Ok(Value::Bool(true))
            }
            other => Err(TargetError::Failed(format!("memo has no method {other}"))),
        }
    }

    fn get(&mut self, name: &str) -> TargetResult<Value> {
        match name {
            "version" => Ok(Value::String(format!("memo {}", env!("CARGO_PKG_VERSION")))),
            "edit_mode" => Ok(Value::Int(self.edit_mode)),
            "visible" => Ok(Value::Bool(self.visible)),
            "page_count" => Ok(Value::Int(1)),
            "registered_modules" => Ok(Value::from(self.modules.clone())),
            other => Err(TargetError::Failed(format!("memo has no property {other}"))),
        }
    }

    fn set(&mut self, name: &str, value: Value) -> TargetResult<()> {
        match name {
            "edit_mode" => {
                self.edit_mode = value.as_i64().ok_or_else(|| {
                    TargetError::InvalidArguments(format!(
                        "edit_mode must be an int, got {}",
                        value.type_name()
                    ))
                })?;
                Ok(())
            }
            "visible" => {
                self.visible = value.as_bool().ok_or_else(|| {
                    TargetError::InvalidArguments(format!(
                        "visible must be a bool, got {}",
                        value.type_name()
                    ))
                })?;
                Ok(())
            }
            other => Err(TargetError::ReadOnly(other.to_string())),
        }
    }
}
