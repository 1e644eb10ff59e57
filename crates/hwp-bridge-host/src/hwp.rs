//! HWP-specific COM automation layer built on top of the generic IDispatch wrapper.
//!
//! Most names are forwarded as-is to `HWPFrame.HwpObject` after mapping them
//! to the automation naming (`save_as` -> `SaveAs`). A handful of operations
//! have no single automation member and are composed from `HAction`,
//! `HParameterSet` and `XHwpWindows` here.

#![cfg(windows)]

use windows::Win32::System::{
    Com::{CLSCTX_ALL, CLSCTX_LOCAL_SERVER},
    Variant::VARIANT,
};

use hwp_bridge_protocol::{Kwargs, Value};

use crate::dispatch::{
    variant_bool, variant_dispatch, variant_empty, variant_f64, variant_get_bool,
    variant_get_dispatch, variant_get_f64, variant_get_i64, variant_get_string, variant_i32,
    variant_is_empty, variant_is_error, variant_str, variant_vt, DispatchObject, MemberKind,
};
use crate::target::{
    bool_argument, com_member_name, str_argument, Member, RemoteTarget, TargetError, TargetResult,
};

pub const PROG_ID: &str = "HWPFrame.HwpObject";

const COMPOSITES: &[&str] = &[
    "initialize",
    "is_initialized",
    "quit",
    "insert_text",
    "get_pos",
    "get_selected_text",
    "set_visible",
    "maximize_window",
    "minimize_window",
    "close",
    "is_cell",
    "find",
    "replace",
    "replace_all",
    "run",
];

/// A live `HWPFrame.HwpObject` instance.
pub struct HwpObject {
    app: DispatchObject,
}

/// Factory for `create(visible=True, new_instance=True)`.
///
/// A new instance is always started out-of-process; otherwise COM is free to
/// hand back a running server.
pub fn create(args: &[Value], kwargs: &Kwargs) -> TargetResult<Box<dyn RemoteTarget>> {
    let visible = bool_argument(args, kwargs, 0, "visible", true)?;
    let new_instance = bool_argument(args, kwargs, 1, "new_instance", true)?;

    let context = if new_instance {
        CLSCTX_LOCAL_SERVER
    } else {
        CLSCTX_ALL
    };
    let app = DispatchObject::create_from_progid(PROG_ID, context)?;
    let hwp = HwpObject { app };

    // Text insertion needs edit mode.
    hwp.app.set_property("EditMode", variant_i32(1))?;
    if let Err(e) = hwp.set_visible(visible) {
        tracing::warn!("could not set window visibility: {e}");
    }

    tracing::info!(visible, new_instance, "{PROG_ID} created");
    Ok(Box::new(hwp))
}

impl HwpObject {
    fn action(&self, name: &str) -> Result<bool, String> {
        let action = self.app.get_child("HAction")?;
        let result = action.invoke_method("Run", &[variant_str(name)])?;
        Ok(variant_get_bool(&result).unwrap_or(true))
    }

    fn insert_text(&self, text: &str) -> Result<bool, String> {
        let action = self.app.get_child("HAction")?;
        let params = self.app.get_child("HParameterSet")?.get_child("HInsertText")?;
        let set = params.get_child("HSet")?;

        action.invoke_method(
            "GetDefault",
            &[variant_str("InsertText"), variant_dispatch(&set)],
        )?;
        params.set_property("Text", variant_str(text))?;
        let result = action.invoke_method(
            "Execute",
            &[variant_str("InsertText"), variant_dispatch(&set)],
        )?;
        Ok(variant_get_bool(&result).unwrap_or(true))
    }

    /// Current caret position as `[list, para, pos]`.
    fn position(&self) -> Result<Value, String> {
        let set = self.app.get_child_from_call("GetPosBySet")?;
        let mut parts = Vec::with_capacity(3);
        for item in ["List", "Para", "Pos"] {
            let v = set.invoke_method("Item", &[variant_str(item)])?;
            parts.push(Value::Int(variant_get_i64(&v).unwrap_or(0)));
        }
        Ok(Value::List(parts))
    }

    /// Save or discard the document, then quit the application.
    fn quit(&self, save: bool) -> Result<(), String> {
        if save {
            self.app.invoke_method("Save", &[variant_bool(true)])?;
        } else {
            let document = self
                .app
                .get_child("XHwpDocuments")?
                .get_child("Active_XHwpDocument")?;
            // 1 discards unsaved changes.
            document.invoke_method("Clear", &[variant_i32(1)])?;
        }
        self.app.invoke_method("Quit", &[])?;
        Ok(())
    }

    fn active_window(&self) -> Result<DispatchObject, String> {
        let windows = self.app.get_child("XHwpWindows")?;
        windows
            .get_child("Active_XHwpWindow")
            .or_else(|_| windows.get_indexed("Item", &variant_i32(0)))
    }

    fn set_visible(&self, visible: bool) -> Result<(), String> {
        self.active_window()?
            .set_property("Visible", variant_bool(visible))
    }

    fn is_cell(&self) -> Result<bool, String> {
        let parent = self.app.get_property("ParentCtrl")?;
        Ok(variant_get_dispatch(&parent).is_some())
    }

    fn close(&self, is_dirty: bool) -> Result<bool, String> {
        self.app.set_property("IsModified", variant_bool(is_dirty))?;
        self.action("FileClose")
    }

    fn selected_text(&self) -> Result<String, String> {
        let text = self
            .app
            .invoke_method("GetTextFile", &[variant_str("TEXT"), variant_str("saveblock")])?;
        Ok(variant_get_string(&text).unwrap_or_default())
    }

    /// Run the find/replace dialog action `action_id` non-interactively.
    fn find_replace(&self, action_id: &str, search: &Search<'_>) -> Result<bool, String> {
        let action = self.app.get_child("HAction")?;
        let params = self
            .app
            .get_child("HParameterSet")?
            .get_child("HFindReplace")?;
        let set = params.get_child("HSet")?;

        action.invoke_method("GetDefault", &[variant_str("FindDlg"), variant_dispatch(&set)])?;
        params.set_property("FindString", variant_str(search.text))?;
        if let Some(replacement) = search.replacement {
            params.set_property("ReplaceString", variant_str(replacement))?;
        }
        params.set_property("MatchCase", variant_bool(search.match_case))?;
        params.set_property("FindRegExp", variant_bool(search.regex))?;
        params.set_property("Direction", variant_i32(if search.forward { 0 } else { 1 }))?;
        params.set_property("IgnoreMessage", variant_bool(true))?;
        params.set_property("ReplaceMode", variant_bool(search.replacement.is_some()))?;

        let result =
            action.invoke_method("Execute", &[variant_str(action_id), variant_dispatch(&set)])?;
        Ok(variant_get_bool(&result).unwrap_or(false))
    }

    fn composite(&self, name: &str, args: &[Value], kwargs: &Kwargs) -> TargetResult<Value> {
        let value = match name {
            "initialize" => {
                self.app.set_property("EditMode", variant_i32(1))?;
                Value::Bool(true)
            }
            "is_initialized" => Value::Bool(true),
            "quit" => {
                self.quit(bool_argument(args, kwargs, 0, "save", false)?)?;
                Value::Bool(true)
            }
            "get_pos" => self.position()?,
            "insert_text" => Value::Bool(self.insert_text(str_argument(args, kwargs, 0, "text")?)?),
            "get_selected_text" => Value::String(self.selected_text()?),
            "set_visible" => {
                self.set_visible(bool_argument(args, kwargs, 0, "visible", true)?)?;
                Value::Bool(true)
            }
            "maximize_window" => Value::Bool(self.action("WindowMaximize")?),
            "minimize_window" => Value::Bool(self.action("WindowMinimize")?),
            "close" => Value::Bool(self.close(bool_argument(args, kwargs, 0, "is_dirty", false)?)?),
            "is_cell" => Value::Bool(self.is_cell()?),
            "run" => Value::Bool(self.action(str_argument(args, kwargs, 0, "action")?)?),
            "find" => {
                let search = Search {
                    text: str_argument(args, kwargs, 0, "text")?,
                    replacement: None,
                    forward: bool_argument(args, kwargs, 1, "forward", true)?,
                    match_case: bool_argument(args, kwargs, 2, "match_case", false)?,
                    regex: bool_argument(args, kwargs, 3, "regex", false)?,
                };
                Value::Bool(self.find_replace("RepeatFind", &search)?)
            }
            "replace" => {
                let search = Search {
                    text: str_argument(args, kwargs, 0, "find_text")?,
                    replacement: Some(str_argument(args, kwargs, 1, "replace_text")?),
                    forward: bool_argument(args, kwargs, 2, "forward", true)?,
                    match_case: bool_argument(args, kwargs, 3, "match_case", false)?,
                    regex: bool_argument(args, kwargs, 4, "regex", false)?,
                };
                Value::Bool(self.find_replace("ExecReplace", &search)?)
            }
            "replace_all" => {
                let search = Search {
                    text: str_argument(args, kwargs, 0, "find_text")?,
                    replacement: Some(str_argument(args, kwargs, 1, "replace_text")?),
                    forward: true,
                    match_case: bool_argument(args, kwargs, 2, "match_case", false)?,
                    regex: bool_argument(args, kwargs, 3, "regex", false)?,
                };
                Value::Bool(self.find_replace("AllReplace", &search)?)
            }
            other => return Err(TargetError::Failed(format!("no composite operation {other}"))),
        };
        Ok(value)
    }
}

struct Search<'a> {
    text: &'a str,
    replacement: Option<&'a str>,
    forward: bool,
    match_case: bool,
    regex: bool,
}

impl RemoteTarget for HwpObject {
    fn resolve(&self, name: &str) -> Option<Member> {
        if COMPOSITES.contains(&name) {
            return Some(Member::Method);
        }
        match self.app.member_kind(&com_member_name(name))? {
            MemberKind::Method => Some(Member::Method),
            MemberKind::Property => Some(Member::Property),
        }
    }

    fn invoke(&mut self, name: &str, args: &[Value], kwargs: &Kwargs) -> TargetResult<Value> {
        if COMPOSITES.contains(&name) {
            return self.composite(name, args, kwargs);
        }
        if let Some(key) = kwargs.keys().next() {
            // IDispatch named arguments need DISPIDs we do not resolve.
            return Err(TargetError::InvalidArguments(format!(
                "keyword argument '{key}' is not supported by {PROG_ID}"
            )));
        }

        let member = com_member_name(name);
        let variants = args
            .iter()
            .map(value_to_variant)
            .collect::<TargetResult<Vec<_>>>()?;
        let result = self.app.call(&member, &variants)?;
        variant_to_value(&result, &member)
    }

    fn get(&mut self, name: &str) -> TargetResult<Value> {
        let member = com_member_name(name);
        let result = self.app.get_property(&member)?;
        variant_to_value(&result, &member)
    }

    fn set(&mut self, name: &str, value: Value) -> TargetResult<()> {
        let variant = value_to_variant(&value)?;
        self.app.set_property(&com_member_name(name), variant)?;
        Ok(())
    }
}

impl Drop for HwpObject {
    fn drop(&mut self) {
        tracing::debug!("releasing {PROG_ID}");
    }
}

// -- Value <-> VARIANT conversion --

fn value_to_variant(value: &Value) -> TargetResult<VARIANT> {
    match value {
        Value::Null => Ok(variant_empty()),
        Value::Bool(b) => Ok(variant_bool(*b)),
        Value::Int(n) => Ok(match i32::try_from(*n) {
            Ok(small) => variant_i32(small),
            Err(_) => variant_f64(*n as f64),
        }),
        Value::Float(f) => Ok(variant_f64(*f)),
        Value::String(s) => Ok(variant_str(s)),
        Value::List(_) | Value::Map(_) => Err(TargetError::InvalidArguments(format!(
            "{} values cannot be passed to {PROG_ID}",
            value.type_name()
        ))),
    }
}

fn variant_to_value(v: &VARIANT, member: &str) -> TargetResult<Value> {
    if variant_is_empty(v) {
        Ok(Value::Null)
    } else if let Some(b) = variant_get_bool(v) {
        Ok(Value::Bool(b))
    } else if let Some(n) = variant_get_i64(v) {
        Ok(Value::Int(n))
    } else if let Some(f) = variant_get_f64(v) {
        Ok(Value::Float(f))
    } else if let Some(s) = variant_get_string(v) {
        Ok(Value::String(s))
    } else if variant_is_error(v) {
        Err(TargetError::Failed(format!("{member} returned an error value")))
    } else if variant_get_dispatch(v).is_some() {
        Err(TargetError::Failed(format!(
            "{member} returned an automation object, which cannot cross the bridge"
        )))
    } else {
        Err(TargetError::Failed(format!(
            "{member} returned an unsupported VARIANT (VT={})",
            variant_vt(v)
        )))
    }
}
