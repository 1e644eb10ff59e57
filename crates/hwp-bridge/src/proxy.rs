//! `Hwp`: the caller-facing handle on a remote automation object.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use hwp_bridge_protocol::{Kwargs, Request, Value, RESERVED_METHODS};

use crate::config::BridgeConfig;
use crate::dialer::Dialer;
use crate::error::{BridgeError, Result};
use crate::port::allocate_port;
use crate::registrar::SecurityModuleRegistrar;
use crate::session::BridgeSession;
use crate::supervisor::{to_wine_path, ProcessSupervisor};

/// Module type the word processor uses for file-path check modules.
pub const SECURITY_MODULE_TYPE: &str = "FilePathCheckDLL";

/// Proxy for `HWPFrame.HwpObject` living in a helper process.
///
/// Every method turns into exactly one request and blocks until the helper
/// answers. Failures reported by the helper come back as
/// [`BridgeError::Remote`] or [`BridgeError::UnknownOperation`] carrying the
/// helper's message verbatim.
#[derive(Debug)]
pub struct Hwp {
    session: BridgeSession,
    created: AtomicBool,
    config: BridgeConfig,
}

impl Hwp {
    /// Spawn a helper, connect to it and create the automation object.
    pub fn start(config: BridgeConfig) -> Result<Self> {
        let supervisor = ProcessSupervisor::from_config(&config)?;
        let port = allocate_port(config.host)?;
        let mut helper = supervisor.spawn(port)?;

        let addr = SocketAddr::new(config.host, port);
        let dialer = Dialer::new(addr, config.connect_timeout).retry_interval(config.retry_interval);
        let channel = match dialer.connect() {
            Ok(channel) => channel,
            Err(e) => {
                helper.terminate();
                return Err(e);
            }
        };

        let session = BridgeSession::new(channel, Some(helper), config.shutdown_grace);
        let hwp = Self::with_session(session, config);
        hwp.create(
            vec![
                Value::Bool(hwp.config.visible),
                Value::Bool(hwp.config.new_instance),
            ],
            Kwargs::new(),
        )?;
        if hwp.config.register_module {
            hwp.auto_register_module();
        }
        Ok(hwp)
    }

    /// Connect to a helper that is already running at `addr`.
    ///
    /// The helper process is not owned; call [`Hwp::create`] before anything else.
    pub fn attach(addr: SocketAddr, config: BridgeConfig) -> Result<Self> {
        let channel = Dialer::new(addr, config.connect_timeout)
            .retry_interval(config.retry_interval)
            .connect()?;
        let session = BridgeSession::new(channel, None, config.shutdown_grace);
        Ok(Self::with_session(session, config))
    }

    fn with_session(session: BridgeSession, config: BridgeConfig) -> Self {
        Self {
            session,
            created: AtomicBool::new(false),
            config,
        }
    }

    pub fn session(&self) -> &BridgeSession {
        &self.session
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether a `create` is currently in effect.
    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    /// (Re)create the automation object, replacing any previous one.
    ///
    /// The helper drops the old object before building the new one, so a
    /// failed `create` leaves nothing created.
    pub fn create(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<()> {
        self.created.store(false, Ordering::SeqCst);
        self.session.request(&Request::create(args, kwargs))?;
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the automation object; the helper keeps running.
    pub fn destroy(&self) -> Result<()> {
        self.created.store(false, Ordering::SeqCst);
        self.session.request(&Request::destroy())?;
        Ok(())
    }

    /// Call a method by name with positional arguments.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.call_with(name, args, Kwargs::new())
    }

    /// Call a method by name with positional and keyword arguments.
    pub fn call_with(&self, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        if RESERVED_METHODS.contains(&name) {
            return Err(BridgeError::ReservedName(name.to_string()));
        }
        if !self.is_created() {
            return Err(BridgeError::NotCreated);
        }
        self.session.request(&Request {
            method: name.to_string(),
            args,
            kwargs,
        })
    }

    pub fn get_property(&self, name: &str) -> Result<Value> {
        self.call(name, Vec::new())
    }

    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.call(name, vec![value.into()])?;
        Ok(())
    }

    /// Shut the helper down and release everything. Errors are logged, not returned.
    pub fn shutdown(self) {
        self.created.store(false, Ordering::SeqCst);
        self.session.close();
    }

    /// Path as the helper sees it (translated when running under a launcher such as WINE).
    fn host_path(&self, path: &Path) -> String {
        if self.config.launcher.is_some() {
            to_wine_path(path)
        } else {
            path.display().to_string()
        }
    }

    // -- lifecycle --

    pub fn initialize(&self) -> Result<Value> {
        self.call("initialize", vec![])
    }

    pub fn is_initialized(&self) -> Result<Value> {
        self.call("is_initialized", vec![])
    }

    /// Register a security module with the automation object.
    ///
    /// `module_data` may be `None` (use the default module), a path to the
    /// module DLL (registered locally first) or the name of an existing
    /// registration. Answers `false` without contacting the helper when the
    /// module cannot be found.
    pub fn register_module(&self, module_type: &str, module_data: Option<&str>) -> Result<Value> {
        let key = self.config.module_key.clone();
        let mut registrar = SecurityModuleRegistrar::for_platform(&self.config);

        let data = match module_data {
            Some(data) => data.to_string(),
            None => match registrar.default_module() {
                Some(module) => module.to_string_lossy().into_owned(),
                None if registrar.is_registered() => {
                    return self.call("register_module", vec![module_type.into(), key.into()]);
                }
                None => return Ok(Value::Bool(false)),
            },
        };

        if data.contains(['/', '\\']) {
            match registrar.register_path(Path::new(&data)) {
                Ok(true) => {}
                Ok(false) => return Ok(Value::Bool(false)),
                Err(e) => {
                    tracing::warn!("{e}");
                    return Ok(Value::Bool(false));
                }
            }
            self.call("register_module", vec![module_type.into(), key.into()])
        } else {
            self.call("register_module", vec![module_type.into(), data.into()])
        }
    }

    /// Register the configured (or default) security module locally, then
    /// hand its key to the automation object.
    ///
    /// Best-effort: failures are logged and reported as `false`.
    pub fn auto_register_module(&self) -> bool {
        let mut registrar = SecurityModuleRegistrar::for_platform(&self.config);
        if !registrar.ensure_registered() {
            tracing::info!("no security module registered; file access may prompt");
            return false;
        }
        let args = vec![
            SECURITY_MODULE_TYPE.into(),
            self.config.module_key.clone().into(),
        ];
        match self.call("register_module", args) {
            Ok(Value::Bool(true)) => true,
            Ok(other) => {
                tracing::warn!(answer = %other, "security module not accepted");
                false
            }
            Err(e) => {
                tracing::warn!("announcing security module failed: {e}");
                false
            }
        }
    }

    pub fn quit(&self, save: bool) -> Result<Value> {
        self.call("quit", vec![save.into()])
    }

    // -- files --

    pub fn open(&self, filename: impl AsRef<Path>, format: &str, arg: &str) -> Result<Value> {
        let path = self.host_path(filename.as_ref());
        self.call("open", vec![path.into(), format.into(), arg.into()])
    }

    pub fn save(&self, save_if_dirty: bool) -> Result<Value> {
        self.call("save", vec![save_if_dirty.into()])
    }

    pub fn save_as(&self, filename: impl AsRef<Path>, format: &str, arg: &str) -> Result<Value> {
        let path = self.host_path(filename.as_ref());
        self.call("save_as", vec![path.into(), format.into(), arg.into()])
    }

    pub fn clear(&self, option: i32) -> Result<Value> {
        self.call("clear", vec![option.into()])
    }

    pub fn close(&self, is_dirty: bool) -> Result<Value> {
        self.call("close", vec![is_dirty.into()])
    }

    // -- text --

    pub fn insert_text(&self, text: &str) -> Result<Value> {
        self.call("insert_text", vec![text.into()])
    }

    pub fn get_text(&self) -> Result<Value> {
        self.call("get_text", vec![])
    }

    pub fn get_selected_text(&self, keep_select: bool) -> Result<Value> {
        self.call("get_selected_text", vec![keep_select.into()])
    }

    // -- caret --

    pub fn get_pos(&self) -> Result<Value> {
        self.call("get_pos", vec![])
    }

    pub fn set_pos(&self, list: i32, para: i32, pos: i32) -> Result<Value> {
        self.call("set_pos", vec![list.into(), para.into(), pos.into()])
    }

    pub fn move_pos(&self, move_id: i32, para: i32, pos: i32) -> Result<Value> {
        self.call("move_pos", vec![move_id.into(), para.into(), pos.into()])
    }

    // -- window --

    pub fn set_visible(&self, visible: bool) -> Result<Value> {
        self.call("set_visible", vec![visible.into()])
    }

    pub fn maximize_window(&self) -> Result<Value> {
        self.call("maximize_window", vec![])
    }

    pub fn minimize_window(&self) -> Result<Value> {
        self.call("minimize_window", vec![])
    }

    // -- state --

    pub fn is_empty(&self) -> Result<Value> {
        self.call("is_empty", vec![])
    }

    pub fn is_modified(&self) -> Result<Value> {
        self.call("is_modified", vec![])
    }

    pub fn is_cell(&self) -> Result<Value> {
        self.call("is_cell", vec![])
    }

    // -- search --

    pub fn find(
        &self,
        text: &str,
        forward: bool,
        match_case: bool,
        regex: bool,
        replace_mode: bool,
    ) -> Result<Value> {
        self.call(
            "find",
            vec![
                text.into(),
                forward.into(),
                match_case.into(),
                regex.into(),
                replace_mode.into(),
            ],
        )
    }

    pub fn replace(
        &self,
        find_text: &str,
        replace_text: &str,
        forward: bool,
        match_case: bool,
        regex: bool,
    ) -> Result<Value> {
        self.call(
            "replace",
            vec![
                find_text.into(),
                replace_text.into(),
                forward.into(),
                match_case.into(),
                regex.into(),
            ],
        )
    }

    pub fn replace_all(
        &self,
        find_text: &str,
        replace_text: &str,
        match_case: bool,
        regex: bool,
    ) -> Result<Value> {
        self.call(
            "replace_all",
            vec![
                find_text.into(),
                replace_text.into(),
                match_case.into(),
                regex.into(),
            ],
        )
    }

    /// Run a named editor action (e.g. `"MoveDocEnd"`).
    pub fn run(&self, action: &str) -> Result<Value> {
        self.call("run", vec![action.into()])
    }

    // -- properties --

    pub fn version(&self) -> Result<Value> {
        self.get_property("version")
    }

    pub fn build_number(&self) -> Result<Value> {
        self.get_property("build_number")
    }

    pub fn current_page(&self) -> Result<Value> {
        self.get_property("current_page")
    }

    pub fn page_count(&self) -> Result<Value> {
        self.get_property("page_count")
    }

    pub fn edit_mode(&self) -> Result<Value> {
        self.get_property("edit_mode")
    }

    pub fn set_edit_mode(&self, mode: impl Into<Value>) -> Result<()> {
        self.set_property("edit_mode", mode)
    }
}
