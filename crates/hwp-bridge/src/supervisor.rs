//! Locating, spawning and terminating the helper process.

use std::env::consts::EXE_SUFFIX;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use crate::config::{BridgeConfig, ENV_HOST_EXE};
use crate::error::{BridgeError, Result};

/// File stem of the helper binary.
pub const HOST_BIN: &str = "hwp-bridge-host";

/// 32-bit Windows targets the helper is cross-compiled for.
const HOST_TARGETS: &[&str] = &["i686-pc-windows-msvc", "i686-pc-windows-gnu"];

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Starts the helper process for a session.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    exe: PathBuf,
    launcher: Option<PathBuf>,
    wine_prefix: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl ProcessSupervisor {
    /// Resolve the helper executable for `config`. Fails before anything is spawned.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Ok(Self {
            exe: locate_host(config)?,
            launcher: config.launcher.clone(),
            wine_prefix: config.wine_prefix.clone(),
            extra_args: config.extra_args.clone(),
        })
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// The full command line, program first.
    pub fn command_line(&self, port: u16) -> Vec<OsString> {
        let mut argv = Vec::new();
        if let Some(launcher) = &self.launcher {
            argv.push(launcher.clone().into_os_string());
        }
        argv.push(self.exe.clone().into_os_string());
        argv.extend(self.extra_args.iter().map(OsString::from));
        argv.push(port.to_string().into());
        argv
    }

    /// Spawn `[launcher] helper [extra args] <port>`.
    pub fn spawn(&self, port: u16) -> Result<HelperProcess> {
        let argv = self.command_line(port);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BridgeError::HelperNotFound { searched: vec![] })?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(prefix) = &self.wine_prefix {
            cmd.env("WINEPREFIX", prefix);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::HelperNotFound {
                    searched: vec![PathBuf::from(program)],
                }
            } else {
                BridgeError::SpawnFailed(e)
            }
        })?;
        tracing::info!(pid = child.id(), ?argv, "spawned helper");

        // Diagnostic only; nothing on these pipes is part of the protocol.
        if let Some(out) = child.stdout.take() {
            drain("stdout", out);
        }
        if let Some(err) = child.stderr.take() {
            drain("stderr", err);
        }

        Ok(HelperProcess {
            child,
            terminated: false,
        })
    }
}

fn drain(stream: &'static str, pipe: impl Read + Send + 'static) {
    let spawned = thread::Builder::new()
        .name(format!("{HOST_BIN}-{stream}"))
        .spawn(move || {
            for line in BufReader::new(pipe).lines().map_while(|l| l.ok()) {
                tracing::debug!(target: "hwp_bridge::helper", stream, "{line}");
            }
        });
    if let Err(e) = spawned {
        tracing::debug!("could not drain helper {stream}: {e}");
    }
}

/// A running helper process. Terminated on drop.
#[derive(Debug)]
pub struct HelperProcess {
    child: Child,
    terminated: bool,
}

impl HelperProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the process if it has not exited yet. Never blocks; safe to call twice.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = self.child.id(), %status, "helper already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("could not poll helper: {e}"),
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!(pid = self.child.id(), "kill failed: {e}");
        }
        let _ = self.child.try_wait();
        tracing::debug!(pid = self.child.id(), "helper terminated");
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Find the helper executable.
///
/// Search order: `config.host_exe`, `$HWP_BRIDGE_HOST`, next to the current
/// executable, then the 32-bit Windows cargo target directories.
pub fn locate_host(config: &BridgeConfig) -> Result<PathBuf> {
    if let Some(exe) = &config.host_exe {
        return if exe.is_file() {
            Ok(exe.clone())
        } else {
            Err(BridgeError::HelperNotFound {
                searched: vec![exe.clone()],
            })
        };
    }

    let mut searched = Vec::new();
    if let Some(exe) = std::env::var_os(ENV_HOST_EXE).filter(|v| !v.is_empty()) {
        searched.push(PathBuf::from(exe));
    }
    searched.extend(default_candidates());

    match searched.iter().find(|p| p.is_file()) {
        Some(found) => {
            tracing::debug!("using helper at {}", found.display());
            Ok(found.clone())
        }
        None => Err(BridgeError::HelperNotFound { searched }),
    }
}

fn file_names() -> Vec<String> {
    let mut names = vec![format!("{HOST_BIN}{EXE_SUFFIX}")];
    let windows_name = format!("{HOST_BIN}.exe");
    if !names.contains(&windows_name) {
        names.push(windows_name);
    }
    names
}

fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(mut exe) = std::env::current_exe() {
        exe.pop();
        for name in file_names() {
            candidates.push(exe.join(name));
        }
    }

    for target in HOST_TARGETS {
        for profile in ["release", "debug"] {
            candidates.push(
                PathBuf::from("target")
                    .join(target)
                    .join(profile)
                    .join(format!("{HOST_BIN}.exe")),
            );
        }
    }
    candidates
}

/// Convert a host filesystem path into the Windows path WINE shows the helper.
///
/// WINE maps `/` to `Z:\`, so `/home/user/doc.hwp` becomes `Z:\home\user\doc.hwp`.
pub fn to_wine_path(path: &Path) -> String {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    format!("Z:{}", abs.display()).replace('/', "\\")
}
