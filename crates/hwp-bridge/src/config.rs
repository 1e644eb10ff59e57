use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the helper executable.
pub const ENV_HOST_EXE: &str = "HWP_BRIDGE_HOST";
/// Environment variable naming a launcher for the helper (e.g. `wine`).
pub const ENV_LAUNCHER: &str = "HWP_BRIDGE_LAUNCHER";
pub const ENV_WINE_PREFIX: &str = "WINEPREFIX";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "HWP_BRIDGE_CONNECT_TIMEOUT_MS";

/// Registry value name (and default file stem) of the file path checker module.
pub const DEFAULT_MODULE_KEY: &str = "FilePathCheckerModule";

/// Configuration for a bridge session.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path to the `hwp-bridge-host` executable.
    /// If None, it is searched for next to the current binary and in cargo target dirs.
    pub host_exe: Option<PathBuf>,

    /// Program the helper is started through, such as `wine` on Linux.
    /// If None, the helper executable is run directly.
    pub launcher: Option<PathBuf>,

    /// Optional WINEPREFIX passed to the launcher.
    pub wine_prefix: Option<PathBuf>,

    /// Extra arguments placed before the port, e.g. `["--target", "memo"]`.
    pub extra_args: Vec<String>,

    /// Interface the helper listens on.
    pub host: IpAddr,

    /// How long to keep trying to reach a freshly spawned helper.
    pub connect_timeout: Duration,

    /// Pause between connection attempts.
    pub retry_interval: Duration,

    /// How long teardown waits for the helper to acknowledge `shutdown`.
    pub shutdown_grace: Duration,

    /// Show the word processor window.
    pub visible: bool,

    /// Always start a new automation server instead of attaching to a running one.
    pub new_instance: bool,

    /// Register the security module before the automation object is created.
    pub register_module: bool,

    /// Explicit location of the security module DLL.
    pub security_module: Option<PathBuf>,

    /// Name the security module is registered under.
    pub module_key: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_exe: None,
            launcher: None,
            wine_prefix: None,
            extra_args: Vec::new(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            connect_timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(500),
            visible: true,
            new_instance: true,
            register_module: true,
            security_module: None,
            module_key: DEFAULT_MODULE_KEY.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `HWP_BRIDGE_HOST`, `HWP_BRIDGE_LAUNCHER`,
    /// `WINEPREFIX` and `HWP_BRIDGE_CONNECT_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(exe) = non_empty(ENV_HOST_EXE) {
            config.host_exe = Some(PathBuf::from(exe));
        }
        if let Some(launcher) = non_empty(ENV_LAUNCHER) {
            config.launcher = Some(PathBuf::from(launcher));
        }
        if let Some(prefix) = non_empty(ENV_WINE_PREFIX) {
            config.wine_prefix = Some(PathBuf::from(prefix));
        }
        if let Some(ms) = non_empty(ENV_CONNECT_TIMEOUT_MS) {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.connect_timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!("ignoring {ENV_CONNECT_TIMEOUT_MS}={ms:?}: {e}"),
            }
        }
        config
    }

    /// Run the in-memory `memo` target instead of the word processor.
    pub fn with_memo_target(mut self) -> Self {
        self.extra_args = vec!["--target".to_string(), "memo".to_string()];
        self.register_module = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.host.is_loopback());
        assert!(config.visible && config.new_instance);
        assert_eq!(config.module_key, "FilePathCheckerModule");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_HOST_EXE, "/opt/hwp/hwp-bridge-host.exe"),
            (ENV_LAUNCHER, "wine"),
            (ENV_WINE_PREFIX, "/home/me/.wine32"),
            (ENV_CONNECT_TIMEOUT_MS, "2500"),
        ]
        .into_iter()
        .collect();

        let config = BridgeConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.host_exe, Some(PathBuf::from("/opt/hwp/hwp-bridge-host.exe")));
        assert_eq!(config.launcher, Some(PathBuf::from("wine")));
        assert_eq!(config.wine_prefix, Some(PathBuf::from("/home/me/.wine32")));
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_bad_timeout_keeps_default() {
        let config = BridgeConfig::from_lookup(|k| {
            (k == ENV_CONNECT_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
