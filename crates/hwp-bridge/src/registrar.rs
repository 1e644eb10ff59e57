//! One-time registration of the file path checker security module.
//!
//! The word processor asks the user for permission on every file access made
//! through automation unless a checker module is registered under a well-known
//! key. Registration is a check-then-act step run before the automation object
//! is created; it is idempotent and never fatal to the session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::supervisor::locate_host;

/// Persistent key/value store holding module registrations.
pub trait ModuleStore {
    fn lookup(&self, key: &str) -> Option<String>;
    fn store(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ModuleStore for MemoryStore {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(windows)]
pub use registry::RegistryStore;

#[cfg(windows)]
mod registry {
    use windows::core::HSTRING;
    use windows::Win32::System::Registry::{
        RegGetValueW, RegSetKeyValueW, HKEY_CURRENT_USER, REG_SZ, RRF_RT_REG_SZ,
    };

    use super::ModuleStore;
    use crate::error::{BridgeError, Result};

    /// Registry namespaces searched in order. Writes go to the first.
    pub const MODULE_NAMESPACES: &[&str] = &[
        r"Software\HNC\HwpAutomation\Modules",
        r"Software\Hnc\HwpUserAction\Modules",
    ];

    /// `HKEY_CURRENT_USER` registrations read by the word processor.
    #[derive(Debug, Clone, Default)]
    pub struct RegistryStore;

    impl ModuleStore for RegistryStore {
        fn lookup(&self, key: &str) -> Option<String> {
            MODULE_NAMESPACES.iter().find_map(|ns| read_string(ns, key))
        }

        fn store(&mut self, key: &str, value: &str) -> Result<()> {
            let data: Vec<u16> = value.encode_utf16().chain(std::iter::once(0)).collect();
            let status = unsafe {
                RegSetKeyValueW(
                    HKEY_CURRENT_USER,
                    &HSTRING::from(MODULE_NAMESPACES[0]),
                    &HSTRING::from(key),
                    REG_SZ.0,
                    Some(data.as_ptr().cast()),
                    (data.len() * 2) as u32,
                )
            };
            status
                .ok()
                .map_err(|e| BridgeError::Registrar(format!("writing {key}: {e}")))
        }
    }

    fn read_string(namespace: &str, key: &str) -> Option<String> {
        let subkey = HSTRING::from(namespace);
        let name = HSTRING::from(key);
        unsafe {
            let mut size = 0u32;
            RegGetValueW(
                HKEY_CURRENT_USER,
                &subkey,
                &name,
                RRF_RT_REG_SZ,
                None,
                None,
                Some(&mut size as *mut u32),
            )
            .ok()
            .ok()?;

            let mut buf = vec![0u16; (size as usize + 1) / 2];
            RegGetValueW(
                HKEY_CURRENT_USER,
                &subkey,
                &name,
                RRF_RT_REG_SZ,
                None,
                Some(buf.as_mut_ptr().cast()),
                Some(&mut size as *mut u32),
            )
            .ok()
            .ok()?;

            let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
            Some(String::from_utf16_lossy(&buf[..len]))
        }
    }
}

/// The store the word processor actually reads on this platform.
#[cfg(windows)]
pub type PlatformStore = RegistryStore;
#[cfg(not(windows))]
pub type PlatformStore = MemoryStore;

#[derive(Debug)]
pub struct SecurityModuleRegistrar<S> {
    store: S,
    key: String,
    candidates: Vec<PathBuf>,
}

impl<S: ModuleStore> SecurityModuleRegistrar<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            candidates: Vec::new(),
        }
    }

    /// Registrar using the configured key and the default module search.
    pub fn from_config(store: S, config: &BridgeConfig) -> Self {
        Self::new(store, config.module_key.clone()).with_candidates(module_candidates(config))
    }

    /// Places to look for the module DLL when none is registered, in order.
    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The registered module, if the registration points at an existing file.
    pub fn registered_path(&self) -> Option<PathBuf> {
        let path = PathBuf::from(self.store.lookup(&self.key)?);
        if path.is_file() {
            Some(path)
        } else {
            tracing::debug!(key = %self.key, "stale registration: {}", path.display());
            None
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered_path().is_some()
    }

    /// First candidate module that exists on disk.
    pub fn default_module(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|p| p.is_file()).cloned()
    }

    /// Register `path`. Returns `false` when the file does not exist.
    pub fn register_path(&mut self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            tracing::warn!("security module not found: {}", path.display());
            return Ok(false);
        }
        let value = path.to_string_lossy();
        if self.store.lookup(&self.key).as_deref() == Some(value.as_ref()) {
            return Ok(true);
        }
        self.store.store(&self.key, &value)?;
        tracing::info!(key = %self.key, "registered security module {}", path.display());
        Ok(true)
    }

    /// Make sure a module is registered, falling back to the default module.
    ///
    /// Returns `false` when nothing could be registered; that is not an error,
    /// the word processor will just prompt for file access.
    pub fn ensure_registered(&mut self) -> bool {
        if self.is_registered() {
            return true;
        }
        let Some(module) = self.default_module() else {
            tracing::debug!(key = %self.key, "no security module to register");
            return false;
        };
        match self.register_path(&module) {
            Ok(registered) => registered,
            Err(e) => {
                tracing::warn!("{e}");
                false
            }
        }
    }
}

impl SecurityModuleRegistrar<PlatformStore> {
    pub fn for_platform(config: &BridgeConfig) -> Self {
        Self::from_config(PlatformStore::default(), config)
    }
}

/// `config.security_module`, then `<key>.dll` next to the current executable,
/// then next to the helper executable.
pub fn module_candidates(config: &BridgeConfig) -> Vec<PathBuf> {
    let file_name = format!("{}.dll", config.module_key);
    let mut candidates = Vec::new();

    if let Some(explicit) = &config.security_module {
        candidates.push(explicit.clone());
    }
    if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(dir.join(&file_name));
    }
    if let Some(dir) = locate_host(config).ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(dir.join(&file_name));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn module_in(dir: &Path) -> PathBuf {
        let path = dir.join("FilePathCheckerModule.dll");
        std::fs::write(&path, b"MZ").unwrap();
        path
    }

    #[test]
    fn test_registers_default_module_once() {
        let dir = tempfile::tempdir().unwrap();
        let module = module_in(dir.path());

        let mut registrar = SecurityModuleRegistrar::new(MemoryStore::new(), "FilePathCheckerModule")
            .with_candidates(vec![dir.path().join("missing.dll"), module.clone()]);

        assert!(!registrar.is_registered());
        assert!(registrar.ensure_registered());
        assert!(registrar.ensure_registered());
        assert_eq!(registrar.registered_path(), Some(module));
        assert_eq!(registrar.store().len(), 1);
    }

    #[test]
    fn test_register_same_path_twice() {
        let dir = tempfile::tempdir().unwrap();
        let module = module_in(dir.path());
        let mut registrar = SecurityModuleRegistrar::new(MemoryStore::new(), "FilePathCheckerModule");

        assert!(registrar.register_path(&module).unwrap());
        assert!(registrar.register_path(&module).unwrap());
        assert_eq!(registrar.store().len(), 1);
    }

    #[test]
    fn test_missing_module_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut registrar = SecurityModuleRegistrar::new(MemoryStore::new(), "FilePathCheckerModule")
            .with_candidates(vec![dir.path().join("FilePathCheckerModule.dll")]);

        assert!(!registrar.ensure_registered());
        assert!(!registrar.register_path(&dir.path().join("nope.dll")).unwrap());
        assert!(registrar.store().is_empty());
    }

    #[test]
    fn test_stale_registration_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        store
            .store("FilePathCheckerModule", &dir.path().join("gone.dll").to_string_lossy())
            .unwrap();
        let module = module_in(dir.path());

        let mut registrar = SecurityModuleRegistrar::new(store, "FilePathCheckerModule")
            .with_candidates(vec![module.clone()]);
        assert_eq!(registrar.registered_path(), None);
        assert!(registrar.ensure_registered());
        assert_eq!(registrar.registered_path(), Some(module));
        assert_eq!(registrar.store().len(), 1);
    }

    #[test]
    fn test_explicit_module_is_first_candidate() {
        let config = BridgeConfig {
            security_module: Some(PathBuf::from("/opt/hwp/Checker.dll")),
            ..BridgeConfig::default()
        };
        assert_eq!(module_candidates(&config)[0], PathBuf::from("/opt/hwp/Checker.dll"));
    }
}
