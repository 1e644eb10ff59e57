//! Drive the HWP word processor's 32-bit automation object from a 64-bit process.
//!
//! The automation server can only be loaded by a 32-bit process, so this crate
//! spawns a helper (`hwp-bridge-host`, built for `i686-pc-windows-msvc` and run
//! natively or under WINE), connects to it over an authenticated loopback
//! socket and forwards every call.
//!
//! # Architecture
//!
//! ```text
//! Your Rust code (64-bit)
//!     └── Hwp (this crate)
//!           └── spawns: [wine] hwp-bridge-host.exe <port>
//!                 └── COM: HWPFrame.HwpObject
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use hwp_bridge::{BridgeConfig, Hwp};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hwp = Hwp::start(BridgeConfig::from_env())?;
//!     hwp.insert_text("Hello")?;
//!     println!("{}", hwp.get_text()?);
//!     hwp.save_as("hello.hwp", "HWP", "")?;
//!     hwp.shutdown();
//!     Ok(())
//! }
//! ```

mod config;
mod dialer;
mod error;
mod port;
mod proxy;
mod registrar;
mod session;
mod supervisor;

pub use config::{BridgeConfig, DEFAULT_MODULE_KEY, ENV_CONNECT_TIMEOUT_MS, ENV_HOST_EXE, ENV_LAUNCHER};
pub use dialer::Dialer;
pub use error::{BridgeError, Result};
pub use hwp_bridge_protocol::{Kwargs, Value};
pub use port::allocate_port;
pub use proxy::{Hwp, SECURITY_MODULE_TYPE};
#[cfg(windows)]
pub use registrar::RegistryStore;
pub use registrar::{module_candidates, MemoryStore, ModuleStore, PlatformStore, SecurityModuleRegistrar};
pub use session::BridgeSession;
pub use supervisor::{locate_host, to_wine_path, HelperProcess, ProcessSupervisor, HOST_BIN};
