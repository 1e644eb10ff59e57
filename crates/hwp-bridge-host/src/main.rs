//! `hwp-bridge-host`: the helper process spawned by the bridge client.
//!
//! Built for 32-bit Windows (`--target i686-pc-windows-msvc`) so it can load
//! the HWP automation server, and run directly or under WINE.
//!
//! Usage: `hwp-bridge-host [--target hwp|memo] [--bind HOST] <PORT>`
//!
//! Diagnostic output goes to stderr only.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use hwp_bridge_host::{HostError, HostLoop, Result, TargetFactory};

#[derive(Parser, Debug)]
#[command(name = "hwp-bridge-host")]
#[command(version, about = "Serve HWP automation requests over an authenticated local socket")]
struct Args {
    /// Port to listen on
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// Object created in answer to `create`
    #[arg(long, value_enum, default_value_t = Target::Hwp)]
    target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    /// The HWPFrame.HwpObject COM server (Windows only)
    Hwp,
    /// An in-memory text document
    Memo,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(args.bind, args.port);

    let outcome = match args.target {
        Target::Memo => serve(addr, hwp_bridge_host::memo::create),
        Target::Hwp => serve_hwp(addr),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn serve<F: TargetFactory>(addr: SocketAddr, factory: F) -> Result<()> {
    HostLoop::bind(addr, factory)?.serve()
}

#[cfg(windows)]
fn serve_hwp(addr: SocketAddr) -> Result<()> {
    use hwp_bridge_host::dispatch::{initialize_apartment, uninitialize_apartment};

    initialize_apartment().map_err(HostError::Com)?;
    let outcome = serve(addr, hwp_bridge_host::hwp::create);
    uninitialize_apartment();
    outcome
}

#[cfg(not(windows))]
fn serve_hwp(_addr: SocketAddr) -> Result<()> {
    Err(HostError::Unsupported(
        "the hwp target needs Windows (build with --target i686-pc-windows-msvc, run under WINE); \
         use --target memo elsewhere"
            .to_string(),
    ))
}
