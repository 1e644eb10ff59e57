#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hwp_bridge::BridgeConfig;
use hwp_bridge_host::{memo, HostLoop};

/// Run a `memo` host on a background thread.
pub fn start_host(key: Option<&'static [u8]>) -> (SocketAddr, JoinHandle<hwp_bridge_host::Result<()>>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut host = HostLoop::bind("127.0.0.1:0".parse().unwrap(), memo::create)?;
        if let Some(key) = key {
            host = host.with_auth_key(key);
        }
        tx.send(host.local_addr()?).unwrap();
        host.serve()
    });
    (rx.recv().unwrap(), handle)
}

pub fn quick_config() -> BridgeConfig {
    BridgeConfig {
        connect_timeout: Duration::from_secs(2),
        retry_interval: Duration::from_millis(20),
        register_module: false,
        ..BridgeConfig::default()
    }
}
