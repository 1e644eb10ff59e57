use std::net::{IpAddr, SocketAddr, TcpListener};

use crate::error::{BridgeError, Result};

/// Ask the OS for a currently unused TCP port on `host`.
///
/// The scratch socket is released before returning, so another process may in
/// principle claim the port before the helper binds it. The helper then fails
/// to start and the session surfaces as unreachable.
pub fn allocate_port(host: IpAddr) -> Result<u16> {
    let scratch = TcpListener::bind(SocketAddr::new(host, 0)).map_err(BridgeError::PortAllocation)?;
    let port = scratch
        .local_addr()
        .map_err(BridgeError::PortAllocation)?
        .port();
    tracing::debug!("allocated port {port}");
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_allocated_port_is_bindable() {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let port = allocate_port(host).unwrap();
        assert_ne!(port, 0);
        TcpListener::bind(SocketAddr::new(host, port)).unwrap();
    }

    #[test]
    fn test_unassignable_host_fails() {
        // TEST-NET-1 is never a local interface.
        let err = allocate_port(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))).unwrap_err();
        assert!(matches!(err, BridgeError::PortAllocation(_)));
    }
}
