//! Dialing, authentication and channel failure handling.

mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::{Duration, Instant};

use hwp_bridge::{allocate_port, BridgeConfig, BridgeError, BridgeSession, Dialer, Hwp, Kwargs};
use hwp_bridge_protocol::{accept_handshake, MessageChannel, Request, BRIDGE_AUTH_KEY};

use common::{quick_config, start_host};

#[test]
fn test_unreachable_within_deadline() {
    let port = allocate_port("127.0.0.1".parse().unwrap()).unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let started = Instant::now();
    let err = Dialer::new(addr, Duration::from_millis(300))
        .retry_interval(Duration::from_millis(20))
        .connect()
        .unwrap_err();

    assert!(matches!(err, BridgeError::Unreachable { addr: a, .. } if a == addr));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_unreachable_with_zero_retry_interval_honors_full_deadline() {
    let port = allocate_port("127.0.0.1".parse().unwrap()).unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let deadline = Duration::from_secs(10);

    let started = Instant::now();
    let err = Dialer::new(addr, deadline)
        .retry_interval(Duration::ZERO)
        .connect()
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, BridgeError::Unreachable { timeout, .. } if timeout == deadline));
    assert!(elapsed >= deadline, "gave up after {elapsed:?}");
    assert!(elapsed < deadline + Duration::from_secs(3), "overran: {elapsed:?}");
}

#[test]
fn test_connects_once_host_comes_up() {
    let port = allocate_port("127.0.0.1".parse().unwrap()).unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let late = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        let listener = TcpListener::bind(addr).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let mut channel = MessageChannel::new(stream).unwrap();
        accept_handshake(&mut channel, BRIDGE_AUTH_KEY).unwrap();
    });

    Dialer::new(addr, Duration::from_secs(5))
        .retry_interval(Duration::from_millis(20))
        .connect()
        .unwrap();
    late.join().unwrap();
}

#[test]
fn test_wrong_key_fails_without_retrying() {
    let (addr, host) = start_host(Some(b"someone-else"));

    let started = Instant::now();
    let err = Dialer::new(addr, Duration::from_secs(10)).connect().unwrap_err();
    assert!(matches!(err, BridgeError::Authentication(_)));
    assert!(started.elapsed() < Duration::from_secs(5));

    // Shut the host down with its own key.
    let mut channel = Dialer::new(addr, Duration::from_secs(2))
        .auth_key(b"someone-else")
        .connect()
        .unwrap();
    channel.send(&Request::shutdown()).unwrap();
    host.join().unwrap().unwrap();
}

#[test]
fn test_undecodable_reply_closes_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut channel = MessageChannel::new(stream).unwrap();
        accept_handshake(&mut channel, BRIDGE_AUTH_KEY).unwrap();

        // Answer the first request with something that is not a response.
        let _ = channel.recv::<Request>().unwrap();
        writer.write_all(b"this is not json\n").unwrap();

        // Wait for the client to hang up.
        let mut rest = String::new();
        let _ = BufReader::new(writer).read_line(&mut rest);
    });

    let channel = Dialer::new(addr, Duration::from_secs(2)).connect().unwrap();
    let session = BridgeSession::new(channel, None, Duration::from_millis(100));

    let err = session.request(&Request::create(vec![], Kwargs::new())).unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)));
    assert!(!session.is_open());
    assert!(matches!(
        session.request(&Request::new("get_text")),
        Err(BridgeError::Closed)
    ));

    drop(session);
    server.join().unwrap();
}

#[test]
fn test_calls_after_close_fail_with_closed() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    hwp.session().close();
    host.join().unwrap().unwrap();

    assert!(matches!(hwp.get_text(), Err(BridgeError::Closed)));
}

#[test]
fn test_start_without_helper_fails_before_spawning() {
    let config = BridgeConfig {
        host_exe: Some("/definitely/missing/hwp-bridge-host.exe".into()),
        register_module: false,
        ..BridgeConfig::default()
    };
    assert!(matches!(
        Hwp::start(config),
        Err(BridgeError::HelperNotFound { .. })
    ));
}
