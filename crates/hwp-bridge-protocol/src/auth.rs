//! Mutual challenge/response authentication run once per connection.
//!
//! Each side proves it knows the shared key by returning
//! `HMAC-SHA256(key, nonce)` for a random nonce chosen by the other side. The
//! host challenges first. The key only keeps unrelated local processes from
//! talking to the bridge by accident; it is compiled into both binaries and is
//! not a secret in any stronger sense.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::codec::MessageChannel;
use crate::error::{ProtocolError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Key shared by the client and the host binary.
pub const BRIDGE_AUTH_KEY: &[u8] = b"hwp-bridge";

const NONCE_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "auth", rename_all = "snake_case")]
enum Handshake {
    Challenge { nonce: String },
    Answer { digest: String },
    Welcome,
    Failure,
}

/// Host side: challenge the client, then answer the client's challenge.
pub fn accept_handshake(channel: &mut MessageChannel, key: &[u8]) -> Result<()> {
    challenge_peer(channel, key)?;
    answer_peer(channel, key)
}

/// Client side: answer the host's challenge, then challenge the host.
pub fn initiate_handshake(channel: &mut MessageChannel, key: &[u8]) -> Result<()> {
    answer_peer(channel, key)?;
    challenge_peer(channel, key)
}

fn challenge_peer(channel: &mut MessageChannel, key: &[u8]) -> Result<()> {
    let nonce: [u8; NONCE_LEN] = rand::random();
    channel.send(&Handshake::Challenge {
        nonce: hex::encode(nonce),
    })?;

    let digest = match channel.recv_required::<Handshake>()? {
        Handshake::Answer { digest } => digest,
        other => {
            return Err(ProtocolError::Handshake(format!(
                "expected answer, got {other:?}"
            )))
        }
    };

    let accepted = match hex::decode(&digest) {
        Ok(bytes) => {
            let mut mac = keyed_mac(key)?;
            mac.update(&nonce);
            mac.verify_slice(&bytes).is_ok()
        }
        Err(_) => false,
    };

    if accepted {
        channel.send(&Handshake::Welcome)?;
        Ok(())
    } else {
        let _ = channel.send(&Handshake::Failure);
        Err(ProtocolError::AuthenticationFailed(
            "peer answered the challenge with a wrong digest".to_string(),
        ))
    }
}

fn answer_peer(channel: &mut MessageChannel, key: &[u8]) -> Result<()> {
    let nonce = match channel.recv_required::<Handshake>()? {
        Handshake::Challenge { nonce } => hex::decode(&nonce)
            .map_err(|e| ProtocolError::Handshake(format!("bad challenge nonce: {e}")))?,
        other => {
            return Err(ProtocolError::Handshake(format!(
                "expected challenge, got {other:?}"
            )))
        }
    };

    let mut mac = keyed_mac(key)?;
    mac.update(&nonce);
    let digest = hex::encode(mac.finalize().into_bytes());
    channel.send(&Handshake::Answer { digest })?;

    match channel.recv_required::<Handshake>()? {
        Handshake::Welcome => Ok(()),
        Handshake::Failure => Err(ProtocolError::AuthenticationFailed(
            "peer rejected our answer".to_string(),
        )),
        other => Err(ProtocolError::Handshake(format!(
            "expected welcome, got {other:?}"
        ))),
    }
}

fn keyed_mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|e| ProtocolError::Handshake(format!("invalid key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn run_pair(host_key: &'static [u8], client_key: &'static [u8]) -> (Result<()>, Result<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut channel = MessageChannel::new(TcpStream::connect(addr).unwrap()).unwrap();
            initiate_handshake(&mut channel, client_key)
        });

        let (stream, _) = listener.accept().unwrap();
        let mut channel = MessageChannel::new(stream).unwrap();
        let host = accept_handshake(&mut channel, host_key);
        (host, client.join().unwrap())
    }

    #[test]
    fn test_matching_keys_authenticate_both_sides() {
        let (host, client) = run_pair(BRIDGE_AUTH_KEY, BRIDGE_AUTH_KEY);
        host.unwrap();
        client.unwrap();
    }

    #[test]
    fn test_wrong_key_is_rejected_on_both_sides() {
        let (host, client) = run_pair(BRIDGE_AUTH_KEY, b"someone-else");
        assert!(matches!(host, Err(ProtocolError::AuthenticationFailed(_))));
        assert!(matches!(client, Err(ProtocolError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_request_before_handshake_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut channel = MessageChannel::new(TcpStream::connect(addr).unwrap()).unwrap();
            // Skip the handshake and talk straight away.
            let _: Option<serde_json::Value> = channel.recv().unwrap();
            channel.send(&crate::Request::new("get_text")).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let mut channel = MessageChannel::new(stream).unwrap();
        assert!(accept_handshake(&mut channel, BRIDGE_AUTH_KEY).is_err());
        client.join().unwrap();
    }
}
