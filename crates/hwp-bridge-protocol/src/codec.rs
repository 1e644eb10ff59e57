//! Newline-delimited JSON framing over a TCP connection.
//!
//! Each message is one JSON document followed by `\n`. `serde_json` escapes
//! newlines inside strings, so a line boundary is always a message boundary.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Upper bound on a single encoded message, newline included.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// A bidirectional message stream over one TCP connection.
pub struct MessageChannel {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl MessageChannel {
    /// Wrap a connected stream. Nagle is disabled since every message is
    /// followed by a blocking wait for the peer's answer.
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Encode and flush one message.
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message).map_err(ProtocolError::Encode)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read the next message. Returns `Ok(None)` on a clean close by the peer.
    ///
    /// A message cut off by the peer closing mid-line is a decode error, not a
    /// clean close.
    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            let mut line = String::new();
            let limit = MAX_MESSAGE_SIZE as u64;
            let n = (&mut self.reader).take(limit).read_line(&mut line)?;
            if n == 0 {
                return Ok(None);
            }
            if n as u64 == limit && !line.ends_with('\n') {
                return Err(ProtocolError::InvalidRequest(format!(
                    "message exceeds {MAX_MESSAGE_SIZE} bytes"
                )));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(ProtocolError::Decode);
        }
    }

    /// Read the next message, treating a clean close as an error.
    pub fn recv_required<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.recv()?.ok_or(ProtocolError::Closed)
    }

    /// Bound how long `recv` may block. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.writer.peer_addr()?)
    }

    /// Close both directions of the connection.
    pub fn shutdown(&self) -> Result<()> {
        self.writer.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("peer", &self.writer.peer_addr().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Request, Response};
    use pretty_assertions::assert_eq;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (MessageChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (MessageChannel::new(server).unwrap(), client.join().unwrap())
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let (mut server, client) = pair();
        let mut client = MessageChannel::new(client).unwrap();

        client.send(&Request::new("first")).unwrap();
        client.send(&Request::new("second").arg("line\nbreak")).unwrap();

        let a: Request = server.recv_required().unwrap();
        let b: Request = server.recv_required().unwrap();
        assert_eq!(a.method, "first");
        assert_eq!(b, Request::new("second").arg("line\nbreak"));

        server.send(&Response::ok("done")).unwrap();
        let resp: Response = client.recv_required().unwrap();
        assert_eq!(resp, Response::ok("done"));
    }

    #[test]
    fn test_clean_close_is_none() {
        let (mut server, client) = pair();
        drop(client);
        let msg: Option<Request> = server.recv().unwrap();
        assert!(msg.is_none());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let (mut server, mut client) = pair();
        client.write_all(b"{not json}\n").unwrap();
        let err = server.recv::<Request>().unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_truncated_message_is_decode_error() {
        let (mut server, mut client) = pair();
        client.write_all(br#"{"method":"get_te"#).unwrap();
        drop(client);
        let err = server.recv::<Request>().unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let (mut server, mut client) = pair();
        client.write_all(b"\n\n{\"method\":\"run\"}\n").unwrap();
        let req: Request = server.recv_required().unwrap();
        assert_eq!(req.method, "run");
    }
}
