//! TCP transport framed with the CATP text codec.

use std::sync::atomic::{AtomicU64, Ordering};

use catwire_protocol::{Codec, Message, TextCodec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A [`Connector`] that dials the game server over TCP.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Creates a connector for the given `host:port` address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&mut self) -> Result<Self::Conn, TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let conn = TcpConnection::new(stream);
        tracing::debug!(id = %conn.id(), addr = %self.addr, "dialed game server");
        Ok(conn)
    }
}

/// Accepts inbound TCP connections.
///
/// The engine itself only dials; the acceptor exists for test harnesses and
/// in-process game controllers that play the server end of the wire.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        tracing::info!(addr, "listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next inbound connection.
    pub async fn accept(&mut self) -> Result<TcpConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::ConnectFailed)?;
        let conn = TcpConnection::new(stream);
        tracing::debug!(id = %conn.id(), %addr, "accepted connection");
        Ok(conn)
    }
}

/// A TCP connection carrying text-framed CATP messages.
pub struct TcpConnection {
    id: ConnectionId,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    codec: TextCodec,
    /// Bytes read but not yet consumed as a complete frame. Kept on the
    /// struct so `recv` stays cancel-safe inside `select!` loops.
    buffer: Vec<u8>,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            reader: read_half,
            writer: write_half,
            codec: TextCodec,
            buffer: Vec::new(),
        }
    }
}

impl Connection for TcpConnection {
    async fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let bytes = self.codec.encode(msg)?;
        self.writer
            .write_all(&bytes)
            .await
            .map_err(TransportError::SendFailed)?;
        self.writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        loop {
            // Drop stray blank lines between frames.
            while self.buffer.starts_with(b"\r\n") {
                self.buffer.drain(..2);
            }
            while self.buffer.starts_with(b"\n") {
                self.buffer.drain(..1);
            }

            if let Some(end) = frame_end(&self.buffer) {
                let frame: Vec<u8> = self.buffer.drain(..end).collect();
                let msg = self.codec.decode(&frame)?;
                return Ok(Some(msg));
            }

            let n = self
                .reader
                .read_buf(&mut self.buffer)
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::ConnectionClosed(
                    "peer closed mid-frame".into(),
                ));
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Finds the end of the first complete frame: the position just past the
/// blank line (`\n\n` or `\n\r\n`) that terminates it.
fn frame_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' {
            if buf[i + 1] == b'\n' {
                return Some(i + 2);
            }
            if i + 2 < buf.len() && buf[i + 1] == b'\r' && buf[i + 2] == b'\n' {
                return Some(i + 3);
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::frame_end;

    #[test]
    fn test_frame_end_finds_crlf_terminator() {
        let buf = b"OK\r\nID t1\r\n\r\nNEXT";
        assert_eq!(frame_end(buf), Some(13));
    }

    #[test]
    fn test_frame_end_finds_bare_lf_terminator() {
        let buf = b"OK\nID t1\n\n";
        assert_eq!(frame_end(buf), Some(buf.len()));
    }

    #[test]
    fn test_frame_end_none_for_partial_frame() {
        assert_eq!(frame_end(b"OK\r\nID t"), None);
        assert_eq!(frame_end(b""), None);
    }
}
