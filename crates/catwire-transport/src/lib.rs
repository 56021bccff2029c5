//! Transport abstraction layer for Catwire.
//!
//! Provides the [`Connection`] and [`Connector`] traits that abstract over
//! how messages reach the game server, and two implementations:
//!
//! - [`ChannelConnection`], an in-process pair over unbounded channels,
//!   used for single-process runs and tests (the synchronous flavor).
//! - [`TcpConnection`], a socket connection framed with the CATP text
//!   codec (the asynchronous flavor).
//!
//! The engine is written against the traits and never learns which flavor
//! it was given.

#![allow(async_fn_in_trait)]

mod channel;
mod error;
mod tcp;

pub use channel::{channel_pair, ChannelConnection, ChannelConnector};
pub use error::TransportError;
pub use tcp::{TcpAcceptor, TcpConnection, TcpConnector};

use std::fmt;

use catwire_protocol::Message;

/// Opaque identifier for a connection, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single bidirectional message stream to the peer.
pub trait Connection: Send + 'static {
    /// Sends one message to the remote peer.
    async fn send(&mut self, msg: &Message) -> Result<(), TransportError>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&mut self) -> Result<Option<Message>, TransportError>;

    /// Closes the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

/// Dials the game server, producing a fresh [`Connection`] per attempt.
///
/// The engine retries `connect` a bounded number of times; a connector must
/// therefore be callable more than once.
pub trait Connector: Send + 'static {
    /// The connection type produced by this connector.
    type Conn: Connection;

    /// Attempts to establish one connection.
    async fn connect(&mut self) -> Result<Self::Conn, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "market");
        map.insert(ConnectionId::new(2), "trader");
        assert_eq!(map[&ConnectionId::new(1)], "market");
    }
}
