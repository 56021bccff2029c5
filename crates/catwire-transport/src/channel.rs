//! In-process channel transport.
//!
//! [`channel_pair`] returns two cross-wired connection ends that exchange
//! [`Message`] values directly over unbounded channels, with no
//! serialization. This is the synchronous-mode transport: regression tests
//! and single-process runs wire every client straight to the game
//! controller through these pairs.

use std::sync::atomic::{AtomicU64, Ordering};

use catwire_protocol::Message;
use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One end of an in-process connection pair.
pub struct ChannelConnection {
    id: ConnectionId,
    /// `None` once this end has been closed.
    tx: Option<mpsc::UnboundedSender<Message>>,
    rx: mpsc::UnboundedReceiver<Message>,
}

/// Creates a connected pair of in-process ends.
///
/// Messages sent on one end arrive, in order, at the other. Closing or
/// dropping one end makes the peer's `recv` return `Ok(None)`.
pub fn channel_pair() -> (ChannelConnection, ChannelConnection) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a = ChannelConnection {
        id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
        tx: Some(b_tx),
        rx: a_rx,
    };
    let b = ChannelConnection {
        id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
        tx: Some(a_tx),
        rx: b_rx,
    };
    (a, b)
}

impl Connection for ChannelConnection {
    async fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("local end closed".into()))?;
        tx.send(msg.clone())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A [`Connector`] that hands out one pre-wired [`ChannelConnection`].
///
/// Further connect attempts fail: an in-process peer that went away has no
/// address to redial.
pub struct ChannelConnector {
    conn: Option<ChannelConnection>,
}

impl ChannelConnector {
    /// Wraps an existing connection end.
    pub fn new(conn: ChannelConnection) -> Self {
        Self { conn: Some(conn) }
    }
}

impl Connector for ChannelConnector {
    type Conn = ChannelConnection;

    async fn connect(&mut self) -> Result<Self::Conn, TransportError> {
        self.conn
            .take()
            .ok_or_else(|| TransportError::ConnectionClosed("channel already taken".into()))
    }
}

// =========================================================================
// Tests
// =========================================================================
