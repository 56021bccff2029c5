//! Unified error type for the Catwire engine.

use catwire_protocol::ProtocolError;
use catwire_registry::RegistryError;
use catwire_session::SessionError;
use catwire_sync::BarrierError;
use catwire_transport::TransportError;

/// Top-level error that wraps all layer-specific errors plus the failures
/// the engine itself can produce.
#[derive(Debug, thiserror::Error)]
pub enum CatwireError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, missing or bad headers).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-correlation error (forced out, unexpected response).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A local registry precondition failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A start-barrier error.
    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// An operation needed a connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// Every connect attempt failed.
    #[error("gave up connecting after {attempts} attempts: {source}")]
    ConnectExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error of the final attempt.
        #[source]
        source: TransportError,
    },

    /// The CHECKIN exchange failed; the connection has been closed.
    #[error("check-in failed: {0}")]
    CheckInFailed(String),

    /// The role client's command channel is gone.
    #[error("command channel closed")]
    CommandChannelClosed,
}
