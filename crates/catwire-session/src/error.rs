//! Error types for the session layer.

/// Errors that can occur during session correlation.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The connection was closed while the session was still waiting for
    /// its response; the caller is unblocked rather than left hanging.
    #[error("session forced out: connection closed before a response arrived")]
    ForcedOut,

    /// A response arrived with no proactive session in flight. After this
    /// the proactive/reactive correlation is unreliable.
    #[error("response arrived with no proactive session in flight")]
    EmptyQueue,
}
