//! Error types for the protocol layer.

use crate::Header;

/// Errors that can occur while building, encoding, or decoding messages.
///
/// Decode errors are typed so that a session handler can turn a malformed
/// request into a precise ERROR response instead of a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The byte stream is not a well-formed message frame.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The first line is not a known verb or response status.
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// A header line names a header outside the protocol vocabulary.
    #[error("unknown header: {0}")]
    UnknownHeader(String),

    /// A required header is absent.
    #[error("missing {0} header")]
    MissingHeader(Header),

    /// A header is present but its value does not parse.
    #[error("bad {header} value: {value:?}")]
    BadValue {
        /// The offending header.
        header: Header,
        /// The raw value as received.
        value: String,
    },

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
