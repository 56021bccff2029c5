//! Wire protocol for Catwire.
//!
//! This crate defines the "language" that the game server and its
//! specialist/trader clients speak:
//!
//! - **Types** ([`Message`], [`Verb`], [`Status`], [`Header`],
//!   [`Lifecycle`], [`PostType`], the id newtypes), the vocabulary that
//!   travels on the wire.
//! - **Codec** ([`Codec`] trait, [`TextCodec`], and [`JsonCodec`] behind
//!   the `json` feature), which frame messages as bytes.
//! - **Errors** ([`ProtocolError`]), covering what can go wrong while building or
//!   decoding a message.
//!
//! The protocol layer knows nothing about connections, sessions, or the
//! game registry; it only describes single messages.

mod codec;
mod error;
mod types;

pub use codec::{Codec, TextCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Header, Lifecycle, Message, MessageKind, PostType, Role, ShoutId, SpecialistId, Status,
    TraderId, TransactionId, Verb, PROTOCOL_VERSION, WRONG_TIME,
};
