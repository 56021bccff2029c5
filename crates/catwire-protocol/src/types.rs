//! Core protocol types for the CATP wire format.
//!
//! This module defines every type that travels "on the wire" between a game
//! server and its specialist/trader clients: the request verbs, the response
//! statuses, the closed header vocabulary, and the [`Message`] unit itself.
//!
//! A CATP message is a verb (or response status), a small set of named
//! headers, and an optional correlation tag. The tag is assigned by the
//! server on each lifecycle request and must be echoed by the client on its
//! responses and on any request it originates until the next tag arrives.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The protocol version a client reports in its CHECKIN request.
pub const PROTOCOL_VERSION: u32 = 1;

/// The `TYPE` header value carried by an INVALID response when a request
/// arrived at the wrong point in the game lifecycle.
pub const WRONG_TIME: &str = "WrongTime";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// Identities are server-assigned strings; the newtype keeps the
        /// different id spaces from being mixed up in function signatures.
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the raw id string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// A unique identifier for a trader (buyer/seller agent).
    TraderId
);
id_type!(
    /// A unique identifier for a specialist (market-maker).
    SpecialistId
);
id_type!(
    /// A unique identifier for a single ask or bid.
    ShoutId
);
id_type!(
    /// A unique identifier for a recorded trade.
    TransactionId
);

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The role a client plays in the game, reported in its CHECKIN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// A buyer/seller agent.
    Trader,
    /// A market-maker that matches shouts.
    Specialist,
}

impl Role {
    /// The wire spelling used in the CHECKIN `TYPE` header.
    pub fn as_wire(self) -> &'static str {
        match self {
            Role::Trader => "Trader",
            Role::Specialist => "Specialist",
        }
    }

    /// Parses the wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Trader" => Some(Role::Trader),
            "Specialist" => Some(Role::Specialist),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Verbs and statuses
// ---------------------------------------------------------------------------

/// The request verbs of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Client joins the game.
    CheckIn,
    /// Server announces a lifecycle transition; the `TYPE` header carries
    /// the [`Lifecycle`] stage.
    Options,
    /// Server broadcasts information; the `TYPE` header carries the
    /// [`PostType`].
    Post,
    /// A sell shout (place, or modify when an `ID` header is present).
    Ask,
    /// A buy shout (place, or modify when an `ID` header is present).
    Bid,
    /// Trader registers with a specialist; forwarded to that specialist.
    Register,
    /// Trader requests a specialist's market information feed.
    Subscribe,
    /// Specialist asks the server to record a trade.
    Transaction,
}

impl Verb {
    /// The wire spelling of the verb line.
    pub fn as_wire(self) -> &'static str {
        match self {
            Verb::CheckIn => "CHECKIN",
            Verb::Options => "OPTIONS",
            Verb::Post => "POST",
            Verb::Ask => "ASK",
            Verb::Bid => "BID",
            Verb::Register => "REGISTER",
            Verb::Subscribe => "SUBSCRIBE",
            Verb::Transaction => "TRANSACTION",
        }
    }

    /// Parses the wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "CHECKIN" => Some(Verb::CheckIn),
            "OPTIONS" => Some(Verb::Options),
            "POST" => Some(Verb::Post),
            "ASK" => Some(Verb::Ask),
            "BID" => Some(Verb::Bid),
            "REGISTER" => Some(Verb::Register),
            "SUBSCRIBE" => Some(Verb::Subscribe),
            "TRANSACTION" => Some(Verb::Transaction),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// The status line of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The request was accepted.
    Ok,
    /// The request was well-formed but not acceptable; a `TYPE` header of
    /// [`WRONG_TIME`] marks a lifecycle-state mismatch.
    Invalid,
    /// The request could not be processed (malformed payload, internal
    /// failure).
    Error,
}

impl Status {
    /// The wire spelling of the status line.
    pub fn as_wire(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Invalid => "INVALID",
            Status::Error => "ERROR",
        }
    }

    /// Parses the wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(Status::Ok),
            "INVALID" => Some(Status::Invalid),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// The closed set of header names.
///
/// CATP deliberately keeps the header vocabulary closed: compound values
/// (fee schedules, popularity lists, shout ownership) are whitespace-packed
/// into `VALUE` or `TEXT` rather than minted as new header names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Header {
    /// An identity: client id on CHECKIN, shout/transaction/specialist id
    /// elsewhere, or a whitespace-separated id list on OPTIONS DayClosed.
    Id,
    /// A sub-type discriminator: [`Lifecycle`] on OPTIONS, [`PostType`] on
    /// POST, role on CHECKIN, [`WRONG_TIME`] on INVALID.
    Type,
    /// The payload value: prices, quantities, fee schedules, popularity.
    Value,
    /// Game time (day or round number) of the carried information.
    Time,
    /// Free-form text: error detail, or packed ownership fields.
    Text,
    /// Protocol version, CHECKIN only.
    Version,
}

impl Header {
    /// The wire spelling of the header name.
    pub fn as_wire(self) -> &'static str {
        match self {
            Header::Id => "ID",
            Header::Type => "TYPE",
            Header::Value => "VALUE",
            Header::Time => "TIME",
            Header::Text => "TEXT",
            Header::Version => "VERSION",
        }
    }

    /// Parses the wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "ID" => Some(Header::Id),
            "TYPE" => Some(Header::Type),
            "VALUE" => Some(Header::Value),
            "TIME" => Some(Header::Time),
            "TEXT" => Some(Header::Text),
            "VERSION" => Some(Header::Version),
            _ => None,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Sub-types
// ---------------------------------------------------------------------------

/// The lifecycle stages announced by OPTIONS requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    GameStarting,
    GameStarted,
    DayOpening,
    DayOpened,
    RoundOpened,
    RoundClosing,
    RoundClosed,
    DayClosed,
    GameOver,
}

impl Lifecycle {
    /// The wire spelling carried in the `TYPE` header.
    pub fn as_wire(self) -> &'static str {
        match self {
            Lifecycle::GameStarting => "GameStarting",
            Lifecycle::GameStarted => "GameStarted",
            Lifecycle::DayOpening => "DayOpening",
            Lifecycle::DayOpened => "DayOpened",
            Lifecycle::RoundOpened => "RoundOpened",
            Lifecycle::RoundClosing => "RoundClosing",
            Lifecycle::RoundClosed => "RoundClosed",
            Lifecycle::DayClosed => "DayClosed",
            Lifecycle::GameOver => "GameOver",
        }
    }

    /// Parses the wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "GameStarting" => Some(Lifecycle::GameStarting),
            "GameStarted" => Some(Lifecycle::GameStarted),
            "DayOpening" => Some(Lifecycle::DayOpening),
            "DayOpened" => Some(Lifecycle::DayOpened),
            "RoundOpened" => Some(Lifecycle::RoundOpened),
            "RoundClosing" => Some(Lifecycle::RoundClosing),
            "RoundClosed" => Some(Lifecycle::RoundClosed),
            "DayClosed" => Some(Lifecycle::DayClosed),
            "GameOver" => Some(Lifecycle::GameOver),
            _ => None,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// The informational broadcast kinds carried by POST requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostType {
    /// A trader joined the game (`ID` trader, `VALUE` 1 for sellers).
    Trader,
    /// A specialist joined the game (`ID` specialist).
    Specialist,
    /// A specialist's fee schedule (`ID` specialist, `VALUE` five fees).
    Fee,
    /// A specialist's profit (`ID` specialist, `VALUE` amount).
    Profit,
    /// Echo of an accepted ask (`ID` shout, `VALUE` "price quantity",
    /// `TEXT` "trader specialist").
    Ask,
    /// Echo of an accepted bid; same header shape as [`PostType::Ask`].
    Bid,
    /// Echo of a recorded trade (`ID` transaction, `VALUE`
    /// "ask bid price quantity", `TEXT` specialist).
    Transaction,
}

impl PostType {
    /// The wire spelling carried in the `TYPE` header.
    pub fn as_wire(self) -> &'static str {
        match self {
            PostType::Trader => "Trader",
            PostType::Specialist => "Specialist",
            PostType::Fee => "Fee",
            PostType::Profit => "Profit",
            PostType::Ask => "Ask",
            PostType::Bid => "Bid",
            PostType::Transaction => "Transaction",
        }
    }

    /// Parses the wire spelling.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Trader" => Some(PostType::Trader),
            "Specialist" => Some(PostType::Specialist),
            "Fee" => Some(PostType::Fee),
            "Profit" => Some(PostType::Profit),
            "Ask" => Some(PostType::Ask),
            "Bid" => Some(PostType::Bid),
            "Transaction" => Some(PostType::Transaction),
            _ => None,
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Whether a message is a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// A request carrying one of the protocol verbs.
    Request(Verb),
    /// A response carrying a status.
    Response(Status),
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Request(v) => f.write_str(v.as_wire()),
            MessageKind::Response(s) => f.write_str(s.as_wire()),
        }
    }
}

/// A single protocol message: a verb or status, a header map, and the
/// correlation tag.
///
/// Messages are treated as immutable once handed to a connection; the
/// builder methods consume and return `self` so construction reads as one
/// expression:
///
/// ```
/// use catwire_protocol::{Header, Message, Verb};
///
/// let msg = Message::request(Verb::Ask)
///     .with_header(Header::Value, "9.5 1")
///     .with_tag("3.2");
/// assert_eq!(msg.header(Header::Value), Some("9.5 1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Request verb or response status.
    pub kind: MessageKind,
    /// Header map. `BTreeMap` keeps encode order deterministic.
    pub headers: BTreeMap<Header, String>,
    /// Correlation tag, echoed from the triggering server request.
    pub tag: Option<String>,
}

impl Message {
    /// Creates an empty request with the given verb.
    pub fn request(verb: Verb) -> Self {
        Self {
            kind: MessageKind::Request(verb),
            headers: BTreeMap::new(),
            tag: None,
        }
    }

    /// Creates an empty response with the given status.
    pub fn response(status: Status) -> Self {
        Self {
            kind: MessageKind::Response(status),
            headers: BTreeMap::new(),
            tag: None,
        }
    }

    /// Creates the INVALID response for a request that arrived at the wrong
    /// point in the lifecycle.
    pub fn wrong_time() -> Self {
        Self::response(Status::Invalid).with_header(Header::Type, WRONG_TIME)
    }

    /// Adds or replaces a header.
    pub fn with_header(mut self, header: Header, value: impl Into<String>) -> Self {
        self.headers.insert(header, value.into());
        self
    }

    /// Sets the correlation tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Returns the verb of a request, or `None` for responses.
    pub fn verb(&self) -> Option<Verb> {
        match self.kind {
            MessageKind::Request(v) => Some(v),
            MessageKind::Response(_) => None,
        }
    }

    /// Returns the status of a response, or `None` for requests.
    pub fn status(&self) -> Option<Status> {
        match self.kind {
            MessageKind::Request(_) => None,
            MessageKind::Response(s) => Some(s),
        }
    }

    /// `true` if this message is a request.
    pub fn is_request(&self) -> bool {
        matches!(self.kind, MessageKind::Request(_))
    }

    /// Looks up a header value.
    pub fn header(&self, header: Header) -> Option<&str> {
        self.headers.get(&header).map(String::as_str)
    }

    /// Looks up a header value, failing with a typed error if absent.
    pub fn require(&self, header: Header) -> Result<&str, ProtocolError> {
        self.header(header)
            .ok_or(ProtocolError::MissingHeader(header))
    }

    /// Looks up and parses a header value.
    pub fn parsed<T: std::str::FromStr>(&self, header: Header) -> Result<T, ProtocolError> {
        let raw = self.require(header)?;
        raw.parse().map_err(|_| ProtocolError::BadValue {
            header,
            value: raw.to_string(),
        })
    }

    /// Decodes the `TYPE` header of an OPTIONS request as a lifecycle stage.
    pub fn lifecycle(&self) -> Result<Lifecycle, ProtocolError> {
        let raw = self.require(Header::Type)?;
        Lifecycle::from_wire(raw).ok_or(ProtocolError::BadValue {
            header: Header::Type,
            value: raw.to_string(),
        })
    }

    /// Decodes the `TYPE` header of a POST request as a broadcast kind.
    pub fn post_type(&self) -> Result<PostType, ProtocolError> {
        let raw = self.require(Header::Type)?;
        PostType::from_wire(raw).ok_or(ProtocolError::BadValue {
            header: Header::Type,
            value: raw.to_string(),
        })
    }
}

/// A compact one-line rendering for logs: verb, sub-type, tag.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(t) = self.header(Header::Type) {
            write!(f, "[{t}]")?;
        }
        if let Some(tag) = &self.tag {
            write!(f, " tag={tag}")?;
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_trader_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&TraderId::from("t-01")).unwrap();
        assert_eq!(json, "\"t-01\"");
    }

    #[test]
    fn test_shout_id_display_is_raw() {
        assert_eq!(ShoutId::from("s7").to_string(), "s7");
    }

    #[test]
    fn test_id_types_are_distinct_map_keys() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(SpecialistId::from("m1"), 1);
        map.insert(SpecialistId::from("m2"), 2);
        assert_eq!(map[&SpecialistId::from("m1")], 1);
    }

    // =====================================================================
    // Wire vocabularies
    // =====================================================================

    #[test]
    fn test_verb_wire_round_trip() {
        for verb in [
            Verb::CheckIn,
            Verb::Options,
            Verb::Post,
            Verb::Ask,
            Verb::Bid,
            Verb::Register,
            Verb::Subscribe,
            Verb::Transaction,
        ] {
            assert_eq!(Verb::from_wire(verb.as_wire()), Some(verb));
        }
    }

    #[test]
    fn test_verb_from_wire_rejects_unknown() {
        assert_eq!(Verb::from_wire("HELLO"), None);
        assert_eq!(Verb::from_wire("checkin"), None);
    }

    #[test]
    fn test_status_wire_round_trip() {
        for status in [Status::Ok, Status::Invalid, Status::Error] {
            assert_eq!(Status::from_wire(status.as_wire()), Some(status));
        }
    }

    #[test]
    fn test_header_wire_round_trip() {
        for header in [
            Header::Id,
            Header::Type,
            Header::Value,
            Header::Time,
            Header::Text,
            Header::Version,
        ] {
            assert_eq!(Header::from_wire(header.as_wire()), Some(header));
        }
    }

    #[test]
    fn test_lifecycle_wire_round_trip() {
        for stage in [
            Lifecycle::GameStarting,
            Lifecycle::GameStarted,
            Lifecycle::DayOpening,
            Lifecycle::DayOpened,
            Lifecycle::RoundOpened,
            Lifecycle::RoundClosing,
            Lifecycle::RoundClosed,
            Lifecycle::DayClosed,
            Lifecycle::GameOver,
        ] {
            assert_eq!(Lifecycle::from_wire(stage.as_wire()), Some(stage));
        }
    }

    #[test]
    fn test_post_type_wire_round_trip() {
        for kind in [
            PostType::Trader,
            PostType::Specialist,
            PostType::Fee,
            PostType::Profit,
            PostType::Ask,
            PostType::Bid,
            PostType::Transaction,
        ] {
            assert_eq!(PostType::from_wire(kind.as_wire()), Some(kind));
        }
    }

    #[test]
    fn test_role_wire_round_trip() {
        assert_eq!(Role::from_wire("Trader"), Some(Role::Trader));
        assert_eq!(Role::from_wire("Specialist"), Some(Role::Specialist));
        assert_eq!(Role::from_wire("Auctioneer"), None);
    }

    // =====================================================================
    // Message
    // =====================================================================

    #[test]
    fn test_message_builder_sets_headers_and_tag() {
        let msg = Message::request(Verb::Options)
            .with_header(Header::Type, Lifecycle::DayOpened.as_wire())
            .with_header(Header::Time, "3")
            .with_tag("3.0");

        assert_eq!(msg.verb(), Some(Verb::Options));
        assert_eq!(msg.header(Header::Time), Some("3"));
        assert_eq!(msg.tag.as_deref(), Some("3.0"));
        assert_eq!(msg.lifecycle().unwrap(), Lifecycle::DayOpened);
    }

    #[test]
    fn test_message_require_missing_header_is_typed_error() {
        let msg = Message::request(Verb::Post);
        let err = msg.require(Header::Id).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingHeader(Header::Id)));
    }

    #[test]
    fn test_message_parsed_rejects_non_numeric_value() {
        let msg = Message::request(Verb::Ask).with_header(Header::Value, "cheap");
        let err = msg.parsed::<f64>(Header::Value).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::BadValue {
                header: Header::Value,
                ..
            }
        ));
    }

    #[test]
    fn test_message_parsed_reads_price() {
        let msg = Message::request(Verb::Bid).with_header(Header::Value, "12.5");
        assert_eq!(msg.parsed::<f64>(Header::Value).unwrap(), 12.5);
    }

    #[test]
    fn test_message_lifecycle_rejects_post_subtype() {
        let msg = Message::request(Verb::Options).with_header(Header::Type, "Fee");
        assert!(msg.lifecycle().is_err());
    }

    #[test]
    fn test_wrong_time_response_shape() {
        let msg = Message::wrong_time();
        assert_eq!(msg.status(), Some(Status::Invalid));
        assert_eq!(msg.header(Header::Type), Some(WRONG_TIME));
    }

    #[test]
    fn test_message_display_includes_subtype_and_tag() {
        let msg = Message::request(Verb::Options)
            .with_header(Header::Type, "RoundOpened")
            .with_tag("2.1");
        assert_eq!(msg.to_string(), "OPTIONS[RoundOpened] tag=2.1");
    }

    #[test]
    fn test_message_serde_round_trip() {
        let msg = Message::request(Verb::CheckIn)
            .with_header(Header::Type, Role::Trader.as_wire())
            .with_header(Header::Version, "1");
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
