//! Codec trait and implementations for framing messages.
//!
//! The transport layer doesn't care how messages become bytes; it just needs
//! something that implements the [`Codec`] trait. The wire format is the
//! CATP text framing ([`TextCodec`], the default); [`JsonCodec`] is
//! available behind the `json` feature for tooling and capture files.
//!
//! The text frame is line-oriented:
//!
//! ```text
//! OPTIONS\r\n
//! TAG 3.1\r\n
//! TIME 3\r\n
//! TYPE DayOpened\r\n
//! \r\n
//! ```
//!
//! The first line is the verb or response status, each following line is a
//! header name and value separated by one space (`TAG` carries the
//! correlation tag), and a blank line terminates the frame. Encoding always
//! emits CRLF; decoding tolerates bare LF.

use crate::{Header, Message, MessageKind, ProtocolError, Status, Verb};

/// Converts between [`Message`] values and raw bytes.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message into one wire frame.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the message cannot be represented in
    /// this format.
    fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes one wire frame back into a message.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the bytes are malformed, name an
    /// unknown verb, or carry a header outside the vocabulary.
    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// TextCodec
// ---------------------------------------------------------------------------

/// The CATP line-oriented text framing. This is what travels on sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError> {
        let mut out = String::new();
        out.push_str(&msg.kind.to_string());
        out.push_str("\r\n");
        if let Some(tag) = &msg.tag {
            out.push_str("TAG ");
            out.push_str(tag);
            out.push_str("\r\n");
        }
        for (header, value) in &msg.headers {
            out.push_str(header.as_wire());
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        Ok(out.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| ProtocolError::Malformed("frame is not UTF-8".into()))?;

        let mut lines = text.lines();
        let first = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| ProtocolError::Malformed("empty frame".into()))?
            .trim();

        let kind = if let Some(verb) = Verb::from_wire(first) {
            MessageKind::Request(verb)
        } else if let Some(status) = Status::from_wire(first) {
            MessageKind::Response(status)
        } else {
            return Err(ProtocolError::UnknownVerb(first.to_string()));
        };

        let mut msg = match kind {
            MessageKind::Request(v) => Message::request(v),
            MessageKind::Response(s) => Message::response(s),
        };

        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                // Blank line terminates the frame; anything after it belongs
                // to the next frame and is the transport's problem.
                break;
            }
            let (name, value) = match line.split_once(' ') {
                Some((n, v)) => (n, v),
                None => (line, ""),
            };
            if name == "TAG" {
                msg.tag = Some(value.to_string());
                continue;
            }
            let header = Header::from_wire(name)
                .ok_or_else(|| ProtocolError::UnknownHeader(name.to_string()))?;
            msg.headers.insert(header, value.to_string());
        }

        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that renders messages as JSON via `serde_json`.
///
/// Not used on the wire; handy for capture files and external tooling that
/// would rather not parse the text framing.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(msg).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lifecycle;

    #[test]
    fn test_encode_produces_exact_frame() {
        let msg = Message::request(Verb::Options)
            .with_header(Header::Type, Lifecycle::DayOpened.as_wire())
            .with_header(Header::Time, "3")
            .with_tag("3.1");

        let bytes = TextCodec.encode(&msg).unwrap();
        // Header order follows the Header enum declaration, not spelling.
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "OPTIONS\r\nTAG 3.1\r\nTYPE DayOpened\r\nTIME 3\r\n\r\n");
    }

    #[test]
    fn test_decode_request_frame() {
        let frame = b"OPTIONS\r\nTAG 3.1\r\nTYPE DayOpened\r\nTIME 3\r\n\r\n";
        let msg = TextCodec.decode(frame).unwrap();
        assert_eq!(msg.verb(), Some(Verb::Options));
        assert_eq!(msg.tag.as_deref(), Some("3.1"));
        assert_eq!(msg.lifecycle().unwrap(), Lifecycle::DayOpened);
        assert_eq!(msg.header(Header::Time), Some("3"));
    }

    #[test]
    fn test_decode_tolerates_bare_lf() {
        let frame = b"OK\nID t-01\n\n";
        let msg = TextCodec.decode(frame).unwrap();
        assert_eq!(msg.status(), Some(Status::Ok));
        assert_eq!(msg.header(Header::Id), Some("t-01"));
    }

    #[test]
    fn test_text_round_trip_preserves_message() {
        let msg = Message::request(Verb::Ask)
            .with_header(Header::Value, "9.5 1")
            .with_header(Header::Id, "s3")
            .with_tag("2.4");
        let bytes = TextCodec.encode(&msg).unwrap();
        let decoded = TextCodec.decode(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_decode_value_keeps_embedded_spaces() {
        let frame = b"POST\r\nTYPE Fee\r\nID m1\r\nVALUE 1 0.5 0.1 0.1 0.05\r\n\r\n";
        let msg = TextCodec.decode(frame).unwrap();
        assert_eq!(msg.header(Header::Value), Some("1 0.5 0.1 0.1 0.05"));
    }

    #[test]
    fn test_decode_valueless_header_is_empty_string() {
        let frame = b"ERROR\r\nTEXT\r\n\r\n";
        let msg = TextCodec.decode(frame).unwrap();
        assert_eq!(msg.header(Header::Text), Some(""));
    }

    #[test]
    fn test_decode_unknown_verb_fails() {
        let err = TextCodec.decode(b"HELLO\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownVerb(v) if v == "HELLO"));
    }

    #[test]
    fn test_decode_unknown_header_fails() {
        let err = TextCodec.decode(b"ASK\r\nPRICE 10\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownHeader(h) if h == "PRICE"));
    }

    #[test]
    fn test_decode_empty_frame_fails() {
        assert!(matches!(
            TextCodec.decode(b""),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            TextCodec.decode(b"\r\n\r\n"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(TextCodec.decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_decode_stops_at_blank_line() {
        let frame = b"OK\r\n\r\nASK\r\nVALUE 9\r\n\r\n";
        let msg = TextCodec.decode(frame).unwrap();
        assert_eq!(msg.status(), Some(Status::Ok));
        assert!(msg.headers.is_empty());
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_round_trip_preserves_message() {
        let msg = Message::request(Verb::Register).with_header(Header::Id, "m2");
        let bytes = JsonCodec.encode(&msg).unwrap();
        let decoded = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
