//! Reactive-session matching.

use catwire_protocol::{Header, Message, Verb};

/// The result of applying a reactive session to an inbound request.
///
/// A session signals one of three things: it does not recognize the request
/// (try the next candidate), it recognizes the request but rejects it (the
/// scan stops and the reason is sent back to the peer), or it recognized
/// and fully handled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Verb/sub-type mismatch; the next armed candidate should be tried.
    NotApplicable,
    /// The request is recognized but semantically invalid; the scan stops
    /// and the reason becomes an error response.
    Invalid(String),
    /// The request was recognized and handled, response already arranged.
    Handled,
}

/// What a reactive session expects from the server: a verb and optionally a
/// `TYPE` header value. `None` is a wildcard; a fully wild expectation
/// backs the catch-all oracle session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    /// Expected request verb, or any.
    pub verb: Option<Verb>,
    /// Expected `TYPE` header value, or any.
    pub subtype: Option<&'static str>,
}

impl Expectation {
    /// Expects a specific verb, any sub-type.
    pub fn verb(verb: Verb) -> Self {
        Self {
            verb: Some(verb),
            subtype: None,
        }
    }

    /// Narrows the expectation to a specific `TYPE` header value.
    pub fn with_subtype(mut self, subtype: &'static str) -> Self {
        self.subtype = Some(subtype);
        self
    }

    /// Matches any request at all.
    pub fn any() -> Self {
        Self {
            verb: None,
            subtype: None,
        }
    }

    /// Pure predicate: does this inbound message fit the expectation?
    ///
    /// Responses never match; they belong to the proactive queue.
    pub fn matches(&self, msg: &Message) -> bool {
        let Some(verb) = msg.verb() else {
            return false;
        };
        if let Some(expected) = self.verb {
            if verb != expected {
                return false;
            }
        }
        if let Some(subtype) = self.subtype {
            if msg.header(Header::Type) != Some(subtype) {
                return false;
            }
        }
        true
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use catwire_protocol::Status;

    fn options(subtype: &str) -> Message {
        Message::request(Verb::Options).with_header(Header::Type, subtype)
    }

    #[test]
    fn test_verb_and_subtype_must_both_match() {
        let exp = Expectation::verb(Verb::Options).with_subtype("DayOpened");

        assert!(exp.matches(&options("DayOpened")));
        assert!(!exp.matches(&options("DayClosed")));
        assert!(!exp.matches(&Message::request(Verb::Post).with_header(Header::Type, "DayOpened")));
    }

    #[test]
    fn test_verb_only_expectation_ignores_subtype() {
        let exp = Expectation::verb(Verb::Register);
        assert!(exp.matches(&Message::request(Verb::Register)));
        assert!(exp.matches(&Message::request(Verb::Register).with_header(Header::Type, "x")));
        assert!(!exp.matches(&Message::request(Verb::Subscribe)));
    }

    #[test]
    fn test_any_matches_every_request() {
        let exp = Expectation::any();
        assert!(exp.matches(&options("GameStarting")));
        assert!(exp.matches(&Message::request(Verb::Transaction)));
    }

    #[test]
    fn test_responses_never_match() {
        let exp = Expectation::any();
        assert!(!exp.matches(&Message::response(Status::Ok)));
        assert!(!exp.matches(&Message::response(Status::Invalid)));
    }

    #[test]
    fn test_subtype_expectation_requires_type_header() {
        let exp = Expectation::verb(Verb::Options).with_subtype("DayOpened");
        assert!(!exp.matches(&Message::request(Verb::Options)));
    }
}
