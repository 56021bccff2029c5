//! Tag discipline.
//!
//! Every server-initiated OPTIONS request carries a correlation tag scoping
//! the current day or round. The client stores the most recent tag and
//! echoes it on its responses and on any proactive request it originates,
//! until the next tag arrives. This guards against a proactive request
//! crossing in flight with a day or round boundary.

use catwire_protocol::Message;

/// Holds the most recently observed server tag.
#[derive(Debug, Default)]
pub struct TagCell {
    current: Option<String>,
}

impl TagCell {
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the tag of a server-initiated request, if it carries one.
    /// Responses and untagged requests leave the cell unchanged.
    pub fn observe(&mut self, msg: &Message) {
        if msg.is_request() {
            if let Some(tag) = &msg.tag {
                self.current = Some(tag.clone());
            }
        }
    }

    /// Stamps the stored tag onto an outbound message that does not already
    /// carry one.
    pub fn stamp(&self, msg: Message) -> Message {
        match (&msg.tag, &self.current) {
            (None, Some(tag)) => msg.with_tag(tag.clone()),
            _ => msg,
        }
    }

    /// The currently stored tag.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

// =========================================================================
// Tests
// =========================================================================
