//! Proactive sessions: client-originated requests awaiting their response.

use std::collections::VecDeque;

use catwire_protocol::Message;
use tokio::sync::oneshot;

use crate::SessionError;

/// One client-originated request together with the caller waiting on it.
///
/// The `kind` is engine-defined context that survives until the response
/// arrives, so the response handler knows what the original request meant.
/// The reply channel is optional: fire-and-forget requests carry `None`.
///
/// The error type of the reply defaults to [`SessionError`] but may be any
/// type a forced-out session can be converted into.
pub struct ProactiveSession<K, E = SessionError>
where
    E: From<SessionError>,
{
    /// Engine-defined request context.
    pub kind: K,
    /// The outbound request, kept for correlation and logging.
    pub request: Message,
    reply: Option<oneshot::Sender<Result<Message, E>>>,
}

impl<K, E: From<SessionError>> ProactiveSession<K, E> {
    /// Creates a fire-and-forget session.
    pub fn new(kind: K, request: Message) -> Self {
        Self {
            kind,
            request,
            reply: None,
        }
    }

    /// Creates a session whose caller awaits the result.
    pub fn with_reply(
        kind: K,
        request: Message,
        reply: oneshot::Sender<Result<Message, E>>,
    ) -> Self {
        Self {
            kind,
            request,
            reply: Some(reply),
        }
    }

    /// Delivers the final result to the waiting caller, if any.
    ///
    /// A caller that stopped listening is not an error.
    pub fn resolve(self, result: Result<Message, E>) {
        if let Some(tx) = self.reply {
            let _ = tx.send(result);
        }
    }
}

/// Strict-FIFO queue of proactive sessions.
///
/// The head of the queue is the one session in flight; everything behind it
/// has not been sent yet. Pushing returns whether the new session became
/// the head (and must therefore be sent now); popping the head on a
/// response exposes the next request to send via [`next_request`].
///
/// [`next_request`]: ProactiveQueue::next_request
pub struct ProactiveQueue<K, E = SessionError>
where
    E: From<SessionError>,
{
    inner: VecDeque<ProactiveSession<K, E>>,
}

impl<K, E: From<SessionError>> ProactiveQueue<K, E> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    /// Enqueues a session. Returns `true` if it is now the head and its
    /// request must be sent immediately.
    pub fn push(&mut self, session: ProactiveSession<K, E>) -> bool {
        self.inner.push_back(session);
        self.inner.len() == 1
    }

    /// Removes and returns the in-flight session to pair it with the first
    /// arriving response. `None` means the response was unexpected.
    pub fn take_head(&mut self) -> Option<ProactiveSession<K, E>> {
        self.inner.pop_front()
    }

    /// The request of the new head, to be sent after the previous head was
    /// resolved.
    pub fn next_request(&self) -> Option<&Message> {
        self.inner.front().map(|s| &s.request)
    }

    /// Number of queued sessions, including the in-flight head.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `true` if nothing is queued or in flight.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Fails every queued session with [`SessionError::ForcedOut`],
    /// unblocking all waiting callers. Returns how many were abandoned.
    pub fn force_out(&mut self) -> usize {
        let count = self.inner.len();
        for session in self.inner.drain(..) {
            session.resolve(Err(SessionError::ForcedOut.into()));
        }
        if count > 0 {
            tracing::debug!(count, "forced out pending proactive sessions");
        }
        count
    }
}

impl<K, E: From<SessionError>> Default for ProactiveQueue<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use catwire_protocol::{Header, Status, Verb};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        CheckIn,
        Ask,
        Register,
    }

    fn queue() -> ProactiveQueue<Kind> {
        ProactiveQueue::new()
    }

    #[test]
    fn test_push_reports_head_only_for_first_session() {
        let mut q = queue();
        assert!(q.push(ProactiveSession::new(
            Kind::CheckIn,
            Message::request(Verb::CheckIn)
        )));
        assert!(!q.push(ProactiveSession::new(Kind::Ask, Message::request(Verb::Ask))));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_take_head_is_fifo_and_reproduces_request_context() {
        let mut q = queue();
        q.push(ProactiveSession::new(
            Kind::CheckIn,
            Message::request(Verb::CheckIn),
        ));
        q.push(ProactiveSession::new(
            Kind::Ask,
            Message::request(Verb::Ask).with_header(Header::Value, "9 1"),
        ));

        let head = q.take_head().expect("head should exist");
        assert_eq!(head.kind, Kind::CheckIn);
        assert_eq!(head.request.verb(), Some(Verb::CheckIn));

        // The next request to send is the ask that was queued behind it.
        assert_eq!(q.next_request().unwrap().verb(), Some(Verb::Ask));

        let next = q.take_head().expect("second head should exist");
        assert_eq!(next.kind, Kind::Ask);
        assert_eq!(next.request.header(Header::Value), Some("9 1"));
        assert!(q.take_head().is_none());
    }

    #[tokio::test]
    async fn test_resolve_delivers_response_to_caller() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let session: ProactiveSession<Kind> =
            ProactiveSession::with_reply(Kind::Register, Message::request(Verb::Register), tx);

        session.resolve(Ok(Message::response(Status::Ok)));

        let result = rx.await.expect("reply should arrive");
        assert_eq!(result.unwrap().status(), Some(Status::Ok));
    }

    #[tokio::test]
    async fn test_force_out_fails_every_waiting_caller() {
        let mut q = queue();
        let (tx1, rx1) = tokio::sync::oneshot::channel();
        let (tx2, rx2) = tokio::sync::oneshot::channel();
        q.push(ProactiveSession::with_reply(
            Kind::CheckIn,
            Message::request(Verb::CheckIn),
            tx1,
        ));
        q.push(ProactiveSession::with_reply(
            Kind::Ask,
            Message::request(Verb::Ask),
            tx2,
        ));

        assert_eq!(q.force_out(), 2);
        assert!(q.is_empty());

        assert_eq!(rx1.await.unwrap().unwrap_err(), SessionError::ForcedOut);
        assert_eq!(rx2.await.unwrap().unwrap_err(), SessionError::ForcedOut);
    }

    #[test]
    fn test_resolve_without_listener_is_quiet() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        drop(rx);
        let session: ProactiveSession<Kind> =
            ProactiveSession::with_reply(Kind::Ask, Message::request(Verb::Ask), tx);
        // Must not panic when the caller has gone away.
        session.resolve(Ok(Message::response(Status::Ok)));
    }

    #[test]
    fn test_force_out_on_empty_queue_is_zero() {
        let mut q = queue();
        assert_eq!(q.force_out(), 0);
    }
}
