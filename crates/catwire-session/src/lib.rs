//! Session primitives for Catwire.
//!
//! A *session* is one unit of protocol conversation. Two kinds exist:
//!
//! - **Reactive**: the client expects a server-initiated request, recognizes
//!   it by verb and sub-type ([`Expectation`]), and replies. Matching is a
//!   pure predicate; applying a matched session yields a three-valued
//!   [`SessionOutcome`] instead of using exceptions as control flow.
//! - **Proactive**: the client originates a request and later pairs it with
//!   the first arriving response ([`ProactiveSession`], [`ProactiveQueue`]).
//!   The queue is strict FIFO with at most one session in flight, because
//!   the protocol is request-then-response per connection with no
//!   pipelining.
//!
//! [`TagCell`] implements the tag discipline: the tag of every
//! server-initiated request is stored and echoed on responses and on any
//! proactive request originated until the next tag arrives.
//!
//! Sessions here are transient matchers, not long-lived objects; the engine
//! that owns them decides what a matched request means.

mod error;
mod matcher;
mod proactive;
mod tag;

pub use error::SessionError;
pub use matcher::{Expectation, SessionOutcome};
pub use proactive::{ProactiveQueue, ProactiveSession};
pub use tag::TagCell;
