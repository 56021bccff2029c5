//! Error types for the registry layer.

use catwire_protocol::ShoutId;

/// Local precondition failures a client detects before contacting the
/// server. Server-announced inconsistencies are never errors; they are
/// logged and counted instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The trader already has an outstanding (non-terminal) shout.
    #[error("trader already has an outstanding shout {0}")]
    ShoutOutstanding(ShoutId),

    /// The standing shout already has a modification awaiting confirmation.
    #[error("shout {0} already has a pending modification")]
    ModificationPending(ShoutId),

    /// The shout is not in a state that can be modified.
    #[error("shout {0} is not standing")]
    NotStanding(ShoutId),

    /// No shout with this id is recorded.
    #[error("unknown shout {0}")]
    UnknownShout(ShoutId),

    /// A fee schedule announcement did not carry five numeric fields.
    #[error("malformed fee schedule: {0:?}")]
    MalformedFees(String),
}
