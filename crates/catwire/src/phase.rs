//! The protocol state machine, encoded as data.
//!
//! The engine's state is *the set of reactive sessions currently armed*:
//! the requests the server may legally send next. [`armed_for`] is the
//! whole transition table: a pure function of the current [`Phase`] and
//! the client's role, so the armed set after any number of transitions
//! depends only on where the client is, never on how it got there.
//!
//! ```text
//! [Disconnected] --CHECKIN ok--> CheckedIn
//! CheckedIn    --GameStarting--> GameStarting
//! GameStarting --GameStarted---> GameStarted     [POST Trader/Specialist]
//! GameStarted  --DayOpening----> DayOpening      [POST Fee]
//! DayOpening   --DayOpened-----> DayOpened       [market: REGISTER, SUBSCRIBE]
//! DayOpened    --RoundOpened---> RoundOpened     [POST Ask/Bid/Transaction]
//! RoundOpened  --RoundClosing--> RoundClosing
//! RoundClosing --RoundClosed---> RoundClosed
//! RoundClosed  --RoundOpened---> RoundOpened     (next round)
//! RoundClosed  --DayClosed-----> DayClosed       [POST Profit]
//! DayClosed    --DayOpening----> DayOpening      (next day)
//! DayClosed    --GameOver------> CheckedIn       (next game)
//! ```
//!
//! The Sync session (legal only before the first day of a game) lets a
//! client that reconnected mid-game catch up from an OPTIONS DayClosed;
//! the Oracle session answers anything else with INVALID/WrongTime.

use catwire_protocol::{Lifecycle, PostType, Role, Verb};
use catwire_session::Expectation;

/// Where the client currently is in the game lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Disconnected,
    CheckedIn,
    GameStarting,
    GameStarted,
    DayOpening,
    DayOpened,
    RoundOpened,
    RoundClosing,
    RoundClosed,
    DayClosed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Disconnected => "Disconnected",
            Phase::CheckedIn => "CheckedIn",
            Phase::GameStarting => "GameStarting",
            Phase::GameStarted => "GameStarted",
            Phase::DayOpening => "DayOpening",
            Phase::DayOpened => "DayOpened",
            Phase::RoundOpened => "RoundOpened",
            Phase::RoundClosing => "RoundClosing",
            Phase::RoundClosed => "RoundClosed",
            Phase::DayClosed => "DayClosed",
        };
        f.write_str(s)
    }
}

/// The reactive sessions the engine knows how to arm.
///
/// These are stateless table entries, not allocated objects; arming is
/// just selecting a subset for the current phase and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveKind {
    GameStarting,
    GameStarted,
    DayOpening,
    DayOpened,
    RoundOpened,
    RoundClosing,
    RoundClosed,
    DayClosed,
    GameOver,
    PostTrader,
    PostSpecialist,
    PostFee,
    PostProfit,
    PostAsk,
    PostBid,
    PostTransaction,
    /// Server-forwarded REGISTER, market role only.
    RegisterNotice,
    /// Server-forwarded SUBSCRIBE, market role only.
    SubscribeNotice,
    /// Mid-game reconnection catch-up on OPTIONS DayClosed.
    Sync,
    /// Catch-all; answers INVALID/WrongTime and changes nothing.
    Oracle,
}

impl ReactiveKind {
    /// What this session expects from the server.
    pub fn expectation(self) -> Expectation {
        match self {
            ReactiveKind::GameStarting => options(Lifecycle::GameStarting),
            ReactiveKind::GameStarted => options(Lifecycle::GameStarted),
            ReactiveKind::DayOpening => options(Lifecycle::DayOpening),
            ReactiveKind::DayOpened => options(Lifecycle::DayOpened),
            ReactiveKind::RoundOpened => options(Lifecycle::RoundOpened),
            ReactiveKind::RoundClosing => options(Lifecycle::RoundClosing),
            ReactiveKind::RoundClosed => options(Lifecycle::RoundClosed),
            ReactiveKind::DayClosed => options(Lifecycle::DayClosed),
            ReactiveKind::GameOver => options(Lifecycle::GameOver),
            ReactiveKind::PostTrader => post(PostType::Trader),
            ReactiveKind::PostSpecialist => post(PostType::Specialist),
            ReactiveKind::PostFee => post(PostType::Fee),
            ReactiveKind::PostProfit => post(PostType::Profit),
            ReactiveKind::PostAsk => post(PostType::Ask),
            ReactiveKind::PostBid => post(PostType::Bid),
            ReactiveKind::PostTransaction => post(PostType::Transaction),
            ReactiveKind::RegisterNotice => Expectation::verb(Verb::Register),
            ReactiveKind::SubscribeNotice => Expectation::verb(Verb::Subscribe),
            ReactiveKind::Sync => options(Lifecycle::DayClosed),
            ReactiveKind::Oracle => Expectation::any(),
        }
    }
}

fn options(stage: Lifecycle) -> Expectation {
    Expectation::verb(Verb::Options).with_subtype(stage.as_wire())
}

fn post(kind: PostType) -> Expectation {
    Expectation::verb(Verb::Post).with_subtype(kind.as_wire())
}

/// The transition table: which reactive sessions are legal in a phase.
///
/// The set is replaced wholesale on every transition. Candidates are tried
/// in order, so the most specific sessions come first and the Oracle is
/// always last. The set never exceeds 8 entries.
pub fn armed_for(phase: Phase, role: Role) -> Vec<ReactiveKind> {
    use ReactiveKind::*;
    match (phase, role) {
        (Phase::Disconnected, _) => vec![],
        (Phase::CheckedIn, _) => vec![GameStarting, Sync, Oracle],
        (Phase::GameStarting, _) => {
            vec![GameStarted, PostTrader, PostSpecialist, Sync, Oracle]
        }
        (Phase::GameStarted, _) => {
            vec![DayOpening, PostTrader, PostSpecialist, Sync, Oracle]
        }
        (Phase::DayOpening, _) => vec![DayOpened, PostFee, Oracle],
        (Phase::DayOpened, Role::Specialist) => {
            vec![RoundOpened, RegisterNotice, SubscribeNotice, PostFee, Oracle]
        }
        (Phase::DayOpened, Role::Trader) => vec![RoundOpened, PostFee, Oracle],
        (Phase::RoundOpened, Role::Specialist) => vec![
            RoundClosing,
            PostAsk,
            PostBid,
            PostTransaction,
            RegisterNotice,
            SubscribeNotice,
            Oracle,
        ],
        (Phase::RoundOpened, Role::Trader) => {
            vec![RoundClosing, PostAsk, PostBid, PostTransaction, Oracle]
        }
        (Phase::RoundClosing, _) => {
            vec![RoundClosed, PostAsk, PostBid, PostTransaction, Oracle]
        }
        (Phase::RoundClosed, _) => {
            vec![RoundOpened, DayClosed, PostProfit, PostTransaction, Oracle]
        }
        (Phase::DayClosed, _) => vec![GameOver, DayOpening, Oracle],
    }
}

// =========================================================================
// Tests
// =========================================================================
