//! Local auction events and their dispatcher.
//!
//! Every protocol transition the engine handles is turned into one or more
//! [`AuctionEvent`]s and pushed through the [`Dispatcher`] to the local
//! listeners (strategies, reporting, consoles). Dispatch is synchronous and
//! in listener order; a failing listener is logged and counted but never
//! aborts the rest of the batch.

use catwire_protocol::{SpecialistId, TraderId};
use catwire_registry::{FeeSchedule, Shout, Transaction};

/// A locally generated notification of something the server announced or
/// the engine completed.
#[derive(Debug, Clone, PartialEq)]
pub enum AuctionEvent {
    /// Check-in completed with the given identity.
    CheckedIn { id: String },
    /// A new game is about to start; registries have been reset.
    GameStarting,
    /// The game population is complete.
    GameStarted,
    /// A trading day is opening; per-day state has been cleared.
    DayOpening { day: u32 },
    /// The day is open; traders have their private values.
    DayOpened { day: u32 },
    /// A trading round is open; shouts are legal.
    RoundOpened { day: u32, round: u32 },
    /// The round is about to close.
    RoundClosing { day: u32, round: u32 },
    /// The round is closed.
    RoundClosed { day: u32, round: u32 },
    /// The day is closed; popularity has been announced.
    DayClosed { day: u32 },
    /// The game is over; the next game may start.
    GameOver,
    /// The server announced a trader joining the game.
    TraderAnnounced { trader: TraderId, is_seller: bool },
    /// The server announced a specialist joining the game.
    SpecialistAnnounced { specialist: SpecialistId },
    /// A specialist's fee schedule was broadcast.
    FeePosted {
        specialist: SpecialistId,
        fees: FeeSchedule,
    },
    /// A specialist's profit was broadcast.
    ProfitPosted {
        specialist: SpecialistId,
        profit: f64,
    },
    /// An accepted shout was echoed back.
    ShoutPosted { shout: Shout },
    /// A recorded trade was echoed back.
    TransactionPosted { transaction: Transaction },
    /// The trader's private value for the day arrived.
    PrivateValueAssigned { value: f64 },
    /// Day-closed popularity: how many traders registered with a
    /// specialist today.
    RegisteredTradersAnnounced {
        specialist: SpecialistId,
        count: f64,
    },
    /// A trader registered with this market (market role only).
    RegistrationNotice { trader: TraderId },
    /// A trader subscribed to this market's feed (market role only).
    SubscriptionNotice { trader: TraderId },
}

/// Error a listener may return; dispatch logs it and moves on.
#[derive(Debug, thiserror::Error)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

/// Receives auction events on the client's own task.
pub trait EventListener: Send {
    /// Handles one event. Errors are reported, not propagated.
    fn on_event(&mut self, event: &AuctionEvent) -> Result<(), ListenerError>;
}

/// Delivers events to an ordered list of listeners.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<Box<dyn EventListener>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener; it will see every subsequent event.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers one event to every listener in order. Returns the number
    /// of listeners that failed.
    pub fn dispatch(&mut self, event: &AuctionEvent) -> usize {
        let mut failed = 0;
        for listener in &mut self.listeners {
            if let Err(e) = listener.on_event(event) {
                tracing::warn!(?event, error = %e, "listener failed; continuing");
                failed += 1;
            }
        }
        failed
    }
}

// =========================================================================
// Tests
// =========================================================================
