//! The market (specialist) role client.
//!
//! The matching logic itself is not part of the engine: a market client is
//! constructed around an [`Auctioneer`] collaborator and reaches it only
//! through the narrow trait below. When the auctioneer proposes trades,
//! the engine turns each proposal into a TRANSACTION request, strictly
//! after the server has seen the OK for the shout that triggered it.

use std::sync::Arc;

use catwire_protocol::{Message, ShoutId};
use catwire_registry::{MarketRegistry, Shout};
use catwire_sync::StartBarrier;
use catwire_transport::Connector;

use crate::engine::GameClient;
use crate::event::EventListener;
use crate::phase::{Phase, ReactiveKind};
use crate::{CatwireError, ClientConfig};

/// A trade the auctioneer wants recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeProposal {
    pub ask: ShoutId,
    pub bid: ShoutId,
    pub price: f64,
    pub quantity: u32,
}

/// The order-matching collaborator a market client is built around.
///
/// The engine feeds it the shout stream and tells it when shouts leave
/// the book; whatever it proposes becomes a TRANSACTION request. Matching
/// internals are entirely its own business.
pub trait Auctioneer: Send + 'static {
    /// A new or re-posted shout entered the book. Returns the trades this
    /// shout crosses, if any.
    fn new_shout(&mut self, shout: &Shout) -> Vec<TradeProposal>;

    /// A shout left the book (matched, replaced, or withdrawn).
    fn remove_shout(&mut self, _shout: &ShoutId) {}

    /// The round closed. Returns any end-of-round clears. Default: none.
    fn round_closed(&mut self) -> Vec<TradeProposal> {
        Vec::new()
    }
}

/// A market client: the engine plus the market-side registry and the
/// auctioneer collaborator.
pub struct MarketClient<T: Connector> {
    inner: GameClient<T>,
}

impl<T: Connector> MarketClient<T> {
    /// Creates the client around an auctioneer.
    pub fn new(connector: T, config: ClientConfig, auctioneer: Box<dyn Auctioneer>) -> Self {
        Self {
            inner: GameClient::market(connector, config, auctioneer),
        }
    }

    /// Registers a listener for every auction event.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.inner.add_listener(listener);
    }

    /// Attaches the start-of-game barrier.
    pub fn attach_barrier(&mut self, barrier: Arc<StartBarrier>) {
        self.inner.set_barrier(barrier);
    }

    /// The market-side registry.
    pub fn registry(&self) -> &MarketRegistry {
        self.inner
            .market_registry()
            .expect("market client owns a market registry")
    }

    /// The current protocol phase.
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// The currently armed reactive-session set.
    pub fn armed(&self) -> &[ReactiveKind] {
        self.inner.armed()
    }

    /// The identity established at check-in.
    pub fn client_id(&self) -> Option<&str> {
        self.inner.client_id()
    }

    /// Dials the server and checks in.
    pub async fn connect(&mut self) -> Result<(), CatwireError> {
        self.inner.connect().await
    }

    /// Serves the protocol until the connection ends.
    pub async fn run(&mut self) -> Result<(), CatwireError> {
        self.inner.run().await
    }

    /// Closes the connection, forcing out in-flight sessions.
    pub async fn close(&mut self) {
        self.inner.close().await;
    }

    /// Delivers one inbound message; see
    /// [`GameClient::handle_message`].
    pub async fn handle_message(&mut self, msg: Message) -> Result<(), CatwireError> {
        self.inner.handle_message(msg).await
    }
}
