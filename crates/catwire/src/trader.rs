//! The trader role client.
//!
//! A trading strategy does not call into the engine directly; it holds a
//! [`TraderHandle`] and sends typed intents over a channel. Each intent
//! carries a reply slot, and the handle's async methods resolve when the
//! server's response arrives (or immediately, when the intent is rejected
//! locally before the server is ever contacted). If the connection is
//! force-closed while an intent is in flight, the caller gets
//! [`SessionError::ForcedOut`](catwire_session::SessionError::ForcedOut)
//! instead of hanging.

use std::sync::Arc;

use catwire_protocol::{Message, ShoutId, SpecialistId};
use catwire_registry::TraderRegistry;
use catwire_sync::StartBarrier;
use catwire_transport::Connector;
use tokio::sync::{mpsc, oneshot};

use crate::engine::GameClient;
use crate::event::EventListener;
use crate::phase::{Phase, ReactiveKind};
use crate::{CatwireError, ClientConfig};

/// Reply slot carried by every trader intent.
pub type CommandReply = oneshot::Sender<Result<Message, CatwireError>>;

/// Typed intents a trading strategy can raise.
pub enum TraderCommand {
    /// Register with a specialist for the current day.
    Register {
        specialist: SpecialistId,
        reply: CommandReply,
    },
    /// Subscribe to a specialist's market information feed.
    Subscribe {
        specialist: SpecialistId,
        reply: CommandReply,
    },
    /// Place a new shout.
    Place {
        price: f64,
        quantity: u32,
        is_bid: bool,
        reply: CommandReply,
    },
    /// Modify the standing shout's price.
    Modify {
        shout: ShoutId,
        price: f64,
        reply: CommandReply,
    },
}

/// The strategy's side of the intent channel. Cheap to clone.
#[derive(Clone)]
pub struct TraderHandle {
    commands: mpsc::UnboundedSender<TraderCommand>,
}

impl TraderHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<TraderCommand>) -> Self {
        Self { commands }
    }

    /// Registers with a specialist; resolves with the server's response.
    pub async fn register(&self, specialist: SpecialistId) -> Result<Message, CatwireError> {
        self.request(|reply| TraderCommand::Register { specialist, reply })
            .await
    }

    /// Subscribes to a specialist's feed; resolves with the response.
    pub async fn subscribe(&self, specialist: SpecialistId) -> Result<Message, CatwireError> {
        self.request(|reply| TraderCommand::Subscribe { specialist, reply })
            .await
    }

    /// Places a shout; resolves once the server accepted or refused it.
    ///
    /// # Errors
    /// [`RegistryError::ShoutOutstanding`](catwire_registry::RegistryError)
    /// without contacting the server when a shout is already standing.
    pub async fn place(
        &self,
        price: f64,
        quantity: u32,
        is_bid: bool,
    ) -> Result<Message, CatwireError> {
        self.request(|reply| TraderCommand::Place {
            price,
            quantity,
            is_bid,
            reply,
        })
        .await
    }

    /// Places a buy shout.
    pub async fn bid(&self, price: f64, quantity: u32) -> Result<Message, CatwireError> {
        self.place(price, quantity, true).await
    }

    /// Places a sell shout.
    pub async fn ask(&self, price: f64, quantity: u32) -> Result<Message, CatwireError> {
        self.place(price, quantity, false).await
    }

    /// Modifies the standing shout's price.
    ///
    /// # Errors
    /// [`RegistryError::ModificationPending`](catwire_registry::RegistryError)
    /// without contacting the server while an earlier modification is
    /// still unconfirmed.
    pub async fn modify(&self, shout: ShoutId, price: f64) -> Result<Message, CatwireError> {
        self.request(|reply| TraderCommand::Modify {
            shout,
            price,
            reply,
        })
        .await
    }

    async fn request(
        &self,
        make: impl FnOnce(CommandReply) -> TraderCommand,
    ) -> Result<Message, CatwireError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| CatwireError::CommandChannelClosed)?;
        rx.await.map_err(|_| CatwireError::CommandChannelClosed)?
    }
}

/// A trader client: the engine plus the trader-side registry and intents.
pub struct TraderClient<T: Connector> {
    inner: GameClient<T>,
}

impl<T: Connector> TraderClient<T> {
    /// Creates the client and the handle its strategy talks through.
    pub fn new(connector: T, config: ClientConfig) -> (Self, TraderHandle) {
        let (inner, handle) = GameClient::trader(connector, config);
        (Self { inner }, handle)
    }

    /// Registers a listener for every auction event.
    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.inner.add_listener(listener);
    }

    /// Attaches the start-of-game barrier.
    pub fn attach_barrier(&mut self, barrier: Arc<StartBarrier>) {
        self.inner.set_barrier(barrier);
    }

    /// The trader-side registry.
    pub fn registry(&self) -> &TraderRegistry {
        self.inner
            .trader_registry()
            .expect("trader client owns a trader registry")
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

    /// Executes one pending intent; see
    /// [`GameClient::process_next_command`].
    pub async fn process_next_command(&mut self) -> Result<(), CatwireError> {
        self.inner.process_next_command().await
    }
}
