//! # Catwire
//!
//! Client engine for the CATP continuous double auction protocol.
//!
//! A Catwire client is a per-connection protocol state machine: it checks
//! in with the game server, tracks which server requests are legal at each
//! point in the multi-day, multi-round game lifecycle (the armed
//! reactive-session set), correlates its own requests with their responses
//! through a strict FIFO queue, shadows the server-announced game state in
//! a local registry, and fans every transition out to local listeners as
//! typed [`AuctionEvent`]s.
//!
//! Two role clients specialize the engine: [`TraderClient`] (drives
//! shouts through a typed intent handle) and [`MarketClient`] (wraps an
//! [`Auctioneer`] collaborator that proposes trades).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use catwire::prelude::*;
//!
//! # async fn demo() -> Result<(), CatwireError> {
//! let connector = TcpConnector::new("127.0.0.1:9090");
//! let config = ClientConfig::for_role(Role::Trader).with_random_id();
//! let (mut client, handle) = TraderClient::new(connector, config);
//!
//! tokio::spawn(async move {
//!     // once a day is open and a round is running:
//!     let _ = handle.register(SpecialistId::from("m1")).await;
//!     let _ = handle.bid(9.5, 1).await;
//! });
//! client.run().await
//! # }
//! ```

mod config;
mod engine;
mod error;
mod event;
mod market;
mod phase;
mod trader;

pub use config::{random_client_name, ClientConfig};
pub use engine::{GameClient, ProactiveKind, ShoutRequest};
pub use error::CatwireError;
pub use event::{AuctionEvent, Dispatcher, EventListener, ListenerError};
pub use market::{Auctioneer, MarketClient, TradeProposal};
pub use phase::{armed_for, Phase, ReactiveKind};
pub use trader::{CommandReply, TraderClient, TraderCommand, TraderHandle};

/// The commonly used surface in one import.
pub mod prelude {
    pub use crate::{
        armed_for, AuctionEvent, Auctioneer, CatwireError, ClientConfig, Dispatcher,
        EventListener, GameClient, ListenerError, MarketClient, Phase, ReactiveKind,
        TradeProposal, TraderClient, TraderHandle,
    };

    pub use catwire_protocol::{
        Header, Lifecycle, Message, MessageKind, PostType, Role, ShoutId, SpecialistId, Status,
        TraderId, TransactionId, Verb, PROTOCOL_VERSION, WRONG_TIME,
    };
    pub use catwire_registry::{
        ClientRegistry, FeeSchedule, InconsistencyCounters, MarketRegistry, RegistryError, Shout,
        ShoutState, Specialist, Trader, TraderRegistry, Transaction,
    };
    pub use catwire_session::{Expectation, SessionError, SessionOutcome};
    pub use catwire_sync::{BarrierConfig, BarrierError, StartBarrier};
    pub use catwire_transport::{
        channel_pair, ChannelConnection, ChannelConnector, Connection, ConnectionId, Connector,
        TcpAcceptor, TcpConnection, TcpConnector, TransportError,
    };
}
