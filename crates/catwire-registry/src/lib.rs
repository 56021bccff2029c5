//! Client-local registry for Catwire.
//!
//! Every client keeps a shadow of the game state the server has announced
//! to it: traders, specialists, the current day's shouts and transactions.
//! The registry is rebuilt from server announcements, reset when a game
//! starts, and its per-day maps are cleared when a day opens.
//!
//! The server is authoritative. When an announcement contradicts what is
//! already recorded, the registry logs the inconsistency, counts it in
//! [`InconsistencyCounters`], and continues with the best-known state; it
//! never crashes a participant over a record it does not control. The only
//! hard errors ([`RegistryError`]) are local preconditions a client checks
//! before talking to the server, such as the one-outstanding-shout rule.
//!
//! # Key types
//!
//! - [`ClientRegistry`], the shared core: id-keyed maps plus the
//!   consistency rules
//! - [`MarketRegistry`] / [`TraderRegistry`], role specializations adding
//!   per-day registration, subscription, and own-shout bookkeeping
//! - [`Shout`], [`Transaction`], [`Trader`], [`Specialist`],
//!   [`FeeSchedule`], the data model

mod error;
mod market;
mod model;
mod registry;
mod trader;

pub use error::RegistryError;
pub use market::MarketRegistry;
pub use model::{FeeSchedule, Shout, ShoutState, Specialist, Trader, Transaction};
pub use registry::{ClientRegistry, InconsistencyCounters};
pub use trader::TraderRegistry;
