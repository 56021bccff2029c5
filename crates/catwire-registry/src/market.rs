//! Market-side registry specialization.

use std::collections::HashSet;

use catwire_protocol::TraderId;

use crate::ClientRegistry;

/// The registry a specialist client keeps: the shared core plus the
/// per-day set of traders registered with this market and the set of
/// traders subscribed to its information feed.
pub struct MarketRegistry {
    /// The shared registry core.
    pub core: ClientRegistry,
    registered: HashSet<TraderId>,
    subscribers: HashSet<TraderId>,
}

impl MarketRegistry {
    /// Creates an empty market registry.
    pub fn new() -> Self {
        Self {
            core: ClientRegistry::new(),
            registered: HashSet::new(),
            subscribers: HashSet::new(),
        }
    }

    /// Resets everything for a new game.
    pub fn game_starting(&mut self) {
        self.core.game_starting();
        self.registered.clear();
        self.subscribers.clear();
    }

    /// Clears the per-day state. Registration and subscription are daily.
    pub fn day_opening(&mut self) {
        self.core.day_opening();
        self.registered.clear();
        self.subscribers.clear();
    }

    /// Records a trader registering with this market today.
    ///
    /// Returns `false` on a repeated registration, which is logged but
    /// tolerated.
    pub fn register_trader(&mut self, id: TraderId) -> bool {
        let inserted = self.registered.insert(id.clone());
        if !inserted {
            tracing::warn!(trader = %id, "trader registered twice today");
        }
        inserted
    }

    /// Records a trader subscribing to this market's information feed.
    pub fn subscribe_trader(&mut self, id: TraderId) -> bool {
        let inserted = self.subscribers.insert(id.clone());
        if !inserted {
            tracing::warn!(trader = %id, "trader subscribed twice today");
        }
        inserted
    }

    /// `true` if the trader is registered with this market today.
    pub fn is_registered(&self, id: &TraderId) -> bool {
        self.registered.contains(id)
    }

    /// Number of traders registered today.
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Iterates the traders subscribed to the information feed.
    pub fn subscribers(&self) -> impl Iterator<Item = &TraderId> {
        self.subscribers.iter()
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
