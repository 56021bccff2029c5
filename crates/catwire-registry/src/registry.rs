//! The shared registry core: id-keyed maps plus the consistency rules.

use std::collections::HashMap;

use catwire_protocol::{ShoutId, SpecialistId, TraderId, TransactionId};
use serde::Serialize;

use crate::{Shout, ShoutState, Specialist, Trader, Transaction};

/// Counters for every tolerated inconsistency.
///
/// The registry never throws on a server-announced contradiction; these
/// counters make the tolerated cases observable to tests and operators
/// instead of leaving them as log lines only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InconsistencyCounters {
    /// Traders created lazily on first reference before any announcement.
    pub lazy_traders: u64,
    /// Specialists created lazily on first reference.
    pub lazy_specialists: u64,
    /// Posted shouts disagreeing with the recorded trader identity.
    pub shout_trader_mismatches: u64,
    /// Posted shouts disagreeing with the recorded specialist.
    pub shout_specialist_mismatches: u64,
    /// Matched shouts posted with a different price than recorded.
    pub shout_price_mismatches: u64,
    /// Transactions referencing shouts that are absent or not matched.
    pub transaction_shout_violations: u64,
    /// Transactions whose specialist disagrees with the shouts' specialist;
    /// the locally recorded specialist wins.
    pub transaction_specialist_mismatches: u64,
    /// Transactions re-posted under an already-recorded id.
    pub duplicate_transactions: u64,
}

impl InconsistencyCounters {
    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.lazy_traders
            + self.lazy_specialists
            + self.shout_trader_mismatches
            + self.shout_specialist_mismatches
            + self.shout_price_mismatches
            + self.transaction_shout_violations
            + self.transaction_specialist_mismatches
            + self.duplicate_transactions
    }
}

/// Client-local cache of traders, specialists, shouts, and transactions,
/// rebuilt from server announcements.
///
/// Lifecycle: constructed once per client process; every entry is reset
/// when a game starts; the per-day shout and transaction maps are cleared
/// when a day opens. Counters are process-lifetime.
pub struct ClientRegistry {
    traders: HashMap<TraderId, Trader>,
    specialists: HashMap<SpecialistId, Specialist>,
    /// Cleared on every day opening.
    shouts: HashMap<ShoutId, Shout>,
    /// Cleared on every day opening.
    transactions: HashMap<TransactionId, Transaction>,
    counters: InconsistencyCounters,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            traders: HashMap::new(),
            specialists: HashMap::new(),
            shouts: HashMap::new(),
            transactions: HashMap::new(),
            counters: InconsistencyCounters::default(),
        }
    }

    // -- Lifecycle --------------------------------------------------------

    /// Resets every entry for a new game. Counters survive.
    pub fn game_starting(&mut self) {
        self.traders.clear();
        self.specialists.clear();
        self.shouts.clear();
        self.transactions.clear();
        tracing::debug!("registry reset for new game");
    }

    /// Clears the per-day maps and per-day trader registrations.
    pub fn day_opening(&mut self) {
        self.shouts.clear();
        self.transactions.clear();
        for trader in self.traders.values_mut() {
            trader.registered_with = None;
        }
        tracing::debug!("registry per-day maps cleared");
    }

    // -- Participants -----------------------------------------------------

    /// Records a server-announced trader.
    pub fn announce_trader(&mut self, id: TraderId, is_seller: bool) {
        let trader = self
            .traders
            .entry(id.clone())
            .or_insert_with(|| Trader::new(id, is_seller));
        trader.is_seller = is_seller;
    }

    /// Records a server-announced specialist.
    pub fn announce_specialist(&mut self, id: SpecialistId) {
        self.specialists
            .entry(id.clone())
            .or_insert_with(|| Specialist::new(id));
    }

    /// Looks up a trader.
    pub fn trader(&self, id: &TraderId) -> Option<&Trader> {
        self.traders.get(id)
    }

    /// Looks up a trader, creating it lazily on first reference.
    ///
    /// The server is authoritative; a late or missing announcement must not
    /// crash the client, so an unknown id is warned about and materialized.
    pub fn trader_mut(&mut self, id: &TraderId) -> &mut Trader {
        if !self.traders.contains_key(id) {
            tracing::warn!(trader = %id, "trader referenced before announcement");
            self.counters.lazy_traders += 1;
            self.traders
                .insert(id.clone(), Trader::new(id.clone(), false));
        }
        self.traders.get_mut(id).expect("just inserted")
    }

    /// Looks up a specialist.
    pub fn specialist(&self, id: &SpecialistId) -> Option<&Specialist> {
        self.specialists.get(id)
    }

    /// Looks up a specialist, creating it lazily on first reference.
    pub fn specialist_mut(&mut self, id: &SpecialistId) -> &mut Specialist {
        if !self.specialists.contains_key(id) {
            tracing::warn!(specialist = %id, "specialist referenced before announcement");
            self.counters.lazy_specialists += 1;
            self.specialists
                .insert(id.clone(), Specialist::new(id.clone()));
        }
        self.specialists.get_mut(id).expect("just inserted")
    }

    /// `true` if the specialist has been recorded.
    pub fn knows_specialist(&self, id: &SpecialistId) -> bool {
        self.specialists.contains_key(id)
    }

    // -- Shouts -----------------------------------------------------------

    /// Records a posted shout, reconciling it against any existing record
    /// of the same id.
    ///
    /// Mismatches are logged and counted, never raised: the existing
    /// record's trader identity always wins, and the posted state/price
    /// become the best-known state otherwise.
    pub fn shout_posted(&mut self, incoming: Shout) {
        match self.shouts.get_mut(&incoming.id) {
            None => {
                self.shouts.insert(incoming.id.clone(), incoming);
            }
            Some(existing) => {
                if existing.specialist != incoming.specialist {
                    tracing::warn!(
                        shout = %incoming.id,
                        recorded = %existing.specialist,
                        posted = %incoming.specialist,
                        "posted shout disagrees on specialist"
                    );
                    self.counters.shout_specialist_mismatches += 1;
                }
                if existing.trader != incoming.trader {
                    tracing::warn!(
                        shout = %incoming.id,
                        recorded = %existing.trader,
                        posted = %incoming.trader,
                        "posted shout disagrees on trader; keeping recorded trader"
                    );
                    self.counters.shout_trader_mismatches += 1;
                }
                if incoming.state == ShoutState::Matched
                    && existing.state == ShoutState::Matched
                    && existing.price != incoming.price
                {
                    tracing::warn!(
                        shout = %incoming.id,
                        recorded = existing.price,
                        posted = incoming.price,
                        "matched shout re-posted with a different price"
                    );
                    self.counters.shout_price_mismatches += 1;
                }
                existing.price = incoming.price;
                existing.quantity = incoming.quantity;
                existing.is_bid = incoming.is_bid;
                existing.state = incoming.state;
                existing.specialist = incoming.specialist;
                // Trader identity deliberately not overwritten.
            }
        }
    }

    /// Looks up a shout.
    pub fn shout(&self, id: &ShoutId) -> Option<&Shout> {
        self.shouts.get(id)
    }

    /// Mutable shout lookup, for the trader's own modification chain.
    pub fn shout_mut(&mut self, id: &ShoutId) -> Option<&mut Shout> {
        self.shouts.get_mut(id)
    }

    /// Number of shouts recorded today.
    pub fn shout_count(&self) -> usize {
        self.shouts.len()
    }

    // -- Transactions -----------------------------------------------------

    /// Records a posted transaction.
    ///
    /// Both referenced shouts must already be recorded in `Matched` state;
    /// violations are logged and counted, never silently repaired. A
    /// specialist disagreement keeps the locally recorded specialist.
    pub fn transaction_posted(&mut self, mut incoming: Transaction) {
        for shout_id in [&incoming.ask, &incoming.bid] {
            match self.shouts.get(shout_id) {
                None => {
                    tracing::warn!(
                        transaction = %incoming.id,
                        shout = %shout_id,
                        "transaction references an unknown shout"
                    );
                    self.counters.transaction_shout_violations += 1;
                }
                Some(shout) if shout.state != ShoutState::Matched => {
                    tracing::warn!(
                        transaction = %incoming.id,
                        shout = %shout_id,
                        state = %shout.state,
                        "transaction references a shout that is not matched"
                    );
                    self.counters.transaction_shout_violations += 1;
                }
                Some(_) => {}
            }
        }

        if let Some(shout) = self.shouts.get(&incoming.ask) {
            if shout.specialist != incoming.specialist {
                tracing::warn!(
                    transaction = %incoming.id,
                    posted = %incoming.specialist,
                    recorded = %shout.specialist,
                    "transaction disagrees on specialist; keeping recorded specialist"
                );
                self.counters.transaction_specialist_mismatches += 1;
                incoming.specialist = shout.specialist.clone();
            }
        }

        if self.transactions.contains_key(&incoming.id) {
            tracing::warn!(transaction = %incoming.id, "transaction re-posted");
            self.counters.duplicate_transactions += 1;
        }
        self.transactions.insert(incoming.id.clone(), incoming);
    }

    /// Looks up a transaction.
    pub fn transaction(&self, id: &TransactionId) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// Number of transactions recorded today.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    // -- Introspection ----------------------------------------------------

    /// Number of known traders.
    pub fn trader_count(&self) -> usize {
        self.traders.len()
    }

    /// Number of known specialists.
    pub fn specialist_count(&self) -> usize {
        self.specialists.len()
    }

    /// The tolerated-inconsistency counters.
    pub fn counters(&self) -> &InconsistencyCounters {
        &self.counters
    }
}

impl Default for ClientRegistry {
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

    fn tid(s: &str) -> TraderId {
        TraderId::from(s)
    }

    fn mid(s: &str) -> SpecialistId {
        SpecialistId::from(s)
    }

    fn placed_shout(id: &str, trader: &str, specialist: &str, price: f64) -> Shout {
        let mut s = Shout::new(ShoutId::from(id), price, 1, true, tid(trader), mid(specialist));
        s.state = ShoutState::Placed;
        s
    }

    fn matched_shout(id: &str, trader: &str, specialist: &str, price: f64) -> Shout {
        let mut s = placed_shout(id, trader, specialist, price);
        s.state = ShoutState::Matched;
        s
    }

    fn transaction(id: &str, ask: &str, bid: &str, specialist: &str) -> Transaction {
        Transaction {
            id: TransactionId::from(id),
            ask: ShoutId::from(ask),
            bid: ShoutId::from(bid),
            price: 10.0,
            quantity: 1,
            specialist: mid(specialist),
        }
    }

    // =====================================================================
    // Lifecycle
    // =====================================================================

    #[test]
    fn test_game_starting_resets_all_entries() {
        let mut reg = ClientRegistry::new();
        reg.announce_trader(tid("t1"), false);
        reg.announce_specialist(mid("m1"));
        reg.shout_posted(placed_shout("s1", "t1", "m1", 9.0));

        reg.game_starting();

        assert_eq!(reg.trader_count(), 0);
        assert_eq!(reg.specialist_count(), 0);
        assert_eq!(reg.shout_count(), 0);
        assert_eq!(reg.transaction_count(), 0);
    }

    #[test]
    fn test_day_opening_clears_only_per_day_maps() {
        let mut reg = ClientRegistry::new();
        reg.announce_trader(tid("t1"), false);
        reg.trader_mut(&tid("t1")).registered_with = Some(mid("m1"));
        reg.announce_specialist(mid("m1"));
        reg.shout_posted(placed_shout("s1", "t1", "m1", 9.0));

        reg.day_opening();

        assert_eq!(reg.trader_count(), 1);
        assert_eq!(reg.specialist_count(), 1);
        assert_eq!(reg.shout_count(), 0);
        assert!(reg.trader(&tid("t1")).unwrap().registered_with.is_none());
    }

    // =====================================================================
    // Lazy creation
    // =====================================================================

    #[test]
    fn test_unannounced_trader_is_created_lazily_and_counted() {
        let mut reg = ClientRegistry::new();

        let trader = reg.trader_mut(&tid("ghost"));
        assert_eq!(trader.id, tid("ghost"));
        assert_eq!(reg.counters().lazy_traders, 1);

        // Second reference does not count again.
        reg.trader_mut(&tid("ghost"));
        assert_eq!(reg.counters().lazy_traders, 1);
    }

    #[test]
    fn test_unannounced_specialist_is_created_lazily_and_counted() {
        let mut reg = ClientRegistry::new();
        reg.specialist_mut(&mid("ghost"));
        assert_eq!(reg.counters().lazy_specialists, 1);
        assert!(reg.knows_specialist(&mid("ghost")));
    }

    #[test]
    fn test_announced_trader_is_not_counted_as_lazy() {
        let mut reg = ClientRegistry::new();
        reg.announce_trader(tid("t1"), true);
        reg.trader_mut(&tid("t1"));
        assert_eq!(reg.counters().lazy_traders, 0);
        assert!(reg.trader(&tid("t1")).unwrap().is_seller);
    }

    // =====================================================================
    // Shout consistency
    // =====================================================================

    #[test]
    fn test_shout_specialist_mismatch_is_counted_not_raised() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(placed_shout("s1", "t1", "m1", 9.0));
        reg.shout_posted(placed_shout("s1", "t1", "m2", 9.0));

        assert_eq!(reg.counters().shout_specialist_mismatches, 1);
    }

    #[test]
    fn test_shout_trader_mismatch_keeps_recorded_trader() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(placed_shout("s1", "t1", "m1", 9.0));
        reg.shout_posted(placed_shout("s1", "t2", "m1", 9.0));

        assert_eq!(reg.counters().shout_trader_mismatches, 1);
        assert_eq!(reg.shout(&ShoutId::from("s1")).unwrap().trader, tid("t1"));
    }

    #[test]
    fn test_matched_price_mismatch_is_counted() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(matched_shout("s1", "t1", "m1", 9.0));
        reg.shout_posted(matched_shout("s1", "t1", "m1", 9.5));

        assert_eq!(reg.counters().shout_price_mismatches, 1);
        // Best-known state: the posted price stands.
        assert_eq!(reg.shout(&ShoutId::from("s1")).unwrap().price, 9.5);
    }

    #[test]
    fn test_consistent_repost_updates_state_without_counting() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(placed_shout("s1", "t1", "m1", 9.0));
        reg.shout_posted(matched_shout("s1", "t1", "m1", 9.0));

        assert_eq!(reg.counters().total(), 0);
        assert_eq!(
            reg.shout(&ShoutId::from("s1")).unwrap().state,
            ShoutState::Matched
        );
    }

    // =====================================================================
    // Transaction consistency
    // =====================================================================

    #[test]
    fn test_transaction_with_matched_shouts_is_clean() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(matched_shout("a1", "t1", "m1", 10.0));
        reg.shout_posted(matched_shout("b1", "t2", "m1", 10.0));

        reg.transaction_posted(transaction("x1", "a1", "b1", "m1"));

        assert_eq!(reg.counters().total(), 0);
        assert_eq!(reg.transaction_count(), 1);
    }

    #[test]
    fn test_transaction_with_unknown_shout_is_counted() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(matched_shout("a1", "t1", "m1", 10.0));

        reg.transaction_posted(transaction("x1", "a1", "missing", "m1"));

        assert_eq!(reg.counters().transaction_shout_violations, 1);
        // Still recorded with best-known state.
        assert_eq!(reg.transaction_count(), 1);
    }

    #[test]
    fn test_transaction_with_unmatched_shout_is_counted() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(placed_shout("a1", "t1", "m1", 10.0));
        reg.shout_posted(matched_shout("b1", "t2", "m1", 10.0));

        reg.transaction_posted(transaction("x1", "a1", "b1", "m1"));

        assert_eq!(reg.counters().transaction_shout_violations, 1);
    }

    #[test]
    fn test_transaction_specialist_mismatch_keeps_local_specialist() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(matched_shout("a1", "t1", "m1", 10.0));
        reg.shout_posted(matched_shout("b1", "t2", "m1", 10.0));

        reg.transaction_posted(transaction("x1", "a1", "b1", "m2"));

        assert_eq!(reg.counters().transaction_specialist_mismatches, 1);
        assert_eq!(
            reg.transaction(&TransactionId::from("x1")).unwrap().specialist,
            mid("m1")
        );
    }

    #[test]
    fn test_duplicate_transaction_id_is_counted() {
        let mut reg = ClientRegistry::new();
        reg.shout_posted(matched_shout("a1", "t1", "m1", 10.0));
        reg.shout_posted(matched_shout("b1", "t2", "m1", 10.0));

        reg.transaction_posted(transaction("x1", "a1", "b1", "m1"));
        reg.transaction_posted(transaction("x1", "a1", "b1", "m1"));

        assert_eq!(reg.counters().duplicate_transactions, 1);
        assert_eq!(reg.transaction_count(), 1);
    }
}
