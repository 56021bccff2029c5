//! The data model shadowed from server announcements.

use catwire_protocol::{ShoutId, SpecialistId, TraderId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::RegistryError;

// ---------------------------------------------------------------------------
// Shout
// ---------------------------------------------------------------------------

/// The lifecycle state of a shout.
///
/// ```text
/// Pending ──(accepted)──→ Placed ──(trade)──→ Matched
///    │                       │
///    └──(refused)──→ Rejected ←──(refused modification keeps parent Placed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShoutState {
    /// Sent to the server, not yet accepted.
    Pending,
    /// Standing in a specialist's book.
    Placed,
    /// Crossed into a transaction.
    Matched,
    /// Refused by the server or the specialist.
    Rejected,
}

impl ShoutState {
    /// `true` once the shout can never stand again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ShoutState::Matched | ShoutState::Rejected)
    }

    /// Parses the wire spelling used in shout echoes.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(ShoutState::Pending),
            "Placed" => Some(ShoutState::Placed),
            "Matched" => Some(ShoutState::Matched),
            "Rejected" => Some(ShoutState::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShoutState::Pending => "Pending",
            ShoutState::Placed => "Placed",
            ShoutState::Matched => "Matched",
            ShoutState::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// A single ask or bid.
///
/// A price modification does not replace the standing shout: it is attached
/// as a `child` so the parent remains valid until the server confirms or
/// refuses the change. The chain is at most one deep; a second modification
/// while one is pending is rejected locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shout {
    pub id: ShoutId,
    pub price: f64,
    pub quantity: u32,
    pub is_bid: bool,
    pub trader: TraderId,
    pub specialist: SpecialistId,
    pub state: ShoutState,
    /// Pending modification, if any.
    pub child: Option<Box<Shout>>,
}

impl Shout {
    /// Creates a shout in the `Pending` state with no modification chain.
    pub fn new(
        id: ShoutId,
        price: f64,
        quantity: u32,
        is_bid: bool,
        trader: TraderId,
        specialist: SpecialistId,
    ) -> Self {
        Self {
            id,
            price,
            quantity,
            is_bid,
            trader,
            specialist,
            state: ShoutState::Pending,
            child: None,
        }
    }

    /// `true` for a sell shout.
    pub fn is_ask(&self) -> bool {
        !self.is_bid
    }

    /// Attaches a pending modification to a standing shout.
    ///
    /// # Errors
    /// - [`RegistryError::NotStanding`] if the shout is not `Placed`
    /// - [`RegistryError::ModificationPending`] if a child is already
    ///   attached
    pub fn attach_child(&mut self, child: Shout) -> Result<(), RegistryError> {
        if self.state != ShoutState::Placed {
            return Err(RegistryError::NotStanding(self.id.clone()));
        }
        if self.child.is_some() {
            return Err(RegistryError::ModificationPending(self.id.clone()));
        }
        self.child = Some(Box::new(child));
        Ok(())
    }

    /// Absorbs the confirmed modification: the child's price and quantity
    /// become the standing values and the chain empties.
    pub fn confirm_child(&mut self) -> Result<(), RegistryError> {
        let child = self
            .child
            .take()
            .ok_or_else(|| RegistryError::UnknownShout(self.id.clone()))?;
        self.price = child.price;
        self.quantity = child.quantity;
        self.state = ShoutState::Placed;
        Ok(())
    }

    /// Drops the refused modification; the parent keeps standing.
    pub fn reject_child(&mut self) -> Result<(), RegistryError> {
        self.child
            .take()
            .map(|_| ())
            .ok_or_else(|| RegistryError::UnknownShout(self.id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A recorded trade between one ask and one bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub ask: ShoutId,
    pub bid: ShoutId,
    pub price: f64,
    pub quantity: u32,
    pub specialist: SpecialistId,
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// A trader known to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trader {
    pub id: TraderId,
    pub is_seller: bool,
    /// The specialist this trader is registered with today, if any.
    pub registered_with: Option<SpecialistId>,
    pub balance: f64,
}

impl Trader {
    /// Creates a trader with no registration and a zero balance.
    pub fn new(id: TraderId, is_seller: bool) -> Self {
        Self {
            id,
            is_seller,
            registered_with: None,
            balance: 0.0,
        }
    }
}

/// A specialist known to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialist {
    pub id: SpecialistId,
    pub fees: Option<FeeSchedule>,
    pub profit: f64,
    /// Registered-trader count as of the last day-closed announcement.
    pub popularity: f64,
}

impl Specialist {
    /// Creates a specialist with no announced fees.
    pub fn new(id: SpecialistId) -> Self {
        Self {
            id,
            fees: None,
            profit: 0.0,
            popularity: 0.0,
        }
    }
}

/// The five fees a specialist charges, announced as a whitespace-separated
/// `VALUE` list in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub registration: f64,
    pub information: f64,
    pub shout: f64,
    pub transaction: f64,
    pub profit: f64,
}

impl FeeSchedule {
    /// Parses the wire `VALUE` form, e.g. `"1 0.5 0.1 0.1 0.05"`.
    pub fn from_wire(value: &str) -> Result<Self, RegistryError> {
        let fields: Vec<f64> = value
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| RegistryError::MalformedFees(value.to_string()))?;
        let [registration, information, shout, transaction, profit] = fields[..] else {
            return Err(RegistryError::MalformedFees(value.to_string()));
        };
        Ok(Self {
            registration,
            information,
            shout,
            transaction,
            profit,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(id: &str, price: f64) -> Shout {
        Shout::new(
            ShoutId::from(id),
            price,
            1,
            true,
            TraderId::from("t1"),
            SpecialistId::from("m1"),
        )
    }

    #[test]
    fn test_shout_states_terminality() {
        assert!(!ShoutState::Pending.is_terminal());
        assert!(!ShoutState::Placed.is_terminal());
        assert!(ShoutState::Matched.is_terminal());
        assert!(ShoutState::Rejected.is_terminal());
    }

    #[test]
    fn test_attach_child_requires_placed_parent() {
        let mut s = shout("s1", 10.0);
        let err = s.attach_child(shout("s1", 11.0)).unwrap_err();
        assert!(matches!(err, RegistryError::NotStanding(_)));

        s.state = ShoutState::Placed;
        assert!(s.attach_child(shout("s1", 11.0)).is_ok());
    }

    #[test]
    fn test_second_modification_is_rejected_while_child_pending() {
        let mut s = shout("s1", 10.0);
        s.state = ShoutState::Placed;
        s.attach_child(shout("s1", 11.0)).unwrap();

        let err = s.attach_child(shout("s1", 12.0)).unwrap_err();
        assert!(matches!(err, RegistryError::ModificationPending(_)));
    }

    #[test]
    fn test_confirm_child_absorbs_price_and_clears_chain() {
        let mut s = shout("s1", 10.0);
        s.state = ShoutState::Placed;
        s.attach_child(shout("s1", 11.5)).unwrap();

        s.confirm_child().unwrap();
        assert_eq!(s.price, 11.5);
        assert_eq!(s.state, ShoutState::Placed);
        assert!(s.child.is_none());
    }

    #[test]
    fn test_reject_child_keeps_parent_standing() {
        let mut s = shout("s1", 10.0);
        s.state = ShoutState::Placed;
        s.attach_child(shout("s1", 11.5)).unwrap();

        s.reject_child().unwrap();
        assert_eq!(s.price, 10.0);
        assert_eq!(s.state, ShoutState::Placed);
        assert!(s.child.is_none());
    }

    #[test]
    fn test_confirm_without_child_is_error() {
        let mut s = shout("s1", 10.0);
        assert!(s.confirm_child().is_err());
        assert!(s.reject_child().is_err());
    }

    #[test]
    fn test_fee_schedule_parses_five_fields() {
        let fees = FeeSchedule::from_wire("1 0.5 0.1 0.1 0.05").unwrap();
        assert_eq!(fees.registration, 1.0);
        assert_eq!(fees.information, 0.5);
        assert_eq!(fees.shout, 0.1);
        assert_eq!(fees.transaction, 0.1);
        assert_eq!(fees.profit, 0.05);
    }

    #[test]
    fn test_fee_schedule_rejects_wrong_arity_and_garbage() {
        assert!(FeeSchedule::from_wire("1 2 3").is_err());
        assert!(FeeSchedule::from_wire("1 2 3 4 5 6").is_err());
        assert!(FeeSchedule::from_wire("a b c d e").is_err());
    }
}
