//! Trader-side registry specialization.

use catwire_protocol::{ShoutId, SpecialistId};

use crate::{ClientRegistry, RegistryError, Shout, ShoutState};

/// The registry a trader client keeps: the shared core plus its own daily
/// state: the private value, the specialist it registered with, and its
/// one standing shout.
///
/// The trader-side invariants live here: a trader has at most one
/// outstanding (non-terminal) shout at a time, and a price modification is
/// attached as a child to the standing shout rather than replacing it. A
/// second modification while the child is pending is rejected locally,
/// without contacting the server.
pub struct TraderRegistry {
    /// The shared registry core.
    pub core: ClientRegistry,
    private_value: Option<f64>,
    registered_with: Option<SpecialistId>,
    standing: Option<ShoutId>,
}

impl TraderRegistry {
    /// Creates an empty trader registry.
    pub fn new() -> Self {
        Self {
            core: ClientRegistry::new(),
            private_value: None,
            registered_with: None,
            standing: None,
        }
    }

    /// Resets everything for a new game.
    pub fn game_starting(&mut self) {
        self.core.game_starting();
        self.private_value = None;
        self.registered_with = None;
        self.standing = None;
    }

    /// Clears the per-day state.
    pub fn day_opening(&mut self) {
        self.core.day_opening();
        self.private_value = None;
        self.registered_with = None;
        self.standing = None;
    }

    // -- Daily assignments ------------------------------------------------

    /// Records the private value delivered when the day opened.
    pub fn set_private_value(&mut self, value: f64) {
        self.private_value = Some(value);
    }

    /// Today's private value, if one was delivered.
    pub fn private_value(&self) -> Option<f64> {
        self.private_value
    }

    /// Records the specialist this trader registered with today.
    pub fn set_registered(&mut self, specialist: SpecialistId) {
        self.registered_with = Some(specialist);
    }

    /// The specialist this trader is registered with today.
    pub fn registered_with(&self) -> Option<&SpecialistId> {
        self.registered_with.as_ref()
    }

    // -- Own shout --------------------------------------------------------

    /// Checks the one-outstanding-shout rule before a new shout is sent.
    ///
    /// # Errors
    /// [`RegistryError::ShoutOutstanding`] if the standing shout is still
    /// non-terminal.
    pub fn ensure_can_place(&self) -> Result<(), RegistryError> {
        if let Some(id) = &self.standing {
            if let Some(shout) = self.core.shout(id) {
                if !shout.state.is_terminal() {
                    return Err(RegistryError::ShoutOutstanding(id.clone()));
                }
            }
        }
        Ok(())
    }

    /// Records the trader's own shout once the server accepted it.
    pub fn shout_placed(&mut self, mut shout: Shout) {
        shout.state = ShoutState::Placed;
        self.standing = Some(shout.id.clone());
        self.core.shout_posted(shout);
    }

    /// Attaches a pending modification to the standing shout, enforcing
    /// the single-pending-modification rule.
    ///
    /// # Errors
    /// - [`RegistryError::UnknownShout`] if `id` is not the standing shout
    /// - [`RegistryError::NotStanding`] if the shout is not placed
    /// - [`RegistryError::ModificationPending`] if a modification is
    ///   already awaiting confirmation
    pub fn begin_modification(&mut self, id: &ShoutId, price: f64) -> Result<(), RegistryError> {
        if self.standing.as_ref() != Some(id) {
            return Err(RegistryError::UnknownShout(id.clone()));
        }
        let shout = self
            .core
            .shout_mut(id)
            .ok_or_else(|| RegistryError::UnknownShout(id.clone()))?;
        let mut child = shout.clone();
        child.price = price;
        child.child = None;
        child.state = ShoutState::Pending;
        shout.attach_child(child)
    }

    /// Absorbs a confirmed modification into the standing shout.
    pub fn modification_confirmed(&mut self, id: &ShoutId) -> Result<(), RegistryError> {
        let shout = self
            .core
            .shout_mut(id)
            .ok_or_else(|| RegistryError::UnknownShout(id.clone()))?;
        shout.confirm_child()
    }

    /// Drops a refused modification; the parent keeps standing.
    pub fn modification_rejected(&mut self, id: &ShoutId) -> Result<(), RegistryError> {
        let shout = self
            .core
            .shout_mut(id)
            .ok_or_else(|| RegistryError::UnknownShout(id.clone()))?;
        shout.reject_child()
    }

    /// Marks the trader's own shout rejected, freeing the outstanding slot.
    pub fn shout_rejected(&mut self, id: &ShoutId) {
        if let Some(shout) = self.core.shout_mut(id) {
            shout.state = ShoutState::Rejected;
        }
        if self.standing.as_ref() == Some(id) {
            self.standing = None;
        }
    }

    /// The trader's standing shout, if any.
    pub fn current_shout(&self) -> Option<&Shout> {
        self.standing.as_ref().and_then(|id| self.core.shout(id))
    }
}

impl Default for TraderRegistry {
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
    use catwire_protocol::TraderId;

    fn own_shout(id: &str, price: f64) -> Shout {
        Shout::new(
            ShoutId::from(id),
            price,
            1,
            true,
            TraderId::from("me"),
            SpecialistId::from("m1"),
        )
    }

    fn registry_with_standing(id: &str, price: f64) -> TraderRegistry {
        let mut reg = TraderRegistry::new();
        reg.set_registered(SpecialistId::from("m1"));
        reg.shout_placed(own_shout(id, price));
        reg
    }

    #[test]
    fn test_place_is_allowed_when_nothing_stands() {
        let reg = TraderRegistry::new();
        assert!(reg.ensure_can_place().is_ok());
    }

    #[test]
    fn test_second_shout_is_rejected_while_first_stands() {
        let reg = registry_with_standing("s1", 9.0);
        let err = reg.ensure_can_place().unwrap_err();
        assert!(matches!(err, RegistryError::ShoutOutstanding(id) if id == ShoutId::from("s1")));
    }

    #[test]
    fn test_place_is_allowed_again_after_rejection() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.shout_rejected(&ShoutId::from("s1"));
        assert!(reg.ensure_can_place().is_ok());
        assert!(reg.current_shout().is_none());
    }

    #[test]
    fn test_place_is_allowed_again_after_match() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.core.shout_mut(&ShoutId::from("s1")).unwrap().state = ShoutState::Matched;
        assert!(reg.ensure_can_place().is_ok());
    }

    #[test]
    fn test_modification_attaches_exactly_one_child() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.begin_modification(&ShoutId::from("s1"), 9.5).unwrap();

        let standing = reg.current_shout().unwrap();
        assert_eq!(standing.price, 9.0);
        assert_eq!(standing.child.as_ref().unwrap().price, 9.5);
    }

    #[test]
    fn test_second_modification_is_rejected_locally() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.begin_modification(&ShoutId::from("s1"), 9.5).unwrap();

        let err = reg.begin_modification(&ShoutId::from("s1"), 10.0).unwrap_err();
        assert!(matches!(err, RegistryError::ModificationPending(_)));
    }

    #[test]
    fn test_confirmed_modification_replaces_price() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.begin_modification(&ShoutId::from("s1"), 9.5).unwrap();
        reg.modification_confirmed(&ShoutId::from("s1")).unwrap();

        let standing = reg.current_shout().unwrap();
        assert_eq!(standing.price, 9.5);
        assert!(standing.child.is_none());
    }

    #[test]
    fn test_rejected_modification_keeps_parent() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.begin_modification(&ShoutId::from("s1"), 9.5).unwrap();
        reg.modification_rejected(&ShoutId::from("s1")).unwrap();

        let standing = reg.current_shout().unwrap();
        assert_eq!(standing.price, 9.0);
        assert!(standing.child.is_none());
        // And a fresh modification is allowed again.
        assert!(reg.begin_modification(&ShoutId::from("s1"), 10.0).is_ok());
    }

    #[test]
    fn test_modifying_unknown_shout_fails() {
        let mut reg = TraderRegistry::new();
        let err = reg.begin_modification(&ShoutId::from("nope"), 1.0).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownShout(_)));
    }

    #[test]
    fn test_day_opening_clears_daily_state() {
        let mut reg = registry_with_standing("s1", 9.0);
        reg.set_private_value(42.0);

        reg.day_opening();

        assert!(reg.private_value().is_none());
        assert!(reg.registered_with().is_none());
        assert!(reg.current_shout().is_none());
        assert!(reg.ensure_can_place().is_ok());
    }
}
