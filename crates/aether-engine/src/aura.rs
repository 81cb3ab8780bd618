//! Ledger-backed effects attached to units.
//!
//! An aura is an object of its own: it has a ledger seeded with the energy
//! withdrawn when it was applied, and it pays for each activation out of that
//! ledger. An activation that cannot pay expires the aura.

use aether_core::cost::AuraCost;
use aether_core::entity::EntityId;
use aether_core::events::EventBus;
use aether_core::ledger::LedgerTree;
use aether_core::status::AuraKind;

use crate::tick::IntervalTimer;

#[derive(Debug, Clone)]
pub struct Aura {
    kind: AuraKind,
    target: EntityId,
    timer: IntervalTimer,
}

/// Outcome of advancing an aura.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuraTick {
    /// No full interval elapsed.
    Idle,
    /// Activations happened; the total paid is the effect strength.
    Paid(u64),
    /// An activation could not pay. Anything paid before it is included.
    Expired(u64),
}

impl Aura {
    pub fn new(kind: AuraKind, target: EntityId) -> Self {
        Self {
            kind,
            target,
            timer: IntervalTimer::default(),
        }
    }

    pub fn kind(&self) -> AuraKind {
        self.kind
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    /// Advance by `dt`. Each full `interval` pays one activation from the
    /// aura's own ledger (`ledger_id`).
    pub fn advance(
        &mut self,
        ledger_id: EntityId,
        dt: f32,
        interval: f32,
        cost: &dyn AuraCost,
        ledgers: &mut LedgerTree,
        events: &mut EventBus,
    ) -> AuraTick {
        let activations = self.timer.advance(dt, interval);
        if activations == 0 {
            return AuraTick::Idle;
        }
        let mut paid = 0;
        for _ in 0..activations {
            let price = cost.activation(self.kind, ledgers.energy(ledger_id));
            let taken = ledgers.decrease(ledger_id, price, events);
            if taken == 0 {
                return AuraTick::Expired(paid);
            }
            paid += taken;
        }
        AuraTick::Paid(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::cost::DefaultAuraCost;

    fn setup(energy: u64) -> (Aura, EntityId, LedgerTree, EventBus) {
        let id = EntityId::new(5, 0);
        let mut ledgers = LedgerTree::new();
        ledgers.insert(id, energy);
        (Aura::new(AuraKind::Regeneration, EntityId::new(1, 0)), id, ledgers, EventBus::new())
    }

    #[test]
    fn partial_interval_is_idle() {
        let (mut aura, id, mut ledgers, mut bus) = setup(100);
        let tick = aura.advance(id, 0.5, 1.0, &DefaultAuraCost::default(), &mut ledgers, &mut bus);
        assert_eq!(tick, AuraTick::Idle);
        assert_eq!(ledgers.energy(id), 100);
    }

    #[test]
    fn full_interval_pays_activation() {
        let (mut aura, id, mut ledgers, mut bus) = setup(100);
        let cost = DefaultAuraCost::default();
        aura.advance(id, 0.5, 1.0, &cost, &mut ledgers, &mut bus);
        let tick = aura.advance(id, 0.5, 1.0, &cost, &mut ledgers, &mut bus);
        assert_eq!(tick, AuraTick::Paid(10));
        assert_eq!(ledgers.energy(id), 90);
    }

    #[test]
    fn long_step_consumes_whole_intervals_only() {
        let (mut aura, id, mut ledgers, mut bus) = setup(1000);
        let cost = DefaultAuraCost { minimum: 5, fraction: 0.0 };
        let tick = aura.advance(id, 2.5, 1.0, &cost, &mut ledgers, &mut bus);
        assert_eq!(tick, AuraTick::Paid(10));
        let tick = aura.advance(id, 0.5, 1.0, &cost, &mut ledgers, &mut bus);
        assert_eq!(tick, AuraTick::Paid(5));
    }

    #[test]
    fn empty_ledger_expires() {
        let (mut aura, id, mut ledgers, mut bus) = setup(7);
        let cost = DefaultAuraCost::default();
        assert_eq!(aura.advance(id, 1.0, 1.0, &cost, &mut ledgers, &mut bus), AuraTick::Paid(5));
        assert_eq!(aura.advance(id, 1.0, 1.0, &cost, &mut ledgers, &mut bus), AuraTick::Paid(2));
        assert_eq!(aura.advance(id, 1.0, 1.0, &cost, &mut ledgers, &mut bus), AuraTick::Expired(0));
    }
}
