//! Units: casters, summons and anything else with health.

use std::collections::BTreeMap;

use aether_core::entity::EntityId;
use aether_core::status::{AuraKind, StatusEffectKind};

/// An active status effect on a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusEffect {
    /// Charge drained per second.
    pub intensity: f32,
    /// Remaining charge.
    pub charge: f32,
    /// Fractional damage carried between steps.
    carry: f32,
}

impl StatusEffect {
    /// Overwrite the intensity and add `charge`. Repeated applications do not
    /// blend intensities.
    pub fn recharge(&mut self, intensity: f32, charge: f32) {
        self.intensity = intensity.max(0.0);
        self.charge += charge.max(0.0);
    }

    /// Drain for `dt` seconds. Returns the whole units of drained charge
    /// (fractions carry over to later steps).
    fn drain(&mut self, dt: f32) -> u64 {
        let drained = (self.intensity * dt).min(self.charge);
        self.charge -= drained;
        self.carry += drained;
        let whole = self.carry.floor();
        self.carry -= whole;
        whole as u64
    }

    pub fn is_spent(&self) -> bool {
        self.charge <= 0.0
    }
}

/// Result of dealing damage to a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageOutcome {
    pub absorbed: u64,
    pub dealt: u64,
    pub defeated: bool,
}

#[derive(Debug, Clone)]
pub struct Unit {
    team: u32,
    health: u64,
    max_health: u64,
    barrier: u64,
    status: BTreeMap<StatusEffectKind, StatusEffect>,
    auras: BTreeMap<AuraKind, EntityId>,
}

impl Unit {
    pub fn new(team: u32, health: u64) -> Self {
        Self {
            team,
            health,
            max_health: health,
            barrier: 0,
            status: BTreeMap::new(),
            auras: BTreeMap::new(),
        }
    }

    pub fn team(&self) -> u32 {
        self.team
    }

    pub fn health(&self) -> u64 {
        self.health
    }

    pub fn max_health(&self) -> u64 {
        self.max_health
    }

    pub fn barrier(&self) -> u64 {
        self.barrier
    }

    pub fn is_defeated(&self) -> bool {
        self.health == 0
    }

    /// Units on different teams may attack each other.
    pub fn can_attack(&self, other: &Unit) -> bool {
        self.team != other.team
    }

    /// Barrier absorbs first, the rest comes off health.
    pub fn take_damage(&mut self, amount: u64) -> DamageOutcome {
        let absorbed = amount.min(self.barrier);
        self.barrier -= absorbed;
        let dealt = (amount - absorbed).min(self.health);
        self.health -= dealt;
        DamageOutcome {
            absorbed,
            dealt,
            defeated: self.health == 0 && amount > 0,
        }
    }

    /// Returns the amount actually healed.
    pub fn heal(&mut self, amount: u64) -> u64 {
        let healed = amount.min(self.max_health - self.health);
        self.health += healed;
        healed
    }

    pub fn add_barrier(&mut self, amount: u64) {
        self.barrier = self.barrier.saturating_add(amount);
    }

    pub fn status(&self, kind: StatusEffectKind) -> Option<&StatusEffect> {
        self.status.get(&kind)
    }

    pub fn has_status(&self, kind: StatusEffectKind) -> bool {
        self.status.contains_key(&kind)
    }

    /// Apply or recharge a status effect. Returns `true` when the effect was
    /// not active before.
    pub fn charge_status(&mut self, kind: StatusEffectKind, intensity: f32, charge: f32) -> bool {
        let fresh = !self.status.contains_key(&kind);
        self.status.entry(kind).or_default().recharge(intensity, charge);
        fresh
    }

    /// Drain every status effect for `dt` seconds and drop spent ones.
    /// Returns the whole units drained per effect, in effect order.
    pub fn tick_status(&mut self, dt: f32) -> Vec<(StatusEffectKind, u64)> {
        let drained = self
            .status
            .iter_mut()
            .map(|(kind, effect)| (*kind, effect.drain(dt)))
            .collect();
        self.status.retain(|_, effect| !effect.is_spent());
        drained
    }

    pub fn aura(&self, kind: AuraKind) -> Option<EntityId> {
        self.auras.get(&kind).copied()
    }

    pub fn auras(&self) -> impl Iterator<Item = (AuraKind, EntityId)> + '_ {
        self.auras.iter().map(|(k, v)| (*k, *v))
    }

    pub(crate) fn attach_aura(&mut self, kind: AuraKind, aura: EntityId) -> bool {
        if self.auras.contains_key(&kind) {
            return false;
        }
        self.auras.insert(kind, aura);
        true
    }

    pub(crate) fn detach_aura(&mut self, kind: AuraKind, aura: EntityId) {
        if self.auras.get(&kind) == Some(&aura) {
            self.auras.remove(&kind);
        }
    }
}
