//! Pluggable pricing of manipulations.
//!
//! A [`CostPolicy`] quotes the *additional* energy a manipulation costs on top
//! of its face-value transfer. Manifesting 100 energy always moves 100 energy
//! out of the caster; the policy only decides what the act of manifesting
//! costs beyond that. Every method defaults to free, so a policy overrides
//! only what it wants to price.
//!
//! [`AuraCost`] prices each activation of a running aura.

use serde::{Deserialize, Serialize};

use crate::element::{Element, Shape};
use crate::status::AuraKind;

/// How a force or torque vector is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForceMode {
    /// Continuous force, integrated over the next step.
    Force,
    /// Instant change in momentum.
    Impulse,
    /// Continuous acceleration, independent of mass.
    Acceleration,
    /// Instant change in velocity, independent of mass.
    VelocityChange,
}

// ---------------------------------------------------------------------------
// CostPolicy
// ---------------------------------------------------------------------------

/// Additional cost quoted for each gateway action.
pub trait CostPolicy {
    fn manifest_energy(&self, _amount: u64, _element: Element, _shape: Shape) -> u64 {
        0
    }
    fn charge(&self, _amount: u64, _element: Element) -> u64 {
        0
    }
    fn discharge(&self, _amount: u64, _element: Element) -> u64 {
        0
    }
    fn merge(&self, _charge: u64, _other_charge: u64) -> u64 {
        0
    }
    fn separate(&self, _amount: u64, _force: f32) -> u64 {
        0
    }
    fn change_element(&self, _charge: u64, _from: Element, _to: Element) -> u64 {
        0
    }
    fn change_shape(&self, _charge: u64, _from: Shape, _to: Shape) -> u64 {
        0
    }
    /// `stress` is the magnitude of the applied stress vector.
    fn deform(&self, _charge: u64, _stress: f32) -> u64 {
        0
    }
    fn create_elastic_connection(&self, _stiffness: f32, _distance: f32) -> u64 {
        0
    }
    /// `force` is the magnitude of the applied vector.
    fn apply_force(&self, _mass: f32, _force: f32, _mode: ForceMode) -> u64 {
        0
    }
    fn apply_torque(&self, _mass: f32, _torque: f32, _mode: ForceMode) -> u64 {
        0
    }
    fn orient_towards(&self, _mass: f32) -> u64 {
        0
    }
    fn apply_aura(&self, _kind: AuraKind, _energy: u64) -> u64 {
        0
    }
    /// `distance` is how far the two objects are apart.
    fn substitute(&self, _distance: f32) -> u64 {
        0
    }
    fn probe_point(&self, _distance: f32) -> u64 {
        0
    }
    fn summon(&self, _charge: u64) -> u64 {
        0
    }
}

/// A policy under which every action is free beyond its face value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeEnergyCost;

impl CostPolicy for FreeEnergyCost {}

/// The stock pricing.
///
/// Moving energy in or out is free; reshaping, pushing and teleporting cost a
/// rate proportional to how much is being affected. Fractional quotes round
/// up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultEnergyCost {
    /// Fraction of the charge paid to change element.
    pub element_change_fraction: f32,
    /// Fraction of the charge paid to change shape.
    pub shape_change_fraction: f32,
    /// Cost per unit of stress per scaled unit of charge.
    pub deform_rate: f32,
    pub connection_flat: u64,
    /// Cost per unit of stiffness per meter of connection.
    pub connection_rate: f32,
    /// Cost per unit of force (or impulse).
    pub force_rate: f32,
    pub torque_rate: f32,
    pub orient_flat: u64,
    /// Fraction of the aura's seed energy paid to attach it.
    pub aura_fraction: f32,
    /// Cost per meter of substitution distance.
    pub substitute_rate: f32,
    pub probe_flat: u64,
    /// Fraction of the ritual charge paid to summon.
    pub summon_fraction: f32,
    /// Raw units per scaled unit, for rates quoted per scaled unit.
    pub energy_scale: u64,
}

impl Default for DefaultEnergyCost {
    fn default() -> Self {
        Self {
            element_change_fraction: 0.1,
            shape_change_fraction: 0.05,
            deform_rate: 0.5,
            connection_flat: 10,
            connection_rate: 0.1,
            force_rate: 0.5,
            torque_rate: 0.5,
            orient_flat: 1,
            aura_fraction: 0.1,
            substitute_rate: 2.0,
            probe_flat: 1,
            summon_fraction: 0.0,
            energy_scale: crate::ENERGY_SCALE,
        }
    }
}

/// Round a price up to whole units. A price that is not a number cannot be
/// paid by anyone.
fn quote(value: f32) -> u64 {
    if !value.is_finite() {
        u64::MAX
    } else if value > 0.0 {
        value.ceil() as u64
    } else {
        0
    }
}

impl CostPolicy for DefaultEnergyCost {
    fn change_element(&self, charge: u64, from: Element, to: Element) -> u64 {
        if from == to {
            return 0;
        }
        quote(charge as f32 * self.element_change_fraction)
    }

    fn change_shape(&self, charge: u64, from: Shape, to: Shape) -> u64 {
        if from == to {
            return 0;
        }
        quote(charge as f32 * self.shape_change_fraction)
    }

    fn deform(&self, charge: u64, stress: f32) -> u64 {
        let scaled = charge as f32 / self.energy_scale.max(1) as f32;
        quote(stress.abs() * scaled * self.deform_rate)
    }

    fn create_elastic_connection(&self, stiffness: f32, distance: f32) -> u64 {
        self.connection_flat
            .saturating_add(quote(stiffness.abs() * distance.abs() * self.connection_rate))
    }

    fn apply_force(&self, mass: f32, force: f32, mode: ForceMode) -> u64 {
        match mode {
            ForceMode::Force | ForceMode::Impulse => quote(force.abs() * self.force_rate),
            // Mass-independent modes are priced as the equivalent force.
            ForceMode::Acceleration | ForceMode::VelocityChange => {
                quote(force.abs() * mass.abs() * self.force_rate)
            }
        }
    }

    fn apply_torque(&self, mass: f32, torque: f32, mode: ForceMode) -> u64 {
        match mode {
            ForceMode::Force | ForceMode::Impulse => quote(torque.abs() * self.torque_rate),
            ForceMode::Acceleration | ForceMode::VelocityChange => {
                quote(torque.abs() * mass.abs() * self.torque_rate)
            }
        }
    }

    fn orient_towards(&self, _mass: f32) -> u64 {
        self.orient_flat
    }

    fn apply_aura(&self, _kind: AuraKind, energy: u64) -> u64 {
        quote(energy as f32 * self.aura_fraction)
    }

    fn substitute(&self, distance: f32) -> u64 {
        quote(distance * self.substitute_rate)
    }

    fn probe_point(&self, _distance: f32) -> u64 {
        self.probe_flat
    }

    fn summon(&self, charge: u64) -> u64 {
        quote(charge as f32 * self.summon_fraction)
    }
}

// ---------------------------------------------------------------------------
// AuraCost
// ---------------------------------------------------------------------------

/// Price of one aura activation, paid from the aura's own ledger.
pub trait AuraCost {
    fn activation(&self, kind: AuraKind, stored: u64) -> u64;
}

/// Pays `max(minimum, stored * fraction)` per activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultAuraCost {
    pub minimum: u64,
    pub fraction: f32,
}

impl Default for DefaultAuraCost {
    fn default() -> Self {
        Self {
            minimum: 5,
            fraction: 0.1,
        }
    }
}

impl AuraCost for DefaultAuraCost {
    fn activation(&self, _kind: AuraKind, stored: u64) -> u64 {
        quote(stored as f32 * self.fraction).max(self.minimum)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_does_not_price_transfers() {
        let policy = DefaultEnergyCost::default();
        assert_eq!(policy.manifest_energy(100, Element::Fire, Shape::Sphere), 0);
        assert_eq!(policy.charge(100, Element::Fire), 0);
        assert_eq!(policy.discharge(100, Element::Fire), 0);
        assert_eq!(policy.merge(30, 20), 0);
    }

    #[test]
    fn element_change_scales_with_charge() {
        let policy = DefaultEnergyCost::default();
        assert_eq!(policy.change_element(100, Element::Fire, Element::Ice), 10);
        assert_eq!(policy.change_element(101, Element::Fire, Element::Ice), 11);
        assert_eq!(policy.change_element(100, Element::Fire, Element::Fire), 0);
    }

    #[test]
    fn mass_independent_force_modes_cost_more_for_heavy_bodies() {
        let policy = DefaultEnergyCost::default();
        let light = policy.apply_force(1.0, 10.0, ForceMode::VelocityChange);
        let heavy = policy.apply_force(4.0, 10.0, ForceMode::VelocityChange);
        assert_eq!(light, 5);
        assert_eq!(heavy, 20);
        assert_eq!(policy.apply_force(4.0, 10.0, ForceMode::Impulse), 5);
    }

    #[test]
    fn free_policy_is_free() {
        let policy = FreeEnergyCost;
        assert_eq!(policy.substitute(1000.0), 0);
        assert_eq!(policy.apply_aura(AuraKind::Barrier, 500), 0);
        assert_eq!(policy.create_elastic_connection(100.0, 5.0), 0);
    }

    #[test]
    fn non_finite_quotes_are_unaffordable() {
        let policy = DefaultEnergyCost::default();
        assert_eq!(policy.apply_force(1.0, f32::NAN, ForceMode::Force), u64::MAX);
        assert_eq!(policy.apply_torque(1.0, f32::INFINITY, ForceMode::Impulse), u64::MAX);
        assert_eq!(policy.create_elastic_connection(f32::INFINITY, 1.0), u64::MAX);
        assert_eq!(policy.apply_force(1.0, 0.0, ForceMode::Force), 0);
    }

    #[test]
    fn aura_activation_has_a_floor() {
        let cost = DefaultAuraCost::default();
        assert_eq!(cost.activation(AuraKind::Regeneration, 10), 5);
        assert_eq!(cost.activation(AuraKind::Regeneration, 200), 20);
    }
}
