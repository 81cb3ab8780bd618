//! The action gateway.
//!
//! An [`EnergyController`] belongs to one caster and is the only way casters
//! manipulate energy. Every call runs the same transaction:
//!
//! 1. validate the handles,
//! 2. reject requests that would change nothing,
//! 3. check legality: control and sealing, finite vectors, then the
//!    action-specific gates (contact, withdrawable energy, element),
//! 4. check the control range,
//! 5. quote the total cost (face value plus the [`CostPolicy`] surcharge),
//! 6. check the caster can pay,
//! 7. execute, then debit the caster.
//!
//! Any rejection before step 7 leaves every ledger untouched.

use aether_core::cost::{CostPolicy, DefaultEnergyCost, ForceMode};
use aether_core::element::{Element, Shape};
use aether_core::entity::{EntityId, ObjectKind};
use aether_core::result::ActionResult;
use aether_core::status::AuraKind;

use crate::physics::{ConnectionId, Vec3};
use crate::world::EnergyWorld;
use crate::EngineError;

type Outcome<T> = Result<T, ActionResult>;

/// One object found by [`EnergyController::probe_point`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeHit {
    pub entity: EntityId,
    pub kind: ObjectKind,
    pub energy: u64,
    /// Committed element, for manifestations.
    pub element: Option<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub point: Vec3,
    /// Sorted by entity.
    pub hits: Vec<ProbeHit>,
}

/// Gateway through which one caster manipulates energy.
pub struct EnergyController {
    caster: EntityId,
    control_range: f32,
    cost: Box<dyn CostPolicy>,
}

impl EnergyController {
    pub fn new(caster: EntityId, control_range: f32, cost: impl CostPolicy + 'static) -> Self {
        Self {
            caster,
            control_range,
            cost: Box::new(cost),
        }
    }

    /// Like [`new`](Self::new), but checks that `caster` can cast in `world`.
    pub fn try_new(
        world: &EnergyWorld,
        caster: EntityId,
        control_range: f32,
        cost: impl CostPolicy + 'static,
    ) -> Result<Self, EngineError> {
        if !world.is_alive(caster) || !world.ledgers().contains(caster) {
            return Err(EngineError::UnknownCaster { entity: caster });
        }
        Ok(Self::new(caster, control_range, cost))
    }

    /// A controller using the world's default range and [`DefaultEnergyCost`].
    pub fn with_defaults(world: &EnergyWorld, caster: EntityId) -> Self {
        Self::new(caster, world.config().default_control_range, DefaultEnergyCost::default())
    }

    pub fn caster(&self) -> EntityId {
        self.caster
    }

    pub fn control_range(&self) -> f32 {
        self.control_range
    }

    pub fn set_control_range(&mut self, range: f32) {
        self.control_range = range;
    }

    /// The caster's own energy.
    pub fn energy(&self, world: &EnergyWorld) -> u64 {
        world.energy(self.caster)
    }

    /// Whether `point` lies within the control range of the caster.
    pub fn is_within_range(&self, world: &EnergyWorld, point: Vec3) -> bool {
        world
            .position(self.caster)
            .is_some_and(|origin| (point - origin).norm_squared() <= self.control_range * self.control_range)
    }

    // -- shared steps ---------------------------------------------------------

    fn caster_position(&self, world: &EnergyWorld) -> Outcome<Vec3> {
        if !world.is_alive(self.caster) || !world.ledgers().contains(self.caster) {
            tracing::warn!(caster = %self.caster, "gateway used by a dead caster");
            return Err(ActionResult::InvalidObject);
        }
        world.position(self.caster).ok_or(ActionResult::InvalidObject)
    }

    fn manifestation(&self, world: &EnergyWorld, id: EntityId) -> Outcome<()> {
        if world.manifestation(id).is_some() && world.physics().has_entity(id) {
            Ok(())
        } else {
            Err(ActionResult::InvalidManifestation)
        }
    }

    /// Caster controls `id` and `id` is not sealed.
    fn controlled(&self, world: &EnergyWorld, id: EntityId) -> Outcome<()> {
        if world.resolve_owner(id) != world.resolve_owner(self.caster) {
            return Err(ActionResult::ForbiddenAction);
        }
        if world.is_sealed(id) {
            return Err(ActionResult::ForbiddenAction);
        }
        Ok(())
    }

    /// Non-finite vectors cannot be priced and would poison the physics state.
    fn finite(&self, vectors: &[Vec3]) -> Outcome<()> {
        if vectors.iter().all(|v| v.iter().all(|c| c.is_finite())) {
            Ok(())
        } else {
            Err(ActionResult::ForbiddenAction)
        }
    }

    fn in_range(&self, world: &EnergyWorld, origin: Vec3, target: EntityId) -> Outcome<Vec3> {
        let position = world.position(target).ok_or(ActionResult::InvalidObject)?;
        self.point_in_range(origin, position)?;
        Ok(position)
    }

    fn point_in_range(&self, origin: Vec3, point: Vec3) -> Outcome<()> {
        if (point - origin).norm_squared() <= self.control_range * self.control_range {
            Ok(())
        } else {
            Err(ActionResult::OutsideRange)
        }
    }

    fn afford(&self, world: &EnergyWorld, total: u64) -> Outcome<u64> {
        if total > world.energy(self.caster) {
            Err(ActionResult::NotEnoughEnergy)
        } else {
            Ok(total)
        }
    }

    fn pay(&self, world: &mut EnergyWorld, total: u64) {
        let paid = world.debit(self.caster, total);
        debug_assert_eq!(paid, total, "affordability was checked before executing");
    }

    fn report<T>(&self, action: &'static str, outcome: Outcome<T>) -> (ActionResult, Option<T>) {
        match outcome {
            Ok(value) => {
                tracing::debug!(caster = %self.caster, action, "action succeeded");
                (ActionResult::Success, Some(value))
            }
            Err(result) => {
                tracing::debug!(caster = %self.caster, action, result = %result, "action rejected");
                (result, None)
            }
        }
    }

    // -- operations -----------------------------------------------------------

    /// Manifest `amount` of the caster's energy as a new body at `position`.
    pub fn manifest_energy(
        &self,
        world: &mut EnergyWorld,
        amount: u64,
        element: Element,
        shape: Shape,
        position: Vec3,
        velocity: Vec3,
    ) -> (ActionResult, Option<EntityId>) {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            if amount == 0 {
                return Err(ActionResult::ForbiddenAction);
            }
            self.finite(&[position, velocity])?;
            self.point_in_range(origin, position)?;
            let extra = self.cost.manifest_energy(amount, element, shape);
            let total = self.afford(world, amount.saturating_add(extra))?;
            let id = world.spawn_manifestation(element, shape, amount, position, velocity, Some(self.caster));
            self.pay(world, total);
            Ok(id)
        })();
        self.report("manifest_energy", outcome)
    }

    /// Feed `amount` of the caster's energy into `id`. Sealed and foreign
    /// manifestations accept energy too.
    pub fn charge(&self, world: &mut EnergyWorld, id: EntityId, amount: u64) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if amount == 0 {
                return Err(ActionResult::RedundantAction);
            }
            self.in_range(world, origin, id)?;
            let element = world.element(id).ok_or(ActionResult::InvalidManifestation)?;
            let extra = self.cost.charge(amount, element);
            let total = self.afford(world, amount.saturating_add(extra))?;
            world.credit(id, amount);
            self.pay(world, total);
            Ok(())
        })();
        self.report("charge", outcome).0
    }

    /// Draw `amount` out of `id` back into the caster.
    pub fn discharge(&self, world: &mut EnergyWorld, id: EntityId, amount: u64) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if amount == 0 {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            if amount > world.energy(id) {
                return Err(ActionResult::ExtractingTooMuch);
            }
            self.in_range(world, origin, id)?;
            let element = world.element(id).ok_or(ActionResult::InvalidManifestation)?;
            let extra = self.afford(world, self.cost.discharge(amount, element))?;
            let withdrawn = world.debit(id, amount);
            world.credit(self.caster, withdrawn);
            self.pay(world, extra);
            world.settle(id);
            Ok(())
        })();
        self.report("discharge", outcome).0
    }

    /// Absorb `other` into `id`.
    pub fn merge(&self, world: &mut EnergyWorld, id: EntityId, other: EntityId) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            self.manifestation(world, other)?;
            if id == other {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.controlled(world, other)?;
            if world.element(id) != world.element(other) {
                return Err(ActionResult::ForbiddenAction);
            }
            if !world.in_contact(id, other) {
                return Err(ActionResult::NoContact);
            }
            self.in_range(world, origin, id)?;
            self.in_range(world, origin, other)?;
            let total = self.afford(world, self.cost.merge(world.energy(id), world.energy(other)))?;
            if !world.merge(id, other) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("merge", outcome).0
    }

    /// Split `amount` off `id` into a new sibling, pushed apart by `force`.
    pub fn separate(
        &self,
        world: &mut EnergyWorld,
        id: EntityId,
        amount: u64,
        force: Vec3,
        mode: ForceMode,
    ) -> (ActionResult, Option<EntityId>) {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if amount == 0 {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.finite(&[force])?;
            // Both halves must keep at least one unit.
            if world.energy(id) <= amount.saturating_add(1) {
                return Err(ActionResult::ExtractingTooMuch);
            }
            self.in_range(world, origin, id)?;
            let total = self.afford(world, self.cost.separate(amount, force.norm()))?;
            let sibling = world
                .separate(id, amount, force, mode)
                .ok_or(ActionResult::SubactionFailed)?;
            self.pay(world, total);
            Ok(sibling)
        })();
        self.report("separate", outcome)
    }

    pub fn change_element(&self, world: &mut EnergyWorld, id: EntityId, element: Element) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            let current = world
                .manifestation(id)
                .map(|m| m.future_element())
                .ok_or(ActionResult::InvalidManifestation)?;
            if current == element {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.in_range(world, origin, id)?;
            let total = self.afford(world, self.cost.change_element(world.energy(id), current, element))?;
            if !world.change_element_later(id, element) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("change_element", outcome).0
    }

    pub fn change_shape(&self, world: &mut EnergyWorld, id: EntityId, shape: Shape) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            let current = world
                .manifestation(id)
                .map(|m| m.future_shape())
                .ok_or(ActionResult::InvalidManifestation)?;
            if current == shape {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.in_range(world, origin, id)?;
            let total = self.afford(world, self.cost.change_shape(world.energy(id), current, shape))?;
            if !world.change_shape_later(id, shape) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("change_shape", outcome).0
    }

    /// Add `stress` to `id`'s accumulated stress.
    pub fn deform(&self, world: &mut EnergyWorld, id: EntityId, stress: Vec3) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if stress == Vec3::zeros() {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.finite(&[stress])?;
            self.in_range(world, origin, id)?;
            let total = self.afford(world, self.cost.deform(world.energy(id), stress.norm()))?;
            if !world.deform(id, stress) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("deform", outcome).0
    }

    /// Tie `id` to `other` with a spring resting at their current distance.
    pub fn create_elastic_connection(
        &self,
        world: &mut EnergyWorld,
        id: EntityId,
        other: EntityId,
        stiffness: f32,
        damping: f32,
    ) -> (ActionResult, Option<ConnectionId>) {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if !world.is_alive(other) || !world.physics().has_entity(other) {
                return Err(ActionResult::InvalidObject);
            }
            if id == other {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            if !(stiffness.is_finite() && stiffness > 0.0 && damping.is_finite() && damping >= 0.0) {
                return Err(ActionResult::ForbiddenAction);
            }
            let a = self.in_range(world, origin, id)?;
            let b = self.in_range(world, origin, other)?;
            let total = self.afford(world, self.cost.create_elastic_connection(stiffness, (b - a).norm()))?;
            let connection = world
                .create_elastic_connection(id, other, stiffness, damping)
                .ok_or(ActionResult::SubactionFailed)?;
            self.pay(world, total);
            Ok(connection)
        })();
        self.report("create_elastic_connection", outcome)
    }

    pub fn apply_force(&self, world: &mut EnergyWorld, id: EntityId, force: Vec3, mode: ForceMode) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if force == Vec3::zeros() {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.finite(&[force])?;
            self.in_range(world, origin, id)?;
            let mass = world.manifestation(id).map_or(0.0, |m| m.mass());
            let total = self.afford(world, self.cost.apply_force(mass, force.norm(), mode))?;
            if !world.apply_force(id, force, mode) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("apply_force", outcome).0
    }

    /// Spin `id`. Its orientation stops following its velocity.
    pub fn apply_torque(&self, world: &mut EnergyWorld, id: EntityId, torque: Vec3, mode: ForceMode) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if torque == Vec3::zeros() {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.finite(&[torque])?;
            self.in_range(world, origin, id)?;
            let mass = world.manifestation(id).map_or(0.0, |m| m.mass());
            let total = self.afford(world, self.cost.apply_torque(mass, torque.norm(), mode))?;
            if !world.apply_torque(id, torque, mode) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("apply_torque", outcome).0
    }

    /// Face `point` and lock orientation again.
    pub fn orient_towards(&self, world: &mut EnergyWorld, id: EntityId, point: Vec3) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            let position = world.position(id).ok_or(ActionResult::InvalidObject)?;
            if (point - position).norm_squared() <= f32::EPSILON {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            self.finite(&[point])?;
            self.in_range(world, origin, id)?;
            let mass = world.manifestation(id).map_or(0.0, |m| m.mass());
            let total = self.afford(world, self.cost.orient_towards(mass))?;
            if !world.orient_towards(id, point) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("orient_towards", outcome).0
    }

    /// Withdraw `energy` from `id` into an aura of `kind` on the touched unit
    /// `target`.
    pub fn apply_aura(
        &self,
        world: &mut EnergyWorld,
        id: EntityId,
        target: EntityId,
        kind: AuraKind,
        energy: u64,
    ) -> (ActionResult, Option<EntityId>) {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            let unit = world.unit(target).ok_or(ActionResult::InvalidObject)?;
            if unit.aura(kind).is_some() {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            if energy == 0 {
                return Err(ActionResult::ForbiddenAction);
            }
            if energy > world.energy(id) {
                return Err(ActionResult::ExtractingTooMuch);
            }
            if !world.in_contact(id, target) {
                return Err(ActionResult::NoContact);
            }
            self.in_range(world, origin, id)?;
            let total = self.afford(world, self.cost.apply_aura(kind, energy))?;
            let aura = world
                .apply_aura(id, target, kind, energy)
                .ok_or(ActionResult::SubactionFailed)?;
            self.pay(world, total);
            Ok(aura)
        })();
        self.report("apply_aura", outcome)
    }

    /// Swap the positions of `a` and `b`, consuming `id`.
    pub fn substitute(&self, world: &mut EnergyWorld, id: EntityId, a: EntityId, b: EntityId) -> ActionResult {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            for object in [a, b] {
                if !world.is_alive(object) || !world.physics().has_entity(object) {
                    return Err(ActionResult::InvalidObject);
                }
            }
            if a == b {
                return Err(ActionResult::RedundantAction);
            }
            self.controlled(world, id)?;
            if !world.is_substitutable(id, a) || !world.is_substitutable(id, b) {
                return Err(ActionResult::ForbiddenAction);
            }
            self.in_range(world, origin, id)?;
            let pa = self.in_range(world, origin, a)?;
            let pb = self.in_range(world, origin, b)?;
            let total = self.afford(world, self.cost.substitute((pb - pa).norm()))?;
            if !world.substitute(id, a, b) {
                return Err(ActionResult::SubactionFailed);
            }
            self.pay(world, total);
            Ok(())
        })();
        self.report("substitute", outcome).0
    }

    /// List everything whose collider contains `point`.
    pub fn probe_point(&self, world: &mut EnergyWorld, point: Vec3) -> (ActionResult, Option<ProbeResult>) {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.finite(&[point])?;
            self.point_in_range(origin, point)?;
            let total = self.afford(world, self.cost.probe_point((point - origin).norm()))?;
            let hits = world
                .physics()
                .entities_at(point)
                .into_iter()
                .filter_map(|entity| {
                    Some(ProbeHit {
                        entity,
                        kind: world.kind(entity)?,
                        energy: world.energy(entity),
                        element: world.element(entity),
                    })
                })
                .collect();
            self.pay(world, total);
            Ok(ProbeResult { point, hits })
        })();
        self.report("probe_point", outcome)
    }

    /// Turn a Ritual manifestation into a unit on the caster's team.
    pub fn summon(&self, world: &mut EnergyWorld, id: EntityId) -> (ActionResult, Option<EntityId>) {
        let outcome = (|| -> Outcome<_> {
            let origin = self.caster_position(world)?;
            self.manifestation(world, id)?;
            if world.resolve_owner(id) != world.resolve_owner(self.caster) {
                return Err(ActionResult::ForbiddenAction);
            }
            if world.element(id) != Some(Element::Ritual) {
                return Err(ActionResult::ForbiddenAction);
            }
            let team = world
                .unit(self.caster)
                .map(|u| u.team())
                .ok_or(ActionResult::ForbiddenAction)?;
            self.in_range(world, origin, id)?;
            let total = self.afford(world, self.cost.summon(world.energy(id)))?;
            let unit = world
                .summon(id, team, self.caster)
                .ok_or(ActionResult::SubactionFailed)?;
            self.pay(world, total);
            Ok(unit)
        })();
        self.report("summon", outcome)
    }
}

impl std::fmt::Debug for EnergyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyController")
            .field("caster", &self.caster)
            .field("control_range", &self.control_range)
            .finish_non_exhaustive()
    }
}
