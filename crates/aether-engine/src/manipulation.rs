//! Manipulations of manifestations.
//!
//! These are the raw operations behind the gateway. They check only what is
//! needed to keep the world consistent (liveness, contact, withdrawable
//! energy); range, control, sealing and cost are the gateway's business.
//! Physical changes land on the physics body right away, while the canonical
//! element and shape wait for the next frame boundary.

use aether_core::cost::ForceMode;
use aether_core::element::{Element, Shape};
use aether_core::entity::{EntityId, ObjectKind};
use aether_core::events::EnergyEvent;
use aether_core::status::AuraKind;

use crate::aura::Aura;
use crate::config::MergeMomentum;
use crate::physics::{ConnectionId, Vec3};
use crate::world::{gravity_scale, Destruction, EnergyWorld};

impl EnergyWorld {
    /// Record a new element, effective at the next frame boundary. The
    /// collider, sensor flag and gravity follow immediately.
    pub fn change_element_later(&mut self, id: EntityId, element: Element) -> bool {
        let charge = self.ledgers.energy(id);
        let Some(m) = self.manifestations.get_mut(&id) else {
            return false;
        };
        if !m.set_future_element(element) {
            return false;
        }
        let def = self.registry.element(element);
        let (collider, volume) = m.future_collider(&self.registry, charge);
        self.physics.rebuild_collider(id, collider, def.pass_through);
        self.physics.set_gravity_scale(id, gravity_scale(def));
        m.set_collider_volume(volume);
        true
    }

    /// Record a new shape, effective at the next frame boundary. The collider
    /// follows immediately.
    pub fn change_shape_later(&mut self, id: EntityId, shape: Shape) -> bool {
        let charge = self.ledgers.energy(id);
        let Some(m) = self.manifestations.get_mut(&id) else {
            return false;
        };
        if !m.set_future_shape(shape) {
            return false;
        }
        let pass_through = self.registry.element(m.future_element()).pass_through;
        let (collider, volume) = m.future_collider(&self.registry, charge);
        self.physics.rebuild_collider(id, collider, pass_through);
        m.set_collider_volume(volume);
        true
    }

    /// Accumulate stress, resolved into deformation at the next frame boundary.
    pub fn deform(&mut self, id: EntityId, stress: Vec3) -> bool {
        match self.manifestations.get_mut(&id) {
            Some(m) => {
                m.add_stress(stress);
                true
            }
            None => false,
        }
    }

    pub fn apply_force(&mut self, id: EntityId, force: Vec3, mode: ForceMode) -> bool {
        if !self.manifestations.contains_key(&id) {
            return false;
        }
        self.physics.apply_force(id, force, mode);
        true
    }

    /// Apply a torque. The body stops aligning with its velocity until
    /// [`orient_towards`](Self::orient_towards) locks it again.
    pub fn apply_torque(&mut self, id: EntityId, torque: Vec3, mode: ForceMode) -> bool {
        let Some(m) = self.manifestations.get_mut(&id) else {
            return false;
        };
        m.set_free_rotation(true);
        self.physics.lock_rotations(id, false);
        self.physics.apply_torque(id, torque, mode);
        true
    }

    /// Turn to face `point` and lock rotation again.
    pub fn orient_towards(&mut self, id: EntityId, point: Vec3) -> bool {
        let Some(position) = self.physics.position(id) else {
            return false;
        };
        let Some(m) = self.manifestations.get_mut(&id) else {
            return false;
        };
        m.set_free_rotation(false);
        self.physics.lock_rotations(id, true);
        self.physics.face_towards(id, point - position);
        true
    }

    /// Same element and currently in contact.
    pub fn can_merge_with(&self, id: EntityId, other: EntityId) -> bool {
        let (Some(a), Some(b)) = (self.manifestations.get(&id), self.manifestations.get(&other)) else {
            return false;
        };
        id != other && a.element() == b.element() && self.in_contact(id, other)
    }

    /// Touching according to the contact set or overlapping right now.
    pub fn in_contact(&self, id: EntityId, other: EntityId) -> bool {
        self.manifestations
            .get(&id)
            .is_some_and(|m| m.is_touching(other))
            || self.physics.intersects(id, other)
    }

    /// Absorb `other`'s whole charge into `id` and dispose `other`.
    pub fn merge(&mut self, id: EntityId, other: EntityId) -> bool {
        if !self.can_merge_with(id, other) {
            return false;
        }
        if self.config.merge_momentum == MergeMomentum::Conserve {
            let mass_a = self.manifestations[&id].last_frame().mass;
            let mass_b = self.manifestations[&other].last_frame().mass;
            let v_a = self.physics.velocity(id).unwrap_or_else(Vec3::zeros);
            let v_b = self.physics.velocity(other).unwrap_or_else(Vec3::zeros);
            if mass_a + mass_b > 0.0 {
                self.physics
                    .set_velocity(id, (v_a * mass_a + v_b * mass_b) / (mass_a + mass_b));
            }
        }
        let charge = self.ledgers.energy(other);
        let moved = self.debit(other, charge);
        self.credit(id, moved);
        self.destroy(other, Destruction::Dispose);
        tracing::debug!(survivor = %id, absorbed = %other, charge = moved, "merged");
        true
    }

    /// Split `amount` off into a new sibling with the same element and shape.
    /// Half of `force` pushes the sibling away, the other half pushes back.
    pub fn separate(&mut self, id: EntityId, amount: u64, force: Vec3, mode: ForceMode) -> Option<EntityId> {
        let (element, shape) = {
            let m = self.manifestations.get(&id)?;
            (m.future_element(), m.future_shape())
        };
        let position = self.physics.position(id)?;
        let velocity = self.physics.velocity(id).unwrap_or_else(Vec3::zeros);
        let taken = self.debit(id, amount);
        if taken == 0 {
            return None;
        }

        let direction = force.try_normalize(1.0e-6).unwrap_or_else(Vec3::x);
        let radius = self.manifestations[&id].last_frame().actual_volume.cbrt();
        let owner = self.ledgers.owner(id);
        let sibling = self.spawn_manifestation(element, shape, taken, position + direction * radius, velocity, owner);

        self.physics.apply_force(sibling, force * 0.5, mode);
        self.physics.apply_force(id, -force * 0.5, mode);
        self.settle(id);
        Some(sibling)
    }

    /// Withdraw `energy` into a new aura of `kind` on `target`.
    ///
    /// Fails if the target already has an aura of that kind or nothing could
    /// be withdrawn.
    pub fn apply_aura(&mut self, id: EntityId, target: EntityId, kind: AuraKind, energy: u64) -> Option<EntityId> {
        if !self.manifestations.contains_key(&id) {
            return None;
        }
        if self.units.get(&target)?.aura(kind).is_some() {
            return None;
        }
        let withdrawn = self.debit(id, energy);
        if withdrawn == 0 {
            return None;
        }
        let root = self.resolve_owner(id);
        let aura_id = self.spawn_aura(kind, target, withdrawn, root);
        self.settle(id);
        Some(aura_id)
    }

    fn spawn_aura(&mut self, kind: AuraKind, target: EntityId, energy: u64, owner: EntityId) -> EntityId {
        let id = self.allocate(ObjectKind::Aura);
        self.ledgers.insert(id, energy);
        self.ledgers.set_owner(id, Some(owner), true, &mut self.events);
        self.auras.insert(id, Aura::new(kind, target));
        if let Some(unit) = self.units.get_mut(&target) {
            unit.attach_aura(kind, id);
        }
        self.events.publish(EnergyEvent::AuraApplied { aura: id, target, kind });
        id
    }

    /// Whether `object` may take part in a substitution driven by `id`: the
    /// wizard at the root of `id`'s ownership, or a movable solid body that
    /// `id` or one of its ledger descendants can physically collide with.
    pub fn is_substitutable(&self, id: EntityId, object: EntityId) -> bool {
        if object == self.resolve_owner(id) && self.units.contains_key(&object) {
            return true;
        }
        if self.kind(object) != Some(ObjectKind::Solid) || !self.physics.mass(object).is_some_and(|m| m > 0.0) {
            return false;
        }
        // Ownership is flattened, so direct children are all the descendants.
        std::iter::once(id)
            .chain(self.ledgers.children(id))
            .any(|m| self.collides_with(m, object))
    }

    /// Whether the bodies of `a` and `b` meet as solids rather than passing
    /// through each other.
    fn collides_with(&self, a: EntityId, b: EntityId) -> bool {
        self.manifestations.contains_key(&a)
            && self.physics.has_entity(a)
            && self.physics.has_entity(b)
            && !self.physics.is_sensor(a)
            && !self.physics.is_sensor(b)
    }

    /// Swap the positions of `a` and `b`, consuming `id`.
    pub fn substitute(&mut self, id: EntityId, a: EntityId, b: EntityId) -> bool {
        if !self.manifestations.contains_key(&id) || !self.is_substitutable(id, a) || !self.is_substitutable(id, b) {
            return false;
        }
        let (Some(pa), Some(pb)) = (self.physics.position(a), self.physics.position(b)) else {
            return false;
        };
        self.physics.teleport(a, pb);
        self.physics.teleport(b, pa);
        self.destroy(id, Destruction::Dispose);
        true
    }

    /// Join two bodies with a spring whose rest length is their current
    /// distance.
    pub fn create_elastic_connection(&mut self, a: EntityId, b: EntityId, stiffness: f32, damping: f32) -> Option<ConnectionId> {
        let (pa, pb) = (self.physics.position(a)?, self.physics.position(b)?);
        self.physics
            .connect_spring(a, b, (pb - pa).norm(), stiffness, damping)
    }

    /// Turn a ritual manifestation into a unit on `team`, owned by `owner`.
    /// The unit's health equals the consumed charge.
    pub fn summon(&mut self, id: EntityId, team: u32, owner: EntityId) -> Option<EntityId> {
        if self.element(id)? != Element::Ritual {
            return None;
        }
        let position = self.physics.position(id)?;
        let charge = self.ledgers.energy(id);
        if charge == 0 {
            return None;
        }
        self.debit(id, charge);
        let unit = self.spawn_unit(team, position, 0, charge);
        self.ledgers.set_owner(unit, Some(owner), true, &mut self.events);
        self.destroy(id, Destruction::Dispose);
        self.events.publish(EnergyEvent::Summoned { unit, from: id });
        Some(unit)
    }

    pub fn smash(&mut self, id: EntityId) {
        self.destroy(id, Destruction::Smash);
    }

    pub fn dispose(&mut self, id: EntityId) {
        self.destroy(id, Destruction::Dispose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use aether_core::element::EnergyRegistry;

    fn world() -> EnergyWorld {
        EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default().weightless())
    }

    fn at(x: f32) -> Vec3 {
        Vec3::new(x, 0.0, 0.0)
    }

    #[test]
    fn merge_requires_same_element_and_contact() {
        let mut w = world();
        let a = w.spawn_manifestation(Element::Fire, Shape::Sphere, 30, at(0.0), Vec3::zeros(), None);
        let b = w.spawn_manifestation(Element::Water, Shape::Sphere, 20, at(0.1), Vec3::zeros(), None);
        let c = w.spawn_manifestation(Element::Fire, Shape::Sphere, 20, at(30.0), Vec3::zeros(), None);
        assert!(!w.can_merge_with(a, b));
        assert!(!w.can_merge_with(a, c));
        assert!(!w.merge(a, c));
        assert_eq!(w.energy(a), 30);
    }

    #[test]
    fn conserving_merge_averages_velocity() {
        let config = EngineConfig {
            merge_momentum: MergeMomentum::Conserve,
            ..EngineConfig::default().weightless()
        };
        let mut w = EnergyWorld::new(EnergyRegistry::default(), config);
        let a = w.spawn_manifestation(Element::Fire, Shape::Sphere, 100, at(0.0), at(0.0), None);
        let b = w.spawn_manifestation(Element::Fire, Shape::Sphere, 100, at(0.1), at(2.0), None);
        assert!(w.merge(a, b));
        let v = w.velocity(a).unwrap();
        assert!((v.x - 1.0).abs() < 1e-3, "velocity was {v:?}");
    }

    #[test]
    fn discarding_merge_keeps_survivor_velocity() {
        let mut w = world();
        let a = w.spawn_manifestation(Element::Fire, Shape::Sphere, 100, at(0.0), at(0.0), None);
        let b = w.spawn_manifestation(Element::Fire, Shape::Sphere, 100, at(0.1), at(2.0), None);
        assert!(w.merge(a, b));
        assert_eq!(w.velocity(a).unwrap().x, 0.0);
        assert_eq!(w.energy(a), 200);
        assert!(!w.is_alive(b));
    }

    #[test]
    fn separate_creates_sibling_under_same_owner() {
        let mut w = world();
        let caster = w.spawn_unit(0, at(-10.0), 0, 100);
        let orb = w.spawn_manifestation(Element::Air, Shape::Cube, 100, at(0.0), Vec3::zeros(), Some(caster));
        let sibling = w.separate(orb, 40, at(10.0), ForceMode::Impulse).unwrap();
        assert_eq!(w.energy(orb), 60);
        assert_eq!(w.energy(sibling), 40);
        assert_eq!(w.element(sibling), Some(Element::Air));
        assert_eq!(w.shape(sibling), Some(Shape::Cube));
        assert_eq!(w.resolve_owner(sibling), caster);
        assert!(w.position(sibling).unwrap().x > 0.0);
    }

    #[test]
    fn apply_aura_withdraws_into_owned_aura() {
        let mut w = world();
        let caster = w.spawn_unit(0, at(-10.0), 0, 100);
        let ally = w.spawn_unit(0, at(0.0), 0, 100);
        let orb = w.spawn_manifestation(Element::Pure, Shape::Sphere, 100, at(0.2), Vec3::zeros(), Some(caster));
        let aura = w.apply_aura(orb, ally, AuraKind::Barrier, 40).unwrap();
        assert_eq!(w.energy(orb), 60);
        assert_eq!(w.energy(aura), 40);
        assert_eq!(w.resolve_owner(aura), caster);
        assert_eq!(w.unit(ally).unwrap().aura(AuraKind::Barrier), Some(aura));
        assert!(w.apply_aura(orb, ally, AuraKind::Barrier, 10).is_none());
        assert_eq!(w.energy(orb), 60);
    }

    #[test]
    fn barrier_aura_ticks_then_expires() {
        let mut w = world();
        w.events_mut().set_recording(true);
        let caster = w.spawn_unit(0, at(-10.0), 0, 100);
        let ally = w.spawn_unit(0, at(0.0), 0, 100);
        let orb = w.spawn_manifestation(Element::Pure, Shape::Sphere, 100, at(0.2), Vec3::zeros(), Some(caster));
        let aura = w.apply_aura(orb, ally, AuraKind::Barrier, 12).unwrap();

        w.tick_auras(1.0);
        assert_eq!(w.unit(ally).unwrap().barrier(), 5);
        w.tick_auras(1.0);
        w.tick_auras(1.0);
        assert_eq!(w.unit(ally).unwrap().barrier(), 12);
        assert!(w.is_alive(aura));
        w.tick_auras(1.0);
        assert!(!w.is_alive(aura));
        assert_eq!(w.unit(ally).unwrap().aura(AuraKind::Barrier), None);
        assert!(w.events_mut().take_recorded().iter().any(|e| matches!(
            e,
            EnergyEvent::AuraExpired { aura: expired, .. } if *expired == aura
        )));
    }

    #[test]
    fn substitute_swaps_wizard_and_solid() {
        let mut w = world();
        let caster = w.spawn_unit(0, at(-5.0), 0, 100);
        let crate_box = w.spawn_solid(at(5.0), [0.5, 0.5, 0.5], 1.0);
        let orb = w.spawn_manifestation(Element::Pure, Shape::Sphere, 10, at(0.0), Vec3::zeros(), Some(caster));
        // Mass properties settle on the first step.
        w.step_physics(1.0 / 60.0);
        assert!(w.substitute(orb, caster, crate_box));
        assert!((w.position(caster).unwrap().x - 5.0).abs() < 0.1);
        assert!((w.position(crate_box).unwrap().x + 5.0).abs() < 0.1);
        assert!(!w.is_alive(orb));
    }

    #[test]
    fn static_bodies_are_not_substitutable() {
        let mut w = world();
        let caster = w.spawn_unit(0, at(-5.0), 0, 100);
        let wall = w.spawn_static(at(5.0), [0.5, 0.5, 0.5]);
        let orb = w.spawn_manifestation(Element::Pure, Shape::Sphere, 10, at(0.0), Vec3::zeros(), Some(caster));
        assert!(!w.substitute(orb, caster, wall));
        assert!(w.is_alive(orb));
    }

    #[test]
    fn summon_turns_ritual_into_owned_unit() {
        let mut w = world();
        let caster = w.spawn_unit(3, at(-5.0), 0, 100);
        let ritual = w.spawn_manifestation(Element::Ritual, Shape::Cube, 250, at(0.0), Vec3::zeros(), Some(caster));
        let unit = w.summon(ritual, 3, caster).unwrap();
        assert!(!w.is_alive(ritual));
        assert_eq!(w.unit(unit).unwrap().health(), 250);
        assert_eq!(w.unit(unit).unwrap().team(), 3);
        assert_eq!(w.resolve_owner(unit), caster);
    }

    #[test]
    fn torque_frees_rotation_and_orient_locks_it() {
        let mut w = world();
        let orb = w.spawn_manifestation(Element::Earth, Shape::Cube, 100, at(0.0), Vec3::zeros(), None);
        w.apply_torque(orb, Vec3::new(0.0, 1.0, 0.0), ForceMode::Impulse);
        assert!(w.manifestation(orb).unwrap().free_rotation());
        w.orient_towards(orb, at(5.0));
        assert!(!w.manifestation(orb).unwrap().free_rotation());
    }
}
