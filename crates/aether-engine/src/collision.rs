//! Collision resolution.
//!
//! Reacts to the contacts reported by the physics step. Every physical
//! quantity is read from the frame snapshots taken at the start of the step,
//! while ledger changes apply immediately. Because the snapshots do not move
//! during resolution, the order in which pairs are processed within a step
//! does not change the outcome.
//!
//! Per contact, each manifestation side reacts on its own:
//!
//! - **Enter**: record the contact. Between two rigid bodies, a velocity
//!   change above the element's smash threshold smashes the manifestation.
//! - **Stay**: dispatch on the partner's kind. Pass-through elements lose the
//!   energy of the intersecting volume; units also take that energy as
//!   damage and receive the element's status effect. A solid manifestation
//!   hit by a pass-through one is pushed (or smashed) by the elastic
//!   response.
//! - **Exit**: forget the contact.

use aether_core::cost::ForceMode;
use aether_core::entity::{EntityId, ObjectKind};
use aether_core::events::EnergyEvent;
use aether_core::formula;

use crate::manifestation::FrameProperties;
use crate::physics::{ContactEvent, ContactPhase, Vec3};
use crate::world::{Destruction, EnergyWorld};

/// Seconds of status charge a unit receives per second of contact, per unit
/// of intensity.
const STATUS_CHARGE_PER_CONTACT_SECOND: f32 = 3.0;

/// Physical properties of the far side of a contact.
#[derive(Debug, Clone, Copy)]
struct Partner {
    kind: ObjectKind,
    /// `None` for bodies the contact cannot move.
    mass: Option<f32>,
    velocity: Vec3,
    volume: f32,
    density: f32,
    pass_through: bool,
}

impl EnergyWorld {
    /// Resolve one step's contacts. `dt` is the step length used for the
    /// penetration estimate.
    pub fn resolve_contacts(&mut self, contacts: &[ContactEvent], dt: f32) {
        for contact in contacts {
            for side in [contact.a, contact.b] {
                if !self.manifestations.contains_key(&side) {
                    continue;
                }
                let other = contact.other(side);
                match contact.phase {
                    ContactPhase::Enter => self.contact_enter(side, other, contact),
                    ContactPhase::Stay => self.contact_stay(side, other, contact, dt),
                    ContactPhase::Exit => self.contact_exit(side, other),
                }
            }
        }
    }

    fn partner(&self, other: EntityId) -> Option<Partner> {
        let kind = self.kind(other)?;
        if let Some(m) = self.manifestations.get(&other) {
            let frame = m.last_frame();
            return Some(Partner {
                kind,
                mass: Some(frame.mass),
                velocity: frame.velocity(),
                volume: frame.actual_volume,
                density: frame.density,
                pass_through: self.registry.element(frame.element).pass_through,
            });
        }
        let info = self.body_info(other)?;
        Some(Partner {
            kind,
            mass: self.physics.mass(other),
            velocity: self.physics.velocity(other).unwrap_or_else(Vec3::zeros),
            volume: info.volume,
            density: info.density,
            pass_through: false,
        })
    }

    fn frame(&self, id: EntityId) -> Option<FrameProperties> {
        self.manifestations.get(&id).map(|m| *m.last_frame())
    }

    fn contact_enter(&mut self, id: EntityId, other: EntityId, contact: &ContactEvent) {
        let Some(kind) = self.kind(other) else {
            return;
        };
        if let Some(m) = self.manifestations.get_mut(&id) {
            m.touch(other);
        }
        self.events.publish(EnergyEvent::CollisionEnter { entity: id, other, kind });

        if contact.sensor {
            return;
        }
        let (Some(frame), Some(partner)) = (self.frame(id), self.partner(other)) else {
            return;
        };
        let delta_v = self.elastic_delta(&frame, &partner, contact.normal);
        let threshold = self.registry.element(frame.element).smash_impulse;
        if delta_v.norm() > threshold {
            tracing::debug!(entity = %id, other = %other, delta_v = delta_v.norm(), "smashed on impact");
            self.destroy(id, Destruction::Smash);
        }
    }

    fn contact_exit(&mut self, id: EntityId, other: EntityId) {
        let removed = self
            .manifestations
            .get_mut(&id)
            .is_some_and(|m| m.untouch(other));
        if removed {
            let kind = self.kind(other).unwrap_or(ObjectKind::Static);
            self.events.publish(EnergyEvent::CollisionExit { entity: id, other, kind });
        }
    }

    fn contact_stay(&mut self, id: EntityId, other: EntityId, contact: &ContactEvent, dt: f32) {
        let (Some(frame), Some(partner)) = (self.frame(id), self.partner(other)) else {
            return;
        };
        let pass_through = self.registry.element(frame.element).pass_through;
        match partner.kind {
            ObjectKind::Unit => {
                if !self.may_harm(id, other) {
                    return;
                }
                self.apply_status_hook(&frame, other, dt);
                if pass_through {
                    let lost = self.drain_intersection(id, &frame, &partner, contact, dt);
                    if lost > 0 {
                        self.damage_unit(other, lost);
                    }
                    self.settle(id);
                }
            }
            ObjectKind::Manifestation => {
                if self.resolve_owner(id) == self.resolve_owner(other) || !self.may_harm(id, other) {
                    return;
                }
                if pass_through {
                    self.drain_intersection(id, &frame, &partner, contact, dt);
                    self.settle(id);
                } else if partner.pass_through {
                    let delta_v = self.elastic_delta(&frame, &partner, contact.normal);
                    let threshold = self.registry.element(frame.element).smash_impulse;
                    if delta_v.norm() > threshold {
                        tracing::debug!(entity = %id, other = %other, "smashed by pass-through hit");
                        self.destroy(id, Destruction::Smash);
                    } else {
                        self.physics.apply_force(id, delta_v * frame.mass, ForceMode::Impulse);
                    }
                }
            }
            ObjectKind::Solid | ObjectKind::Static => {
                if pass_through {
                    self.drain_intersection(id, &frame, &partner, contact, dt);
                    self.settle(id);
                }
            }
            ObjectKind::Aura => {}
        }
    }

    /// Whether the owners of `id` and `other` are allowed to fight. Objects
    /// not rooted in a unit are always hostile.
    fn may_harm(&self, id: EntityId, other: EntityId) -> bool {
        let own_root = self.resolve_owner(id);
        let other_root = self.resolve_owner(other);
        if own_root == other_root {
            return false;
        }
        match (self.units.get(&own_root), self.units.get(&other_root)) {
            (Some(attacker), Some(defender)) => attacker.can_attack(defender),
            _ => true,
        }
    }

    fn apply_status_hook(&mut self, frame: &FrameProperties, unit_id: EntityId, dt: f32) {
        let Some(effect) = self.registry.element(frame.element).status_effect else {
            return;
        };
        let intensity = self.registry.scaled(frame.charge);
        let Some(unit) = self.units.get_mut(&unit_id) else {
            return;
        };
        let fresh = unit.charge_status(effect, intensity, intensity * dt * STATUS_CHARGE_PER_CONTACT_SECOND);
        if fresh {
            self.events.publish(EnergyEvent::StatusApplied { unit: unit_id, effect });
        }
    }

    /// Velocity change the elastic response would give the manifestation
    /// along the contact normal. Tangential motion is not an impact. Without a
    /// normal the whole change counts.
    fn elastic_delta(&self, frame: &FrameProperties, partner: &Partner, normal: Vec3) -> Vec3 {
        let v1 = frame.velocity;
        let v2 = [partner.velocity.x, partner.velocity.y, partner.velocity.z];
        let after = formula::elastic_velocity(frame.mass, v1, partner.mass, v2);
        let delta = Vec3::new(after[0] - v1[0], after[1] - v1[1], after[2] - v1[2]);
        match normal.try_normalize(f32::EPSILON) {
            Some(n) => n * delta.dot(&n),
            None => delta,
        }
    }

    /// Remove the energy of the intersecting volume from `id`. Returns what
    /// was actually removed.
    fn drain_intersection(
        &mut self,
        id: EntityId,
        frame: &FrameProperties,
        partner: &Partner,
        contact: &ContactEvent,
        dt: f32,
    ) -> u64 {
        let amount = self.intersecting_energy(frame, partner, contact, dt);
        if amount == 0 {
            return 0;
        }
        let lost = self.debit(id, amount);
        tracing::trace!(entity = %id, lost, "contact drained energy");
        lost
    }

    /// Charge equivalent of the volume chipped off in this contact, rounded up
    /// and clamped to the charge frozen for this step.
    fn intersecting_energy(
        &self,
        frame: &FrameProperties,
        partner: &Partner,
        contact: &ContactEvent,
        dt: f32,
    ) -> u64 {
        let smaller = frame.actual_volume.min(partner.volume);
        let penetration = contact.depth.max(contact.relative_velocity.norm() * dt);
        let volume = formula::intersecting_volume(smaller, penetration);
        if volume <= 0.0 {
            return 0;
        }
        let def = self.registry.element(frame.element);
        let density = frame.density.min(partner.density);
        let energy = formula::energy_for_volume(
            volume,
            density,
            self.registry.energy_scale(),
            def.mass_per_unit,
            frame.lorentz,
        );
        if !energy.is_finite() || energy <= 0.0 {
            return 0;
        }
        (energy.ceil() as u64).clamp(1, frame.charge.max(1))
    }
}
