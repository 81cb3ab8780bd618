//! The energy world: every simulated object and the state they share.
//!
//! [`EnergyWorld`] owns the entity allocator, the ledger tree, the physics
//! adapter and the event bus, plus one table per object kind. Object
//! lifetimes are managed here: [`EnergyWorld::destroy`] cleans up every table
//! synchronously and destroys whatever the ledger contraction orphans.
//!
//! The manipulations a manifestation supports live in
//! [`manipulation`](crate::manipulation), collision handling in
//! [`collision`](crate::collision). Both are `impl EnergyWorld` blocks.
//!
//! # Example
//!
//! ```
//! use aether_engine::prelude::*;
//!
//! let mut world = EnergyWorld::new(EnergyRegistry::default(), EngineConfig::default());
//! let wizard = world.spawn_unit(0, Vec3::zeros(), 1000, 100);
//! let orb = world.spawn_manifestation(
//!     Element::Fire,
//!     Shape::Sphere,
//!     250,
//!     Vec3::new(3.0, 0.0, 0.0),
//!     Vec3::zeros(),
//!     Some(wizard),
//! );
//!
//! assert_eq!(world.resolve_owner(orb), wizard);
//! assert_eq!(world.energy_scaled(orb), 2);
//! assert!((world.energy_scaled_f32(orb) - 2.5).abs() < 1e-6);
//!
//! world.destroy(wizard, Destruction::Dispose);
//! assert!(!world.is_alive(orb));
//! ```

use std::collections::BTreeMap;

use aether_core::cost::{AuraCost, DefaultAuraCost};
use aether_core::element::{Element, ElementDefinition, EnergyRegistry, Shape};
use aether_core::entity::{EntityAllocator, EntityId, ObjectKind};
use aether_core::events::{EnergyEvent, EventBus};
use aether_core::formula;
use aether_core::ledger::{LedgerTree, OwnerChange};
use aether_core::status::{AuraKind, StatusEffectKind};
use aether_core::EnergyError;

use crate::aura::{Aura, AuraTick};
use crate::config::EngineConfig;
use crate::manifestation::{FrameProperties, Manifestation};
use crate::physics::{BodyDesc, BodyType, ColliderShape, ContactEvent, PhysicsWorld, Vec3};
use crate::unit::Unit;
use crate::EngineError;

const UNIT_RADIUS: f32 = 0.4;
const UNIT_HALF_HEIGHT: f32 = 0.5;
const UNIT_DENSITY: f32 = 1.0;

/// How an object leaves the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destruction {
    /// Violent destruction.
    Smash,
    /// Clean removal.
    Dispose,
}

/// Constant physical properties of a body that is not a manifestation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyInfo {
    pub volume: f32,
    /// `f32::INFINITY` for static bodies.
    pub density: f32,
}

pub(crate) fn gravity_scale(def: &ElementDefinition) -> f32 {
    if def.gravity {
        1.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// EnergyWorld
// ---------------------------------------------------------------------------

pub struct EnergyWorld {
    pub(crate) registry: EnergyRegistry,
    pub(crate) config: EngineConfig,
    allocator: EntityAllocator,
    kinds: BTreeMap<EntityId, ObjectKind>,
    pub(crate) ledgers: LedgerTree,
    pub(crate) manifestations: BTreeMap<EntityId, Manifestation>,
    pub(crate) units: BTreeMap<EntityId, Unit>,
    pub(crate) auras: BTreeMap<EntityId, Aura>,
    bodies: BTreeMap<EntityId, BodyInfo>,
    pub(crate) physics: PhysicsWorld,
    pub(crate) events: EventBus,
    aura_cost: Box<dyn AuraCost>,
}

impl EnergyWorld {
    /// Create an empty world.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid. Use [`EnergyWorld::try_new`] for
    /// untrusted configuration.
    pub fn new(registry: EnergyRegistry, config: EngineConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }
        Self::build(registry, config)
    }

    pub fn try_new(registry: EnergyRegistry, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(registry, config))
    }

    /// Build a world from a JSON energy table and a JSON engine config.
    pub fn from_json_str(registry: &str, config: &str) -> Result<Self, EngineError> {
        let registry = EnergyRegistry::from_json_str(registry)?;
        let config = EngineConfig::from_json_str(config)?;
        Self::try_new(registry, config)
    }

    fn build(registry: EnergyRegistry, config: EngineConfig) -> Self {
        let registry = match config.speed_limit {
            Some(limit) => registry.with_speed_limit(limit),
            None => registry,
        };
        Self {
            physics: PhysicsWorld::new(config.gravity),
            registry,
            config,
            allocator: EntityAllocator::new(),
            kinds: BTreeMap::new(),
            ledgers: LedgerTree::new(),
            manifestations: BTreeMap::new(),
            units: BTreeMap::new(),
            auras: BTreeMap::new(),
            bodies: BTreeMap::new(),
            events: EventBus::new(),
            aura_cost: Box::new(DefaultAuraCost::default()),
        }
    }

    /// Replace the aura activation pricing.
    pub fn with_aura_cost(mut self, cost: impl AuraCost + 'static) -> Self {
        self.aura_cost = Box::new(cost);
        self
    }

    pub fn registry(&self) -> &EnergyRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe, unsubscribe or toggle recording.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn ledgers(&self) -> &LedgerTree {
        &self.ledgers
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    // -- spawning -----------------------------------------------------------

    pub(crate) fn allocate(&mut self, kind: ObjectKind) -> EntityId {
        let id = self.allocator.allocate();
        self.kinds.insert(id, kind);
        id
    }

    /// Spawn a unit holding `energy` with `health` hit points.
    pub fn spawn_unit(&mut self, team: u32, position: Vec3, energy: u64, health: u64) -> EntityId {
        use std::f32::consts::PI;
        let id = self.allocate(ObjectKind::Unit);
        self.ledgers.insert(id, energy);
        self.units.insert(id, Unit::new(team, health));
        let volume = PI * UNIT_RADIUS * UNIT_RADIUS * (2.0 * UNIT_HALF_HEIGHT)
            + 4.0 / 3.0 * PI * UNIT_RADIUS.powi(3);
        self.bodies.insert(
            id,
            BodyInfo {
                volume,
                density: UNIT_DENSITY,
            },
        );
        self.physics.register(
            id,
            &BodyDesc {
                body_type: BodyType::Kinematic,
                position,
                velocity: Vec3::zeros(),
                collider: ColliderShape::Capsule {
                    half_height: UNIT_HALF_HEIGHT,
                    radius: UNIT_RADIUS,
                },
                sensor: false,
                mass: None,
                density: UNIT_DENSITY,
                gravity_scale: 0.0,
                lock_rotations: true,
            },
        );
        id
    }

    /// Spawn a movable box of ordinary matter.
    pub fn spawn_solid(&mut self, position: Vec3, half_extents: [f32; 3], density: f32) -> EntityId {
        let id = self.allocate(ObjectKind::Solid);
        let [x, y, z] = half_extents;
        self.bodies.insert(
            id,
            BodyInfo {
                volume: 8.0 * x * y * z,
                density,
            },
        );
        self.physics.register(
            id,
            &BodyDesc {
                body_type: BodyType::Dynamic,
                position,
                velocity: Vec3::zeros(),
                collider: ColliderShape::Cuboid { half_extents },
                sensor: false,
                mass: None,
                density,
                gravity_scale: 1.0,
                lock_rotations: false,
            },
        );
        id
    }

    /// Spawn an immovable box (walls, floors).
    pub fn spawn_static(&mut self, position: Vec3, half_extents: [f32; 3]) -> EntityId {
        let id = self.allocate(ObjectKind::Static);
        let [x, y, z] = half_extents;
        self.bodies.insert(
            id,
            BodyInfo {
                volume: 8.0 * x * y * z,
                density: f32::INFINITY,
            },
        );
        self.physics
            .register(id, &BodyDesc::fixed(position, ColliderShape::Cuboid { half_extents }));
        id
    }

    /// Spawn a manifestation holding `charge`, owned by `owner`'s root.
    ///
    /// This is the raw constructor; casters go through
    /// [`EnergyController::manifest_energy`](crate::gateway::EnergyController::manifest_energy).
    pub fn spawn_manifestation(
        &mut self,
        element: Element,
        shape: Shape,
        charge: u64,
        position: Vec3,
        velocity: Vec3,
        owner: Option<EntityId>,
    ) -> EntityId {
        let id = self.allocate(ObjectKind::Manifestation);
        self.ledgers.insert(id, charge);
        if owner.is_some() {
            self.ledgers.set_owner(id, owner, false, &mut self.events);
        }

        let manifestation = Manifestation::new(&self.registry, element, shape, charge, velocity);
        let def = self.registry.element(element);
        let (collider, _) = manifestation.future_collider(&self.registry, charge);
        self.physics.register(
            id,
            &BodyDesc {
                body_type: BodyType::Dynamic,
                position,
                velocity,
                collider,
                sensor: def.pass_through,
                mass: Some(manifestation.mass()),
                density: 0.0,
                gravity_scale: gravity_scale(def),
                lock_rotations: true,
            },
        );
        self.manifestations.insert(id, manifestation);
        tracing::debug!(entity = %id, %element, %shape, charge, "manifestation spawned");
        id
    }

    // -- queries ------------------------------------------------------------

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id) && self.kinds.contains_key(&id)
    }

    pub fn kind(&self, id: EntityId) -> Option<ObjectKind> {
        self.kinds.get(&id).copied()
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn manifestation(&self, id: EntityId) -> Option<&Manifestation> {
        self.manifestations.get(&id)
    }

    /// Live manifestation ids, sorted.
    pub fn manifestation_ids(&self) -> Vec<EntityId> {
        self.manifestations.keys().copied().collect()
    }

    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Live unit ids, sorted.
    pub fn unit_ids(&self) -> Vec<EntityId> {
        self.units.keys().copied().collect()
    }

    pub fn aura(&self, id: EntityId) -> Option<&Aura> {
        self.auras.get(&id)
    }

    pub fn body_info(&self, id: EntityId) -> Option<BodyInfo> {
        self.bodies.get(&id).copied()
    }

    /// Raw energy of `id`'s ledger, `0` if it has none.
    pub fn energy(&self, id: EntityId) -> u64 {
        self.ledgers.energy(id)
    }

    /// Energy in whole user-facing units.
    pub fn energy_scaled(&self, id: EntityId) -> u64 {
        self.energy(id) / self.registry.energy_scale()
    }

    pub fn energy_scaled_f32(&self, id: EntityId) -> f32 {
        self.registry.scaled(self.energy(id))
    }

    /// Committed element of a manifestation.
    pub fn element(&self, id: EntityId) -> Option<Element> {
        self.manifestations.get(&id).map(Manifestation::element)
    }

    /// Committed shape of a manifestation.
    pub fn shape(&self, id: EntityId) -> Option<Shape> {
        self.manifestations.get(&id).map(Manifestation::shape)
    }

    pub fn is_sealed(&self, id: EntityId) -> bool {
        self.manifestations
            .get(&id)
            .is_some_and(|m| m.is_sealed(&self.registry))
    }

    /// Position of `id`. Auras report their target's position.
    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        self.physics
            .position(id)
            .or_else(|| self.auras.get(&id).and_then(|a| self.physics.position(a.target())))
    }

    /// Like [`position`](Self::position), for callers that treat a missing
    /// body as an error.
    pub fn try_position(&self, id: EntityId) -> Result<Vec3, EngineError> {
        if !self.is_alive(id) {
            return Err(EnergyError::StaleEntity { entity: id }.into());
        }
        self.position(id).ok_or(EngineError::MissingBody { entity: id })
    }

    pub fn velocity(&self, id: EntityId) -> Option<Vec3> {
        self.physics.velocity(id)
    }

    pub fn resolve_owner(&self, id: EntityId) -> EntityId {
        self.ledgers.resolve_owner(id)
    }

    /// The unit at the root of `id`'s ownership, if the root is a unit.
    pub fn owner_unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&self.resolve_owner(id))
    }

    // -- ownership and lifetime ---------------------------------------------

    /// Reassign the owner of `id`. Destroys the object if it is orphaned.
    pub fn set_owner(&mut self, id: EntityId, owner: Option<EntityId>, keep_object: bool) -> OwnerChange {
        let change = self.ledgers.set_owner(id, owner, keep_object, &mut self.events);
        if change == OwnerChange::Orphaned {
            self.destroy(id, Destruction::Dispose);
        }
        change
    }

    /// Remove `id` and everything its removal orphans.
    pub fn destroy(&mut self, id: EntityId, how: Destruction) {
        let mut pending = vec![(id, how)];
        while let Some((id, how)) = pending.pop() {
            let Some(kind) = self.kinds.remove(&id) else {
                continue;
            };
            match kind {
                ObjectKind::Manifestation => {
                    self.manifestations.remove(&id);
                    self.events.publish(match how {
                        Destruction::Smash => EnergyEvent::Smashed { entity: id },
                        Destruction::Dispose => EnergyEvent::Disposed { entity: id },
                    });
                }
                ObjectKind::Unit => {
                    if let Some(unit) = self.units.remove(&id) {
                        pending.extend(unit.auras().map(|(_, aura)| (aura, Destruction::Dispose)));
                    }
                    self.events.publish(EnergyEvent::Disposed { entity: id });
                }
                ObjectKind::Aura => {
                    if let Some(aura) = self.auras.remove(&id) {
                        if let Some(unit) = self.units.get_mut(&aura.target()) {
                            unit.detach_aura(aura.kind(), id);
                        }
                        self.events.publish(EnergyEvent::AuraExpired {
                            aura: id,
                            target: aura.target(),
                            kind: aura.kind(),
                        });
                    }
                }
                ObjectKind::Solid | ObjectKind::Static => {
                    self.events.publish(EnergyEvent::Disposed { entity: id });
                }
            }
            for manifestation in self.manifestations.values_mut() {
                manifestation.untouch(id);
            }
            self.bodies.remove(&id);
            self.physics.unregister(id);
            let orphans = self.ledgers.remove(id, &mut self.events);
            pending.extend(orphans.into_iter().map(|o| (o, Destruction::Dispose)));
            self.allocator.release(id);
            tracing::debug!(entity = %id, ?kind, ?how, "object destroyed");
        }
    }

    /// Dispose a manifestation whose ledger ran dry.
    pub(crate) fn settle(&mut self, id: EntityId) {
        if self.manifestations.contains_key(&id) && self.ledgers.energy(id) == 0 {
            self.destroy(id, Destruction::Dispose);
        }
    }

    pub(crate) fn credit(&mut self, id: EntityId, amount: u64) -> u64 {
        self.ledgers.increase(id, amount, &mut self.events)
    }

    pub(crate) fn debit(&mut self, id: EntityId, amount: u64) -> u64 {
        self.ledgers.decrease(id, amount, &mut self.events)
    }

    /// Damage a unit. A defeated unit is despawned.
    pub(crate) fn damage_unit(&mut self, id: EntityId, amount: u64) {
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        let outcome = unit.take_damage(amount);
        if outcome.dealt > 0 || outcome.absorbed > 0 {
            self.events.publish(EnergyEvent::UnitDamaged {
                unit: id,
                amount: outcome.dealt,
            });
        }
        if outcome.defeated {
            self.events.publish(EnergyEvent::UnitDefeated { unit: id });
            tracing::debug!(unit = %id, "unit defeated");
            self.destroy(id, Destruction::Dispose);
        }
    }

    // -- per-step phases ------------------------------------------------------

    /// Frame boundary: commit pending properties of every manifestation and
    /// take the snapshots the next collision pass reads.
    pub fn commit_frame(&mut self) {
        for id in self.manifestation_ids() {
            self.commit_manifestation(id);
        }
    }

    fn commit_manifestation(&mut self, id: EntityId) {
        let charge = self.ledgers.energy(id);
        let mut velocity = self.physics.velocity(id).unwrap_or_else(Vec3::zeros);
        let Some(m) = self.manifestations.get_mut(&id) else {
            return;
        };

        let mut reshaped = m.resolve_stress(&self.registry);
        let change = m.commit_pending();
        if change.element.is_some() {
            // Elasticity depends on the element.
            reshaped |= m.resolve_stress(&self.registry);
        }
        let element = m.element();
        let shape = m.shape();

        // Conserve momentum across rest-mass changes (charge or element).
        let previous = *m.last_frame();
        let speed = velocity.norm();
        let before = self.registry.mass(previous.element, previous.charge, speed);
        let after = self.registry.mass(element, charge, speed);
        if before > 0.0 && after > 0.0 && before != after {
            velocity *= before / after;
            let cap = self.registry.speed_limit() * formula::MAX_SPEED_RATIO;
            let speed = velocity.norm();
            if speed > cap {
                velocity *= cap / speed;
            }
            self.physics.set_velocity(id, velocity);
        }

        let frame = FrameProperties::measure(&self.registry, element, shape, charge, velocity, m.deformation());
        m.set_mass(frame.mass);
        self.physics.set_mass(id, frame.mass);

        let def = self.registry.element(element);
        if reshaped || change.shape.is_some() || change.element.is_some() || m.collider_drifted(frame.actual_volume) {
            let (collider, volume) = m.future_collider(&self.registry, charge);
            self.physics.rebuild_collider(id, collider, def.pass_through);
            m.set_collider_volume(volume);
        }
        if !m.free_rotation() {
            self.physics.face_towards(id, velocity);
        }
        m.set_last_frame(frame);

        if let Some((from, to)) = change.element {
            self.events.publish(EnergyEvent::ElementChanged { entity: id, from, to });
        }
        if let Some((from, to)) = change.shape {
            self.events.publish(EnergyEvent::ShapeChanged { entity: id, from, to });
        }
        tracing::trace!(entity = %id, charge, mass = frame.mass, "frame committed");
    }

    /// Advance the physics simulation and return the contacts to resolve.
    pub fn step_physics(&mut self, dt: f32) -> Vec<ContactEvent> {
        self.physics.step(dt)
    }

    /// Drain status effects. Burning damages its unit.
    pub fn tick_status(&mut self, dt: f32) {
        for id in self.unit_ids() {
            let Some(unit) = self.units.get_mut(&id) else {
                continue;
            };
            let burn: u64 = unit
                .tick_status(dt)
                .into_iter()
                .filter(|(kind, _)| *kind == StatusEffectKind::Burning)
                .map(|(_, drained)| drained)
                .sum();
            if burn > 0 {
                self.damage_unit(id, burn);
            }
        }
    }

    /// Activate auras whose interval elapsed.
    pub fn tick_auras(&mut self, dt: f32) {
        let interval = self.config.aura_interval;
        let ids: Vec<EntityId> = self.auras.keys().copied().collect();
        for id in ids {
            let Some(aura) = self.auras.get_mut(&id) else {
                continue;
            };
            let tick = aura.advance(id, dt, interval, self.aura_cost.as_ref(), &mut self.ledgers, &mut self.events);
            let (kind, target) = (aura.kind(), aura.target());
            match tick {
                AuraTick::Idle => {}
                AuraTick::Paid(paid) => self.apply_aura_effect(kind, target, paid),
                AuraTick::Expired(paid) => {
                    self.apply_aura_effect(kind, target, paid);
                    tracing::debug!(aura = %id, target = %target, ?kind, "aura expired");
                    self.destroy(id, Destruction::Dispose);
                }
            }
        }
    }

    fn apply_aura_effect(&mut self, kind: AuraKind, target: EntityId, amount: u64) {
        if amount == 0 {
            return;
        }
        match kind {
            AuraKind::Regeneration => {
                if let Some(unit) = self.units.get_mut(&target) {
                    unit.heal(amount);
                }
            }
            AuraKind::Burning => self.damage_unit(target, amount),
            AuraKind::Barrier => {
                if let Some(unit) = self.units.get_mut(&target) {
                    unit.add_barrier(amount);
                }
            }
        }
    }

    /// Ownerless manifestations lose `max(1, charge * decay_fraction)` per
    /// full decay interval.
    pub fn tick_decay(&mut self, dt: f32) {
        let interval = self.config.decay_interval;
        let fraction = self.config.decay_fraction;
        for id in self.manifestation_ids() {
            let ownerless = self.ledgers.owner(id).is_none();
            let Some(m) = self.manifestations.get_mut(&id) else {
                continue;
            };
            if !ownerless {
                m.decay = Default::default();
                continue;
            }
            let ticks = m.decay.advance(dt, interval);
            for _ in 0..ticks {
                let charge = self.ledgers.energy(id);
                if charge == 0 {
                    break;
                }
                let loss = ((charge as f32 * fraction) as u64).max(1);
                self.ledgers.decrease(id, loss, &mut self.events);
            }
            if ticks > 0 {
                tracing::trace!(entity = %id, ticks, "ownerless decay");
                self.settle(id);
            }
        }
    }
}

impl std::fmt::Debug for EnergyWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyWorld")
            .field("objects", &self.kinds.len())
            .field("manifestations", &self.manifestations.len())
            .field("units", &self.units.len())
            .field("auras", &self.auras.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
