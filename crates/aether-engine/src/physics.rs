//! rapier3d integration.
//!
//! The [`PhysicsWorld`] owns a rapier simulation and maps it to engine
//! [`EntityId`]s. It is the only module that talks to rapier; everything else
//! sees positions, velocities and [`ContactEvent`]s.
//!
//! # Contact tracking
//!
//! Touching pairs are tracked explicitly from rapier's started/stopped events
//! instead of relying on rapier's persistence alone. Every step yields an
//! `Enter` for each new pair, a `Stay` for every tracked pair and an `Exit`
//! for each pair that separated. Events are sorted by phase and then by
//! `(min, max)` entity id, so resolution order never depends on rapier's
//! channel delivery order.
//!
//! # Determinism
//!
//! rapier3d is compiled with `enhanced-determinism`. Combined with a fixed
//! timestep and the sorted event order above, a step is reproducible on the
//! same platform.

use std::collections::{BTreeMap, HashMap};

use aether_core::cost::ForceMode;
use aether_core::element::ColliderKind;
use aether_core::entity::EntityId;
use rapier3d::na::UnitQuaternion;
use rapier3d::parry::query;
use rapier3d::prelude::*;

/// Engine vector type.
pub type Vec3 = Vector<Real>;

/// Floor applied to dynamic masses; rapier misbehaves on massless bodies.
const MIN_BODY_MASS: Real = 1.0e-4;

/// Gap within which two shapes still report a contact normal.
const CONTACT_PREDICTION: Real = 0.05;

// ---------------------------------------------------------------------------
// Body descriptors
// ---------------------------------------------------------------------------

/// How rapier treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Fully simulated.
    Dynamic,
    /// Moved by game logic.
    Kinematic,
    /// Immovable.
    Static,
}

/// Collider geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    Ball { radius: Real },
    Cuboid { half_extents: [Real; 3] },
    Cylinder { half_height: Real, radius: Real },
    Capsule { half_height: Real, radius: Real },
}

impl ColliderShape {
    /// Geometry of `kind` enclosing `volume`, stretched per axis by
    /// `deformation`. `volume` is the undeformed volume.
    pub fn for_volume(kind: ColliderKind, volume: Real, deformation: [Real; 3]) -> Self {
        use std::f32::consts::PI;
        let volume = volume.max(1.0e-6);
        let [dx, dy, dz] = deformation;
        match kind {
            ColliderKind::Ball => {
                let deformed = volume * dx * dy * dz;
                ColliderShape::Ball {
                    radius: (3.0 * deformed / (4.0 * PI)).cbrt(),
                }
            }
            ColliderKind::Cuboid => {
                let half = volume.cbrt() / 2.0;
                ColliderShape::Cuboid {
                    half_extents: [half * dx, half * dy, half * dz],
                }
            }
            ColliderKind::Cylinder => {
                // Height equal to diameter: V = 2πr³.
                let r = (volume / (2.0 * PI)).cbrt();
                ColliderShape::Cylinder {
                    half_height: r * dy,
                    radius: r * (dx * dz).sqrt(),
                }
            }
            ColliderKind::Capsule => {
                // Segment length 2r: V = 2πr³ + 4/3πr³.
                let r = (volume / (PI * (2.0 + 4.0 / 3.0))).cbrt();
                ColliderShape::Capsule {
                    half_height: r * dy,
                    radius: r * (dx * dz).sqrt(),
                }
            }
        }
    }

    fn to_shared(self) -> SharedShape {
        match self {
            ColliderShape::Ball { radius } => SharedShape::ball(radius),
            ColliderShape::Cuboid { half_extents: [x, y, z] } => SharedShape::cuboid(x, y, z),
            ColliderShape::Cylinder { half_height, radius } => SharedShape::cylinder(half_height, radius),
            ColliderShape::Capsule { half_height, radius } => SharedShape::capsule_y(half_height, radius),
        }
    }
}

/// Everything needed to register a body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub body_type: BodyType,
    pub position: Vec3,
    pub velocity: Vec3,
    pub collider: ColliderShape,
    /// Detects contact without a rigid response.
    pub sensor: bool,
    /// Explicit mass. `None` derives mass from `density`.
    pub mass: Option<Real>,
    pub density: Real,
    pub gravity_scale: Real,
    pub lock_rotations: bool,
}

impl BodyDesc {
    /// A fixed body.
    pub fn fixed(position: Vec3, collider: ColliderShape) -> Self {
        Self {
            body_type: BodyType::Static,
            position,
            velocity: Vec3::zeros(),
            collider,
            sensor: false,
            mass: None,
            density: 1.0,
            gravity_scale: 0.0,
            lock_rotations: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ContactEvent
// ---------------------------------------------------------------------------

/// Phase of a contact between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContactPhase {
    Enter,
    Stay,
    Exit,
}

/// One contact observation for a pair of bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    /// Lower id of the pair.
    pub a: EntityId,
    /// Higher id of the pair.
    pub b: EntityId,
    /// At least one side is a sensor (pass-through).
    pub sensor: bool,
    /// Deepest penetration reported by the narrow phase, `>= 0`.
    pub depth: Real,
    /// `velocity(b) - velocity(a)`.
    pub relative_velocity: Vec3,
    /// Unit contact normal pointing from `a` towards `b`, or zero when the
    /// pair has no usable geometry.
    pub normal: Vec3,
}

impl ContactEvent {
    /// The partner of `entity` in this pair.
    pub fn other(&self, entity: EntityId) -> EntityId {
        if entity == self.a {
            self.b
        } else {
            self.a
        }
    }

    /// Relative velocity as seen from `entity`: `velocity(other) - velocity(entity)`.
    pub fn relative_velocity_for(&self, entity: EntityId) -> Vec3 {
        if entity == self.a {
            self.relative_velocity
        } else {
            -self.relative_velocity
        }
    }
}

/// Handle of an elastic connection between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(ImpulseJointHandle);

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

/// rapier3d simulation state plus the entity mapping.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vec3,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    entity_to_body: HashMap<EntityId, RigidBodyHandle>,
    entity_to_collider: HashMap<EntityId, ColliderHandle>,
    collider_to_entity: HashMap<ColliderHandle, EntityId>,
    /// Currently touching pairs, keyed `(min, max)`, valued by sensor flag.
    touching: BTreeMap<(EntityId, EntityId), bool>,
}

impl PhysicsWorld {
    pub fn new(gravity: [Real; 3]) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity[0], gravity[1], gravity[2]],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            entity_to_body: HashMap::new(),
            entity_to_collider: HashMap::new(),
            collider_to_entity: HashMap::new(),
            touching: BTreeMap::new(),
        }
    }

    /// Register a body for `entity`. A second registration is a no-op.
    pub fn register(&mut self, entity: EntityId, desc: &BodyDesc) {
        if self.entity_to_body.contains_key(&entity) {
            return;
        }
        let builder = match desc.body_type {
            BodyType::Dynamic => RigidBodyBuilder::dynamic(),
            BodyType::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
            BodyType::Static => RigidBodyBuilder::fixed(),
        };
        let mut builder = builder
            .translation(desc.position)
            .gravity_scale(desc.gravity_scale)
            .lock_rotations();
        if !desc.lock_rotations {
            builder = builder.enabled_rotations(true, true, true);
        }
        if desc.body_type != BodyType::Static {
            builder = builder.linvel(desc.velocity);
        }
        if let (BodyType::Dynamic, Some(mass)) = (desc.body_type, desc.mass) {
            builder = builder.additional_mass(mass.max(MIN_BODY_MASS));
        }

        let body_handle = self.rigid_body_set.insert(builder.build());
        self.entity_to_body.insert(entity, body_handle);
        let density = if desc.mass.is_some() { 0.0 } else { desc.density };
        self.attach_collider(entity, body_handle, desc.collider, desc.sensor, density);
    }

    fn attach_collider(
        &mut self,
        entity: EntityId,
        body: RigidBodyHandle,
        shape: ColliderShape,
        sensor: bool,
        density: Real,
    ) {
        let collider = ColliderBuilder::new(shape.to_shared())
            .sensor(sensor)
            .density(density)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_collision_types(ActiveCollisionTypes::all())
            .build();
        let handle = self
            .collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);
        self.entity_to_collider.insert(entity, handle);
        self.collider_to_entity.insert(handle, entity);
    }

    /// Remove the body of `entity` with its collider and joints.
    pub fn unregister(&mut self, entity: EntityId) {
        if let Some(body) = self.entity_to_body.remove(&entity) {
            self.rigid_body_set.remove(
                body,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        if let Some(collider) = self.entity_to_collider.remove(&entity) {
            self.collider_to_entity.remove(&collider);
        }
        self.touching.retain(|(a, b), _| *a != entity && *b != entity);
    }

    /// Swap the collider of `entity` for a new shape/sensor setting.
    pub fn rebuild_collider(&mut self, entity: EntityId, shape: ColliderShape, sensor: bool) {
        let Some(&body) = self.entity_to_body.get(&entity) else {
            return;
        };
        let density = match self.entity_to_collider.remove(&entity) {
            Some(old) => {
                self.collider_to_entity.remove(&old);
                self.collider_set
                    .remove(old, &mut self.island_manager, &mut self.rigid_body_set, true)
                    .map_or(0.0, |c| c.density())
            }
            None => 0.0,
        };
        self.attach_collider(entity, body, shape, sensor, density);
    }

    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entity_to_body.contains_key(&entity)
    }

    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    fn body(&self, entity: EntityId) -> Option<&RigidBody> {
        self.entity_to_body
            .get(&entity)
            .and_then(|h| self.rigid_body_set.get(*h))
    }

    fn body_mut(&mut self, entity: EntityId) -> Option<&mut RigidBody> {
        let handle = *self.entity_to_body.get(&entity)?;
        self.rigid_body_set.get_mut(handle)
    }

    // -- state accessors ----------------------------------------------------

    pub fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.body(entity).map(|rb| *rb.translation())
    }

    pub fn velocity(&self, entity: EntityId) -> Option<Vec3> {
        self.body(entity).map(|rb| *rb.linvel())
    }

    pub fn rotation(&self, entity: EntityId) -> Option<UnitQuaternion<Real>> {
        self.body(entity).map(|rb| *rb.rotation())
    }

    /// Total mass, or `None` for missing and non-dynamic bodies.
    pub fn mass(&self, entity: EntityId) -> Option<Real> {
        self.body(entity).filter(|rb| rb.is_dynamic()).map(|rb| rb.mass())
    }

    pub fn is_sensor(&self, entity: EntityId) -> bool {
        self.entity_to_collider
            .get(&entity)
            .and_then(|h| self.collider_set.get(*h))
            .is_some_and(|c| c.is_sensor())
    }

    // -- mutation -----------------------------------------------------------

    pub fn set_velocity(&mut self, entity: EntityId, velocity: Vec3) {
        if let Some(rb) = self.body_mut(entity) {
            rb.set_linvel(velocity, true);
        }
    }

    pub fn teleport(&mut self, entity: EntityId, position: Vec3) {
        if let Some(rb) = self.body_mut(entity) {
            rb.set_translation(position, true);
        }
    }

    /// Replace the explicit mass of a dynamic body.
    pub fn set_mass(&mut self, entity: EntityId, mass: Real) {
        if let Some(rb) = self.body_mut(entity) {
            rb.set_additional_mass(mass.max(MIN_BODY_MASS), true);
        }
    }

    pub fn set_gravity_scale(&mut self, entity: EntityId, scale: Real) {
        if let Some(rb) = self.body_mut(entity) {
            rb.set_gravity_scale(scale, true);
        }
    }

    pub fn lock_rotations(&mut self, entity: EntityId, locked: bool) {
        if let Some(rb) = self.body_mut(entity) {
            rb.lock_rotations(locked, true);
        }
    }

    /// Rotate the body so its local +Z axis points along `direction`.
    pub fn face_towards(&mut self, entity: EntityId, direction: Vec3) {
        let Some(dir) = direction.try_normalize(1.0e-6) else {
            return;
        };
        let up = if dir.y.abs() > 0.99 { Vec3::x() } else { Vec3::y() };
        let rotation = UnitQuaternion::face_towards(&dir, &up);
        if let Some(rb) = self.body_mut(entity) {
            rb.set_rotation(rotation, true);
        }
    }

    pub fn apply_force(&mut self, entity: EntityId, force: Vec3, mode: ForceMode) {
        let Some(rb) = self.body_mut(entity) else {
            return;
        };
        let mass = rb.mass();
        match mode {
            ForceMode::Force => rb.add_force(force, true),
            ForceMode::Impulse => rb.apply_impulse(force, true),
            ForceMode::Acceleration => rb.add_force(force * mass, true),
            ForceMode::VelocityChange => rb.apply_impulse(force * mass, true),
        }
    }

    /// Apply a torque. Mass-independent modes are scaled by mass, not by the
    /// inertia tensor.
    pub fn apply_torque(&mut self, entity: EntityId, torque: Vec3, mode: ForceMode) {
        let Some(rb) = self.body_mut(entity) else {
            return;
        };
        let mass = rb.mass();
        match mode {
            ForceMode::Force => rb.add_torque(torque, true),
            ForceMode::Impulse => rb.apply_torque_impulse(torque, true),
            ForceMode::Acceleration => rb.add_torque(torque * mass, true),
            ForceMode::VelocityChange => rb.apply_torque_impulse(torque * mass, true),
        }
    }

    /// Join two bodies with a spring. `None` if either has no body.
    pub fn connect_spring(
        &mut self,
        a: EntityId,
        b: EntityId,
        rest_length: Real,
        stiffness: Real,
        damping: Real,
    ) -> Option<ConnectionId> {
        let body_a = *self.entity_to_body.get(&a)?;
        let body_b = *self.entity_to_body.get(&b)?;
        let joint = SpringJointBuilder::new(rest_length, stiffness, damping).build();
        let handle = self.impulse_joint_set.insert(body_a, body_b, joint, true);
        Some(ConnectionId(handle))
    }

    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        self.impulse_joint_set.remove(connection.0, true).is_some()
    }

    pub fn has_connection(&self, connection: ConnectionId) -> bool {
        self.impulse_joint_set.get(connection.0).is_some()
    }

    /// Entities whose collider contains `point`, sorted by id.
    pub fn entities_at(&self, point: Vec3) -> Vec<EntityId> {
        let point = Point::from(point);
        let mut hits: Vec<EntityId> = self
            .entity_to_collider
            .keys()
            .copied()
            .filter(|&e| {
                self.collider_pose(e)
                    .is_some_and(|(pose, c)| c.shape().contains_point(&pose, &point))
            })
            .collect();
        hits.sort();
        hits
    }

    /// Whether the colliders of `a` and `b` overlap at their current poses.
    pub fn intersects(&self, a: EntityId, b: EntityId) -> bool {
        let (Some((pa, ca)), Some((pb, cb))) = (self.collider_pose(a), self.collider_pose(b)) else {
            return false;
        };
        query::intersection_test(&pa, ca.shape(), &pb, cb.shape()).unwrap_or(false)
    }

    /// Collider of `entity` placed at its body's current pose. Reads the body
    /// rather than the collider so teleports are visible before the next step.
    fn collider_pose(&self, entity: EntityId) -> Option<(Isometry<Real>, &Collider)> {
        let collider = self.collider_set.get(*self.entity_to_collider.get(&entity)?)?;
        let pose = match self.body(entity) {
            Some(rb) => *rb.position(),
            None => *collider.position(),
        };
        Some((pose, collider))
    }

    /// Whether `a` and `b` are currently a tracked touching pair.
    pub fn touching(&self, a: EntityId, b: EntityId) -> bool {
        self.touching.contains_key(&(a.min(b), a.max(b)))
    }

    // -- stepping -----------------------------------------------------------

    /// Advance the simulation by `dt` and report contacts.
    pub fn step(&mut self, dt: Real) -> Vec<ContactEvent> {
        self.integration_params.dt = dt;

        let (collision_send, collision_recv) =
            rapier3d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier3d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        // Forces apply for one step only.
        for (_, rb) in self.rigid_body_set.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }

        let mut events = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let (h1, h2, started, sensor) = match event {
                CollisionEvent::Started(h1, h2, flags) => {
                    (h1, h2, true, flags.contains(CollisionEventFlags::SENSOR))
                }
                CollisionEvent::Stopped(h1, h2, flags) => {
                    (h1, h2, false, flags.contains(CollisionEventFlags::SENSOR))
                }
            };
            let (Some(&e1), Some(&e2)) = (self.collider_to_entity.get(&h1), self.collider_to_entity.get(&h2))
            else {
                continue;
            };
            let key = (e1.min(e2), e1.max(e2));
            if started {
                if self.touching.insert(key, sensor).is_none() {
                    events.push(self.contact(ContactPhase::Enter, key, sensor));
                }
            } else if self.touching.remove(&key).is_some() {
                events.push(self.contact(ContactPhase::Exit, key, sensor));
            }
        }
        let stays: Vec<ContactEvent> = self
            .touching
            .iter()
            .map(|(&key, &sensor)| self.contact(ContactPhase::Stay, key, sensor))
            .collect();
        events.extend(stays);

        events.sort_by(|x, y| (x.phase, x.a, x.b).cmp(&(y.phase, y.a, y.b)));
        events
    }

    fn contact(&self, phase: ContactPhase, (a, b): (EntityId, EntityId), sensor: bool) -> ContactEvent {
        let va = self.velocity(a).unwrap_or_else(Vec3::zeros);
        let vb = self.velocity(b).unwrap_or_else(Vec3::zeros);
        let (depth, normal) = self.contact_geometry(a, b);
        ContactEvent {
            phase,
            a,
            b,
            sensor,
            depth,
            relative_velocity: vb - va,
            normal,
        }
    }

    /// Penetration depth (`0` when the pair only touches) and the normal from
    /// `a` towards `b`. Queried directly so sensor pairs, which have no
    /// contact manifold, report geometry too. Falls back to the line between
    /// the body centers when the shapes are out of reach.
    fn contact_geometry(&self, a: EntityId, b: EntityId) -> (Real, Vec3) {
        let (Some((pa, ca)), Some((pb, cb))) = (self.collider_pose(a), self.collider_pose(b)) else {
            return (0.0, Vec3::zeros());
        };
        match query::contact(&pa, ca.shape(), &pb, cb.shape(), CONTACT_PREDICTION) {
            Ok(Some(contact)) => ((-contact.dist).max(0.0), contact.normal1.into_inner()),
            _ => {
                let centers = pb.translation.vector - pa.translation.vector;
                (0.0, centers.try_normalize(Real::EPSILON).unwrap_or_else(Vec3::zeros))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
